use std::sync::Arc;

use compact_str::CompactString;
use itertools::Itertools;

use super::{BoxedTupleStream, Tuple, Upstream, atomic_key};
use crate::item::{Item, Sequence};
use crate::runtime::compare;
use crate::runtime::context::DynamicContext;
use crate::runtime::error::{Error, ErrorCode};
use crate::runtime::iterator::{BoxedIterator, Metadata, Operator, OperatorIterator, Result, VariableSet};

/// One grouping variable: `$k` regroups on an existing binding, `$k := expr`
/// binds it first.
pub struct GroupSpec {
    pub variable: CompactString,
    pub expression: Option<BoxedIterator>,
}

impl GroupSpec {
    pub fn variable(variable: impl Into<CompactString>) -> Self {
        Self { variable: variable.into(), expression: None }
    }

    pub fn bind(variable: impl Into<CompactString>, expression: BoxedIterator) -> Self {
        Self { variable: variable.into(), expression: Some(expression) }
    }
}

struct Group {
    keys: Vec<Option<Item>>,
    // non-grouping variables, concatenated across the members
    values: Vec<(CompactString, Sequence)>,
}

/// `group by`: blocking; groups are emitted in order of first occurrence.
pub struct GroupBy {
    upstream: Upstream,
    specs: Vec<GroupSpec>,
    context: Option<Arc<DynamicContext>>,
    grouped: Option<std::vec::IntoIter<Tuple>>,
}

impl GroupBy {
    fn keys_of(&mut self, tuple: &Tuple, context: &Arc<DynamicContext>) -> Result<Vec<Option<Item>>> {
        let frame = tuple.to_context(context);
        self.specs
            .iter_mut()
            .map(|spec| {
                let key = match &mut spec.expression {
                    Some(expression) => expression.materialize(&frame)?,
                    None => tuple.get(&spec.variable).map(|v| v.to_vec()).ok_or_else(|| {
                        Error::from_code(
                            ErrorCode::XPST0008,
                            format!("grouping variable ${} is not bound", spec.variable),
                        )
                    })?,
                };
                atomic_key(key, "group by")
            })
            .collect()
    }

    fn group(&mut self, context: &Arc<DynamicContext>) -> Result<Vec<Tuple>> {
        let implicit_tz = context.implicit_timezone();
        let mut groups: Vec<Group> = Vec::new();
        let mut inputs = 0usize;
        while let Some(tuple) = self.upstream.next_tuple()? {
            inputs += 1;
            let keys = self.keys_of(&tuple, context)?;
            let index = groups.iter().position(|g| {
                g.keys.iter().zip_eq(&keys).all(|(a, b)| match (a, b) {
                    (None, None) => true,
                    (Some(a), Some(b)) => compare::group_keys_equal(a, b, implicit_tz),
                    _ => false,
                })
            });
            let group = match index {
                Some(i) => &mut groups[i],
                None => {
                    groups.push(Group { keys, values: Vec::new() });
                    let last = groups.len() - 1;
                    &mut groups[last]
                }
            };
            for (name, value) in tuple.iter() {
                if self.specs.iter().any(|s| s.variable.as_str() == name) {
                    continue;
                }
                match group.values.iter_mut().find(|(n, _)| n.as_str() == name) {
                    Some((_, items)) => items.extend(value.iter().cloned()),
                    None => group.values.push((name.into(), value.to_vec())),
                }
            }
        }
        tracing::debug!(tuples = inputs, groups = groups.len(), "group by finished");

        Ok(groups
            .into_iter()
            .map(|group| {
                let mut tuple = Tuple::default();
                for (spec, key) in self.specs.iter().zip(group.keys) {
                    tuple.bind(spec.variable.clone(), key.into_iter().collect());
                }
                for (name, items) in group.values {
                    tuple.bind(name, items);
                }
                tuple
            })
            .collect())
    }
}

impl Operator for GroupBy {
    type Output = Tuple;

    fn name(&self) -> &'static str {
        "group-by-clause"
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        self.context = Some(Arc::clone(context));
        self.grouped = None;
        self.upstream.open(context)
    }

    fn produce(&mut self) -> Result<Option<Tuple>> {
        if self.grouped.is_none() {
            let Some(context) = self.context.clone() else {
                return Ok(None);
            };
            self.grouped = Some(self.group(&context)?.into_iter());
        }
        Ok(self.grouped.as_mut().and_then(Iterator::next))
    }

    fn stop(&mut self) {
        self.upstream.close();
        self.grouped = None;
        self.context = None;
    }

    fn dependencies(&self, out: &mut VariableSet) {
        self.upstream.dependencies(self.specs.iter().filter_map(|s| s.expression.as_ref()), out);
    }

    fn bound_variables(&self, out: &mut VariableSet) {
        self.upstream.bound_variables(out);
        for spec in &self.specs {
            out.insert(spec.variable.clone());
        }
    }
}

pub fn group_by_clause(parent: BoxedTupleStream, specs: Vec<GroupSpec>, metadata: Metadata) -> BoxedTupleStream {
    let operator = GroupBy { upstream: Upstream::new(Some(parent)), specs, context: None, grouped: None };
    Box::new(OperatorIterator::new(operator, metadata))
}
