use std::cmp::Ordering;
use std::sync::Arc;

use chrono::FixedOffset;

use super::{BoxedTupleStream, Tuple, Upstream, atomic_key};
use crate::item::Item;
use crate::runtime::compare;
use crate::runtime::context::DynamicContext;
use crate::runtime::iterator::{BoxedIterator, Metadata, Operator, OperatorIterator, Result, VariableSet};

/// One `order by` key.
pub struct OrderSpec {
    pub expression: BoxedIterator,
    pub descending: bool,
    /// `empty greatest`; the default is `empty least`.
    pub empty_greatest: bool,
}

impl OrderSpec {
    pub fn ascending(expression: BoxedIterator) -> Self {
        Self { expression, descending: false, empty_greatest: false }
    }

    pub fn descending(expression: BoxedIterator) -> Self {
        Self { expression, descending: true, empty_greatest: false }
    }

    pub fn empty_greatest(mut self) -> Self {
        self.empty_greatest = true;
        self
    }

    fn compare(&self, left: Option<&Item>, right: Option<&Item>, implicit_tz: FixedOffset) -> Result<Ordering> {
        let ordering = match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) if self.empty_greatest => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) if self.empty_greatest => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(l), Some(r)) => compare::order_keys(l, r, implicit_tz)?,
        };
        Ok(if self.descending { ordering.reverse() } else { ordering })
    }
}

// Comparability within one family of types is transitive and `null` compares
// with everything, so checking each key against the first non-null one covers
// every pair.
fn check_column(rows: &[(Vec<Option<Item>>, Tuple)], column: usize, implicit_tz: FixedOffset) -> Result<()> {
    let mut keys = rows
        .iter()
        .filter_map(|(keys, _)| keys[column].as_ref())
        .filter(|key| !matches!(key, Item::Null));
    let Some(first) = keys.next() else {
        return Ok(());
    };
    for key in keys {
        compare::order_keys(first, key, implicit_tz)?;
    }
    Ok(())
}

/// `order by`: a blocking clause. The whole upstream is drained and sorted on
/// the first pull; ties keep their input order.
pub struct OrderBy {
    upstream: Upstream,
    specs: Vec<OrderSpec>,
    context: Option<Arc<DynamicContext>>,
    sorted: Option<std::vec::IntoIter<Tuple>>,
}

impl OrderBy {
    fn sort(&mut self, context: &Arc<DynamicContext>) -> Result<Vec<Tuple>> {
        let mut rows: Vec<(Vec<Option<Item>>, Tuple)> = Vec::new();
        while let Some(tuple) = self.upstream.next_tuple()? {
            let frame = tuple.to_context(context);
            let keys = self
                .specs
                .iter_mut()
                .map(|spec| atomic_key(spec.expression.materialize(&frame)?, "order by"))
                .collect::<Result<Vec<_>>>()?;
            rows.push((keys, tuple));
        }

        let implicit_tz = context.implicit_timezone();
        for column in 0..self.specs.len() {
            check_column(&rows, column, implicit_tz)?;
        }
        // Every column holds mutually comparable keys, so the comparator is total.
        rows.sort_by(|(left, _), (right, _)| {
            for ((spec, l), r) in self.specs.iter().zip(left).zip(right) {
                match spec.compare(l.as_ref(), r.as_ref(), implicit_tz).unwrap_or(Ordering::Equal) {
                    Ordering::Equal => {}
                    ordering => return ordering,
                }
            }
            Ordering::Equal
        });
        tracing::debug!(tuples = rows.len(), keys = self.specs.len(), "order by sorted");
        Ok(rows.into_iter().map(|(_, tuple)| tuple).collect())
    }
}

impl Operator for OrderBy {
    type Output = Tuple;

    fn name(&self) -> &'static str {
        "order-by-clause"
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        self.context = Some(Arc::clone(context));
        self.sorted = None;
        self.upstream.open(context)
    }

    fn produce(&mut self) -> Result<Option<Tuple>> {
        if self.sorted.is_none() {
            let Some(context) = self.context.clone() else {
                return Ok(None);
            };
            self.sorted = Some(self.sort(&context)?.into_iter());
        }
        Ok(self.sorted.as_mut().and_then(Iterator::next))
    }

    fn stop(&mut self) {
        self.upstream.close();
        self.sorted = None;
        self.context = None;
    }

    fn dependencies(&self, out: &mut VariableSet) {
        self.upstream.dependencies(self.specs.iter().map(|s| &s.expression), out);
    }

    fn bound_variables(&self, out: &mut VariableSet) {
        self.upstream.bound_variables(out);
    }
}

pub fn order_by_clause(parent: BoxedTupleStream, specs: Vec<OrderSpec>, metadata: Metadata) -> BoxedTupleStream {
    let operator = OrderBy { upstream: Upstream::new(Some(parent)), specs, context: None, sorted: None };
    Box::new(OperatorIterator::new(operator, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimeIterator;
    use crate::runtime::error::ErrorCode;
    use crate::runtime::flwor::{flwor, for_clause};
    use crate::runtime::iterators::{array_lookup, constant, object_lookup, sequence, variable};
    use serde_json::json;

    fn md() -> Metadata {
        Metadata::default()
    }

    fn people() -> BoxedIterator {
        sequence(
            vec![
                Item::from_json(&json!({"name": "b", "age": 30})),
                Item::from_json(&json!({"name": "a"})),
                Item::from_json(&json!({"name": "c", "age": 20})),
                Item::from_json(&json!({"name": "d", "age": 30})),
            ],
            md(),
        )
    }

    fn names_ordered_by_age(spec: fn(BoxedIterator) -> OrderSpec) -> Vec<Item> {
        let for_p = for_clause(None, "p", None, false, people(), md());
        let key = object_lookup(variable("p", md()), constant(Item::string("age"), md()), md());
        let ordered = order_by_clause(for_p, vec![spec(key)], md());
        let name = object_lookup(variable("p", md()), constant(Item::string("name"), md()), md());
        let mut it = flwor(ordered, name, md());
        it.materialize(&DynamicContext::empty()).unwrap()
    }

    fn names(values: &[&str]) -> Vec<Item> {
        values.iter().map(|s| Item::string(*s)).collect()
    }

    #[test]
    fn ascending_is_stable_with_empty_least() {
        assert_eq!(names_ordered_by_age(OrderSpec::ascending), names(&["a", "c", "b", "d"]));
    }

    #[test]
    fn descending_reverses_keys_but_not_ties() {
        assert_eq!(names_ordered_by_age(OrderSpec::descending), names(&["b", "d", "c", "a"]));
    }

    #[test]
    fn empty_greatest_moves_missing_keys_last() {
        let spec = |e| OrderSpec::ascending(e).empty_greatest();
        assert_eq!(names_ordered_by_age(spec), names(&["c", "b", "d", "a"]));
    }

    #[test]
    fn plural_keys_are_type_errors() {
        let arrays = sequence(vec![Item::from_json(&json!([1, 2]))], md());
        let for_a = for_clause(None, "a", None, false, arrays, md());
        let key = crate::runtime::iterators::array_unboxing(variable("a", md()), md());
        let ordered = order_by_clause(for_a, vec![OrderSpec::ascending(key)], md());
        let mut it = flwor(ordered, array_lookup(variable("a", md()), constant(Item::Int(1), md()), md()), md());
        let err = it.materialize(&DynamicContext::empty()).unwrap_err();
        assert_eq!(err.code, ErrorCode::XPTY0004);
    }
}
