use std::sync::Arc;

use compact_str::CompactString;

use super::{BoxedTupleStream, Tuple, Upstream, position_item};
use crate::item::effective_boolean_value;
use crate::runtime::context::DynamicContext;
use crate::runtime::iterator::{BoxedIterator, Metadata, Operator, OperatorIterator, Result, VariableSet};

/// `for $x [at $i] [allowing empty] in expr`
pub struct For {
    upstream: Upstream,
    variable: CompactString,
    position: Option<CompactString>,
    allowing_empty: bool,
    expression: BoxedIterator,
    context: Option<Arc<DynamicContext>>,
    current: Option<Tuple>,
    index: usize,
}

impl For {
    fn extend(&self, tuple: &Tuple, value: Vec<crate::item::Item>, index: usize) -> Tuple {
        let mut out = tuple.clone();
        out.bind(self.variable.clone(), value);
        if let Some(position) = &self.position {
            out.bind(position.clone(), vec![position_item(index)]);
        }
        out
    }
}

impl Operator for For {
    type Output = Tuple;

    fn name(&self) -> &'static str {
        "for-clause"
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        self.context = Some(Arc::clone(context));
        self.current = None;
        self.upstream.open(context)
    }

    fn produce(&mut self) -> Result<Option<Tuple>> {
        let Some(context) = self.context.clone() else {
            return Ok(None);
        };
        loop {
            if let Some(tuple) = &self.current {
                if self.expression.has_next() {
                    let item = self.expression.next()?;
                    self.index += 1;
                    return Ok(Some(self.extend(tuple, vec![item], self.index)));
                }
                self.expression.close();
                let empty = (self.allowing_empty && self.index == 0).then(|| self.extend(tuple, Vec::new(), 0));
                self.current = None;
                if empty.is_some() {
                    return Ok(empty);
                }
            }
            let Some(tuple) = self.upstream.next_tuple()? else {
                return Ok(None);
            };
            self.expression.open(&tuple.to_context(&context))?;
            self.index = 0;
            self.current = Some(tuple);
        }
    }

    fn stop(&mut self) {
        self.expression.close();
        self.upstream.close();
        self.current = None;
        self.context = None;
    }

    fn dependencies(&self, out: &mut VariableSet) {
        self.upstream.dependencies([&self.expression], out);
    }

    fn bound_variables(&self, out: &mut VariableSet) {
        self.upstream.bound_variables(out);
        out.insert(self.variable.clone());
        if let Some(position) = &self.position {
            out.insert(position.clone());
        }
    }
}

pub fn for_clause(
    parent: Option<BoxedTupleStream>,
    variable: impl Into<CompactString>,
    position: Option<CompactString>,
    allowing_empty: bool,
    expression: BoxedIterator,
    metadata: Metadata,
) -> BoxedTupleStream {
    let operator = For {
        upstream: Upstream::new(parent),
        variable: variable.into(),
        position,
        allowing_empty,
        expression,
        context: None,
        current: None,
        index: 0,
    };
    Box::new(OperatorIterator::new(operator, metadata))
}

/// `let $x := expr`
pub struct Let {
    upstream: Upstream,
    variable: CompactString,
    expression: BoxedIterator,
    context: Option<Arc<DynamicContext>>,
}

impl Operator for Let {
    type Output = Tuple;

    fn name(&self) -> &'static str {
        "let-clause"
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        self.context = Some(Arc::clone(context));
        self.upstream.open(context)
    }

    fn produce(&mut self) -> Result<Option<Tuple>> {
        let Some(context) = self.context.clone() else {
            return Ok(None);
        };
        let Some(mut tuple) = self.upstream.next_tuple()? else {
            return Ok(None);
        };
        let value = self.expression.materialize(&tuple.to_context(&context))?;
        tuple.bind(self.variable.clone(), value);
        Ok(Some(tuple))
    }

    fn stop(&mut self) {
        self.upstream.close();
        self.context = None;
    }

    fn dependencies(&self, out: &mut VariableSet) {
        self.upstream.dependencies([&self.expression], out);
    }

    fn bound_variables(&self, out: &mut VariableSet) {
        self.upstream.bound_variables(out);
        out.insert(self.variable.clone());
    }
}

pub fn let_clause(
    parent: Option<BoxedTupleStream>,
    variable: impl Into<CompactString>,
    expression: BoxedIterator,
    metadata: Metadata,
) -> BoxedTupleStream {
    let operator = Let { upstream: Upstream::new(parent), variable: variable.into(), expression, context: None };
    Box::new(OperatorIterator::new(operator, metadata))
}

/// `where expr`
pub struct Where {
    upstream: Upstream,
    predicate: BoxedIterator,
    context: Option<Arc<DynamicContext>>,
}

impl Operator for Where {
    type Output = Tuple;

    fn name(&self) -> &'static str {
        "where-clause"
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        self.context = Some(Arc::clone(context));
        self.upstream.open(context)
    }

    fn produce(&mut self) -> Result<Option<Tuple>> {
        let Some(context) = self.context.clone() else {
            return Ok(None);
        };
        while let Some(tuple) = self.upstream.next_tuple()? {
            let verdict = self.predicate.materialize(&tuple.to_context(&context))?;
            if effective_boolean_value(&verdict)? {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }

    fn stop(&mut self) {
        self.upstream.close();
        self.context = None;
    }

    fn dependencies(&self, out: &mut VariableSet) {
        self.upstream.dependencies([&self.predicate], out);
    }

    fn bound_variables(&self, out: &mut VariableSet) {
        self.upstream.bound_variables(out);
    }
}

pub fn where_clause(parent: BoxedTupleStream, predicate: BoxedIterator, metadata: Metadata) -> BoxedTupleStream {
    let operator = Where { upstream: Upstream::new(Some(parent)), predicate, context: None };
    Box::new(OperatorIterator::new(operator, metadata))
}

/// `count $c`
pub struct Count {
    upstream: Upstream,
    variable: CompactString,
    counter: usize,
}

impl Operator for Count {
    type Output = Tuple;

    fn name(&self) -> &'static str {
        "count-clause"
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        self.counter = 0;
        self.upstream.open(context)
    }

    fn produce(&mut self) -> Result<Option<Tuple>> {
        let Some(mut tuple) = self.upstream.next_tuple()? else {
            return Ok(None);
        };
        self.counter += 1;
        tuple.bind(self.variable.clone(), vec![position_item(self.counter)]);
        Ok(Some(tuple))
    }

    fn stop(&mut self) {
        self.upstream.close();
    }

    fn dependencies(&self, out: &mut VariableSet) {
        self.upstream.dependencies(std::iter::empty(), out);
    }

    fn bound_variables(&self, out: &mut VariableSet) {
        self.upstream.bound_variables(out);
        out.insert(self.variable.clone());
    }
}

pub fn count_clause(
    parent: BoxedTupleStream,
    variable: impl Into<CompactString>,
    metadata: Metadata,
) -> BoxedTupleStream {
    let operator = Count { upstream: Upstream::new(Some(parent)), variable: variable.into(), counter: 0 };
    Box::new(OperatorIterator::new(operator, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Item;
    use crate::runtime::RuntimeIterator;
    use crate::runtime::compare::ComparisonOp;
    use crate::runtime::flwor::flwor;
    use crate::runtime::iterators::{comma, constant, empty_sequence, sequence, value_comparison, variable};
    use rstest::rstest;

    fn md() -> Metadata {
        Metadata::default()
    }

    fn ints(values: &[i32]) -> Vec<Item> {
        values.iter().copied().map(Item::Int).collect()
    }

    #[test]
    fn for_binds_positions_from_one() {
        let letters = sequence(vec![Item::string("a"), Item::string("b")], md());
        let clause = for_clause(None, "x", Some("i".into()), false, letters, md());
        let mut it = flwor(clause, comma(vec![variable("i", md()), variable("x", md())], md()), md());
        let ctx = DynamicContext::empty();
        assert_eq!(
            it.materialize(&ctx).unwrap(),
            vec![Item::Int(1), Item::string("a"), Item::Int(2), Item::string("b")]
        );
    }

    #[rstest]
    #[case(false, vec![])]
    #[case(true, vec![Item::Int(0)])]
    fn allowing_empty(#[case] allow_empty: bool, #[case] expected: Vec<Item>) {
        let clause = for_clause(None, "x", Some("i".into()), allow_empty, empty_sequence(md()), md());
        let mut it = flwor(clause, comma(vec![variable("x", md()), variable("i", md())], md()), md());
        assert_eq!(it.materialize(&DynamicContext::empty()).unwrap(), expected);
    }

    #[test]
    fn nested_for_is_correlated() {
        // for $x in (1, 2) for $y in ($x, $x) return $y
        let outer = for_clause(None, "x", None, false, sequence(ints(&[1, 2]), md()), md());
        let inner = for_clause(
            Some(outer),
            "y",
            None,
            false,
            comma(vec![variable("x", md()), variable("x", md())], md()),
            md(),
        );
        let mut it = flwor(inner, variable("y", md()), md());
        assert_eq!(it.materialize(&DynamicContext::empty()).unwrap(), ints(&[1, 1, 2, 2]));
    }

    #[test]
    fn where_then_count() {
        // for $x in (1, 2, 3, 4) where $x ge 3 count $c return $c
        let for_x = for_clause(None, "x", None, false, sequence(ints(&[1, 2, 3, 4]), md()), md());
        let filtered = where_clause(
            for_x,
            value_comparison(variable("x", md()), constant(Item::Int(3), md()), ComparisonOp::Ge, md()),
            md(),
        );
        let counted = count_clause(filtered, "c", md());
        let mut it = flwor(counted, variable("c", md()), md());
        assert_eq!(it.materialize(&DynamicContext::empty()).unwrap(), ints(&[1, 2]));
    }

    #[test]
    fn let_binds_whole_sequences() {
        let clause = let_clause(None, "s", sequence(ints(&[4, 5]), md()), md());
        let mut it = flwor(clause, variable("s", md()), md());
        assert_eq!(it.materialize(&DynamicContext::empty()).unwrap(), ints(&[4, 5]));
    }
}
