use std::sync::Arc;

use chrono::{FixedOffset, Offset, Utc};

use crate::item::{Item, Sequence};
use crate::runtime::compare::{self, ComparisonOp};
use crate::runtime::context::DynamicContext;
use crate::runtime::iterator::{
    BoxedIterator, Metadata, Operator, OperatorIterator, Result, VariableSet, at_most_one_operand,
};

/// `eq`, `ne`, `lt`, `le`, `gt`, `ge` on at-most-one operands.
pub struct ValueComparison {
    left: BoxedIterator,
    right: BoxedIterator,
    op: ComparisonOp,
    metadata: Metadata,
    operands: Option<(Item, Item)>,
    implicit_tz: FixedOffset,
}

impl Operator for ValueComparison {
    type Output = Item;

    fn name(&self) -> &'static str {
        "value-comparison"
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        self.implicit_tz = context.implicit_timezone();
        let left = at_most_one_operand(self.left.as_mut(), context, "Comparison", "left", self.metadata)?;
        let right = at_most_one_operand(self.right.as_mut(), context, "Comparison", "right", self.metadata)?;
        self.operands = left.zip(right);
        Ok(())
    }

    fn produce(&mut self) -> Result<Option<Item>> {
        let Some((left, right)) = self.operands.take() else {
            return Ok(None);
        };
        compare::compare_atomics(&left, &right, self.op, self.implicit_tz).map(|b| Some(Item::Boolean(b)))
    }

    fn stop(&mut self) {
        self.operands = None;
    }

    fn dependencies(&self, out: &mut VariableSet) {
        self.left.collect_dependencies(out);
        self.right.collect_dependencies(out);
    }
}

pub fn value_comparison(
    left: BoxedIterator,
    right: BoxedIterator,
    op: ComparisonOp,
    metadata: Metadata,
) -> BoxedIterator {
    let operator = ValueComparison { left, right, op, metadata, operands: None, implicit_tz: Utc.fix() };
    Box::new(OperatorIterator::new(operator, metadata))
}

/// `=`, `!=`, `<`, `<=`, `>`, `>=`: existential over both operand sequences.
pub struct GeneralComparison {
    left: BoxedIterator,
    right: BoxedIterator,
    op: ComparisonOp,
    operands: Option<(Sequence, Sequence)>,
    implicit_tz: FixedOffset,
}

impl Operator for GeneralComparison {
    type Output = Item;

    fn name(&self) -> &'static str {
        "general-comparison"
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        self.implicit_tz = context.implicit_timezone();
        let left = self.left.materialize(context)?;
        let right = self.right.materialize(context)?;
        self.operands = Some((left, right));
        Ok(())
    }

    fn produce(&mut self) -> Result<Option<Item>> {
        let Some((left, right)) = self.operands.take() else {
            return Ok(None);
        };
        compare::general_compare(&left, &right, self.op, self.implicit_tz).map(|b| Some(Item::Boolean(b)))
    }

    fn stop(&mut self) {
        self.operands = None;
    }

    fn dependencies(&self, out: &mut VariableSet) {
        self.left.collect_dependencies(out);
        self.right.collect_dependencies(out);
    }
}

pub fn general_comparison(
    left: BoxedIterator,
    right: BoxedIterator,
    op: ComparisonOp,
    metadata: Metadata,
) -> BoxedIterator {
    let operator = GeneralComparison { left, right, op, operands: None, implicit_tz: Utc.fix() };
    Box::new(OperatorIterator::new(operator, metadata))
}
