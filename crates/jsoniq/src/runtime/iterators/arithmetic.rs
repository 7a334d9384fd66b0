//! Additive, multiplicative and unary operators.
//!
//! Binary operators materialize both operands as at-most-one items when they
//! open; an empty operand makes the whole expression empty. The dispatch
//! itself runs when the single result is pulled, so type errors surface from
//! `next()`.

use std::sync::Arc;

use chrono::{FixedOffset, Offset, Utc};

use crate::item::Item;
use crate::runtime::context::DynamicContext;
use crate::runtime::dispatch::{self, AdditiveOp, MultiplicativeOp};
use crate::runtime::error::Error;
use crate::runtime::iterator::{
    BoxedIterator, Metadata, Operator, OperatorIterator, Result, VariableSet, at_most_one_operand,
};

pub struct Additive {
    left: BoxedIterator,
    right: BoxedIterator,
    op: AdditiveOp,
    metadata: Metadata,
    operands: Option<(Item, Item)>,
    implicit_tz: FixedOffset,
}

impl Operator for Additive {
    type Output = Item;

    fn name(&self) -> &'static str {
        "additive"
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        self.implicit_tz = context.implicit_timezone();
        let left = at_most_one_operand(self.left.as_mut(), context, "Addition", "left", self.metadata)?;
        let right = at_most_one_operand(self.right.as_mut(), context, "Addition", "right", self.metadata)?;
        self.operands = left.zip(right);
        Ok(())
    }

    fn produce(&mut self) -> Result<Option<Item>> {
        let Some((left, right)) = self.operands.take() else {
            return Ok(None);
        };
        dispatch::additive(&left, &right, self.op, self.implicit_tz)?
            .map(Some)
            .ok_or_else(|| Error::binary_operation(self.op.symbol(), left.type_name(), right.type_name()))
    }

    fn stop(&mut self) {
        self.operands = None;
    }

    fn dependencies(&self, out: &mut VariableSet) {
        self.left.collect_dependencies(out);
        self.right.collect_dependencies(out);
    }
}

pub type AdditiveIterator = OperatorIterator<Additive>;

pub fn additive(left: BoxedIterator, right: BoxedIterator, op: AdditiveOp, metadata: Metadata) -> BoxedIterator {
    let operator = Additive { left, right, op, metadata, operands: None, implicit_tz: Utc.fix() };
    Box::new(OperatorIterator::new(operator, metadata))
}

pub struct Multiplicative {
    left: BoxedIterator,
    right: BoxedIterator,
    op: MultiplicativeOp,
    metadata: Metadata,
    operands: Option<(Item, Item)>,
}

impl Operator for Multiplicative {
    type Output = Item;

    fn name(&self) -> &'static str {
        "multiplicative"
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        let left = at_most_one_operand(self.left.as_mut(), context, "Multiplicative", "left", self.metadata)?;
        let right = at_most_one_operand(self.right.as_mut(), context, "Multiplicative", "right", self.metadata)?;
        self.operands = left.zip(right);
        Ok(())
    }

    fn produce(&mut self) -> Result<Option<Item>> {
        let Some((left, right)) = self.operands.take() else {
            return Ok(None);
        };
        dispatch::multiplicative(&left, &right, self.op)?
            .map(Some)
            .ok_or_else(|| Error::binary_operation(self.op.symbol(), left.type_name(), right.type_name()))
    }

    fn stop(&mut self) {
        self.operands = None;
    }

    fn dependencies(&self, out: &mut VariableSet) {
        self.left.collect_dependencies(out);
        self.right.collect_dependencies(out);
    }
}

pub type MultiplicativeIterator = OperatorIterator<Multiplicative>;

pub fn multiplicative(
    left: BoxedIterator,
    right: BoxedIterator,
    op: MultiplicativeOp,
    metadata: Metadata,
) -> BoxedIterator {
    Box::new(OperatorIterator::new(Multiplicative { left, right, op, metadata, operands: None }, metadata))
}

pub struct Unary {
    operand: BoxedIterator,
    negate: bool,
    metadata: Metadata,
    value: Option<Item>,
}

impl Operator for Unary {
    type Output = Item;

    fn name(&self) -> &'static str {
        "unary"
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        self.value = at_most_one_operand(self.operand.as_mut(), context, "Unary", "", self.metadata)?;
        Ok(())
    }

    fn produce(&mut self) -> Result<Option<Item>> {
        self.value.take().map(|v| dispatch::unary(&v, self.negate)).transpose()
    }

    fn stop(&mut self) {
        self.value = None;
    }

    fn dependencies(&self, out: &mut VariableSet) {
        self.operand.collect_dependencies(out);
    }
}

pub fn unary(operand: BoxedIterator, negate: bool, metadata: Metadata) -> BoxedIterator {
    Box::new(OperatorIterator::new(Unary { operand, negate, metadata, value: None }, metadata))
}
