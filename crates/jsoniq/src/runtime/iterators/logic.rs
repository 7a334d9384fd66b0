//! Boolean connectives and the conditional, all driven by effective boolean
//! value.

use std::sync::Arc;

use crate::item::{Item, effective_boolean_value};
use crate::runtime::context::DynamicContext;
use crate::runtime::iterator::{BoxedIterator, Metadata, Operator, OperatorIterator, Result, VariableSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

/// `a and b` / `a or b`. The right operand is only evaluated when the left
/// one does not decide the result.
pub struct Logical {
    left: BoxedIterator,
    right: BoxedIterator,
    connective: Connective,
    context: Option<Arc<DynamicContext>>,
}

impl Operator for Logical {
    type Output = Item;

    fn name(&self) -> &'static str {
        match self.connective {
            Connective::And => "and",
            Connective::Or => "or",
        }
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        self.context = Some(Arc::clone(context));
        Ok(())
    }

    fn produce(&mut self) -> Result<Option<Item>> {
        let Some(context) = self.context.take() else {
            return Ok(None);
        };
        let left = effective_boolean_value(&self.left.materialize(&context)?)?;
        let result = match (self.connective, left) {
            (Connective::And, false) => false,
            (Connective::Or, true) => true,
            _ => effective_boolean_value(&self.right.materialize(&context)?)?,
        };
        Ok(Some(Item::Boolean(result)))
    }

    fn stop(&mut self) {
        self.context = None;
    }

    fn dependencies(&self, out: &mut VariableSet) {
        self.left.collect_dependencies(out);
        self.right.collect_dependencies(out);
    }
}

pub fn and(left: BoxedIterator, right: BoxedIterator, metadata: Metadata) -> BoxedIterator {
    Box::new(OperatorIterator::new(Logical { left, right, connective: Connective::And, context: None }, metadata))
}

pub fn or(left: BoxedIterator, right: BoxedIterator, metadata: Metadata) -> BoxedIterator {
    Box::new(OperatorIterator::new(Logical { left, right, connective: Connective::Or, context: None }, metadata))
}

pub struct Not {
    operand: BoxedIterator,
    context: Option<Arc<DynamicContext>>,
}

impl Operator for Not {
    type Output = Item;

    fn name(&self) -> &'static str {
        "not"
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        self.context = Some(Arc::clone(context));
        Ok(())
    }

    fn produce(&mut self) -> Result<Option<Item>> {
        let Some(context) = self.context.take() else {
            return Ok(None);
        };
        let value = effective_boolean_value(&self.operand.materialize(&context)?)?;
        Ok(Some(Item::Boolean(!value)))
    }

    fn stop(&mut self) {
        self.context = None;
    }

    fn dependencies(&self, out: &mut VariableSet) {
        self.operand.collect_dependencies(out);
    }
}

pub fn not(operand: BoxedIterator, metadata: Metadata) -> BoxedIterator {
    Box::new(OperatorIterator::new(Not { operand, context: None }, metadata))
}

/// `if (c) then a else b`; only the selected branch is opened.
pub struct Conditional {
    condition: BoxedIterator,
    then_branch: BoxedIterator,
    else_branch: BoxedIterator,
    // Some(true): then branch, Some(false): else branch
    selected: Option<bool>,
}

impl Conditional {
    fn branch(&mut self) -> Option<&mut BoxedIterator> {
        match self.selected {
            Some(true) => Some(&mut self.then_branch),
            Some(false) => Some(&mut self.else_branch),
            None => None,
        }
    }
}

impl Operator for Conditional {
    type Output = Item;

    fn name(&self) -> &'static str {
        "if-then-else"
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        let take_then = effective_boolean_value(&self.condition.materialize(context)?)?;
        self.selected = Some(take_then);
        if let Some(branch) = self.branch() {
            branch.open(context)?;
        }
        Ok(())
    }

    fn produce(&mut self) -> Result<Option<Item>> {
        match self.branch() {
            Some(branch) if branch.has_next() => branch.next().map(Some),
            _ => Ok(None),
        }
    }

    fn stop(&mut self) {
        if let Some(branch) = self.branch() {
            branch.close();
        }
        self.selected = None;
    }

    fn dependencies(&self, out: &mut VariableSet) {
        self.condition.collect_dependencies(out);
        self.then_branch.collect_dependencies(out);
        self.else_branch.collect_dependencies(out);
    }
}

pub fn conditional(
    condition: BoxedIterator,
    then_branch: BoxedIterator,
    else_branch: BoxedIterator,
    metadata: Metadata,
) -> BoxedIterator {
    Box::new(OperatorIterator::new(Conditional { condition, then_branch, else_branch, selected: None }, metadata))
}
