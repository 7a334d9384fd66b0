//! The pull protocol every runtime operator speaks.
//!
//! An iterator is `open`ed against a [`DynamicContext`], drained with
//! `has_next`/`next`, and `close`d. Reopening with another context resets all
//! state; this is how correlated subexpressions are rescanned per outer item.
//!
//! Most operators only describe how to produce their next value
//! ([`Operator`]); [`OperatorIterator`] wraps them with the shared state
//! machine, the one-value look-ahead behind `has_next`, and the flow checks.

use core::fmt;
use std::sync::Arc;

use compact_str::CompactString;
use indexmap::IndexSet;

use crate::item::{Item, Sequence};
use crate::runtime::context::DynamicContext;
use crate::runtime::error::{Error, ErrorKind};

pub type Result<T> = std::result::Result<T, Error>;

/// Names of the free variables an iterator tree reads.
pub type VariableSet = IndexSet<CompactString>;

pub type BoxedIterator = Box<dyn RuntimeIterator>;

/// Source position of the expression an iterator evaluates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Metadata {
    pub line: u32,
    pub column: u32,
}

impl Metadata {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}:{}", self.line, self.column)
    }
}

pub trait RuntimeIterator: Send {
    /// Start (or restart) a scan against `context`.
    fn open(&mut self, context: &Arc<DynamicContext>) -> Result<()>;

    /// Whether `next` would yield an item (or a pending error).
    fn has_next(&self) -> bool;

    fn next(&mut self) -> Result<Item>;

    /// Release resources. Idempotent; allowed in any state.
    fn close(&mut self);

    fn metadata(&self) -> Metadata;

    /// Add the free variables of this subtree to `out`.
    fn collect_dependencies(&self, out: &mut VariableSet);

    fn variable_dependencies(&self) -> VariableSet {
        let mut out = VariableSet::default();
        self.collect_dependencies(&mut out);
        out
    }

    /// Open, drain and close.
    fn materialize(&mut self, context: &Arc<DynamicContext>) -> Result<Sequence> {
        self.open(context)?;
        let mut out = Vec::new();
        while self.has_next() {
            match self.next() {
                Ok(item) => out.push(item),
                Err(e) => {
                    self.close();
                    return Err(e);
                }
            }
        }
        self.close();
        Ok(out)
    }

    /// Open, pull at most one item, close. A second item is a cardinality error.
    fn materialize_at_most_one_item(&mut self, context: &Arc<DynamicContext>) -> Result<Option<Item>> {
        self.open(context)?;
        if !self.has_next() {
            self.close();
            return Ok(None);
        }
        let first = match self.next() {
            Ok(item) => item,
            Err(e) => {
                self.close();
                return Err(e);
            }
        };
        let plural = self.has_next();
        self.close();
        if plural {
            return Err(Error::cardinality("a sequence of more than one item is not allowed here")
                .with_metadata(self.metadata()));
        }
        Ok(Some(first))
    }
}

/// Materialize an operand that must hold at most one item, naming the operand
/// in the cardinality error.
pub(crate) fn at_most_one_operand(
    child: &mut dyn RuntimeIterator,
    context: &Arc<DynamicContext>,
    expression: &str,
    side: &str,
    metadata: Metadata,
) -> Result<Option<Item>> {
    child.materialize_at_most_one_item(context).map_err(|e| {
        if e.kind() == ErrorKind::Cardinality {
            let operand = if side.is_empty() { String::new() } else { format!("{side} ") };
            Error::cardinality(format!(
                "{expression} expression requires at most one item in its {operand}input sequence."
            ))
            .with_metadata(metadata)
        } else {
            e
        }
    })
}

/// Body of a streaming operator.
///
/// `start` binds the context and opens eager children; `produce` yields the
/// next output value or `None` once exhausted; `stop` closes children.
pub trait Operator: Send {
    type Output: Send;

    fn name(&self) -> &'static str;

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()>;

    fn produce(&mut self) -> Result<Option<Self::Output>>;

    fn stop(&mut self);

    fn dependencies(&self, out: &mut VariableSet);

    /// Variables this operator binds for the operators downstream of it.
    fn bound_variables(&self, _out: &mut VariableSet) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorState {
    Created,
    Open,
    Exhausted,
    Closed,
}

/// Drives an [`Operator`] with one value of look-ahead.
///
/// Errors raised while computing the look-ahead are held back and returned by
/// the following `next`, so values produced before them stay observable.
pub struct OperatorIterator<O: Operator> {
    operator: O,
    state: OperatorState,
    lookahead: Option<Result<O::Output>>,
    metadata: Metadata,
}

impl<O: Operator> OperatorIterator<O> {
    pub fn new(operator: O, metadata: Metadata) -> Self {
        Self { operator, state: OperatorState::Created, lookahead: None, metadata }
    }

    pub fn state(&self) -> OperatorState {
        self.state
    }

    pub fn operator(&self) -> &O {
        &self.operator
    }

    pub fn open_scan(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        if matches!(self.state, OperatorState::Open | OperatorState::Exhausted) {
            self.operator.stop();
        }
        self.lookahead = None;
        tracing::trace!(operator = self.operator.name(), "open");
        if let Err(e) = self.operator.start(context) {
            self.operator.stop();
            self.state = OperatorState::Exhausted;
            return Err(e.with_metadata(self.metadata));
        }
        self.state = OperatorState::Open;
        self.advance();
        Ok(())
    }

    fn advance(&mut self) {
        match self.operator.produce() {
            Ok(Some(value)) => self.lookahead = Some(Ok(value)),
            Ok(None) => {
                self.lookahead = None;
                self.state = OperatorState::Exhausted;
            }
            Err(e) => self.lookahead = Some(Err(e.with_metadata(self.metadata))),
        }
    }

    pub fn has_next_value(&self) -> bool {
        self.state == OperatorState::Open && self.lookahead.is_some()
    }

    pub fn next_value(&mut self) -> Result<O::Output> {
        match self.state {
            OperatorState::Created => {
                return Err(Error::flow(format!("{}: next() called before open()", self.operator.name()))
                    .with_metadata(self.metadata));
            }
            OperatorState::Closed => {
                return Err(Error::flow(format!("{}: next() called after close()", self.operator.name()))
                    .with_metadata(self.metadata));
            }
            OperatorState::Open | OperatorState::Exhausted => {}
        }
        match self.lookahead.take() {
            Some(Ok(value)) => {
                self.advance();
                Ok(value)
            }
            Some(Err(e)) => {
                self.state = OperatorState::Exhausted;
                Err(e)
            }
            None => Err(Error::flow(format!("{}: no more items", self.operator.name())).with_metadata(self.metadata)),
        }
    }

    pub fn close_scan(&mut self) {
        if matches!(self.state, OperatorState::Open | OperatorState::Exhausted) {
            tracing::trace!(operator = self.operator.name(), "close");
            self.operator.stop();
        }
        self.lookahead = None;
        self.state = OperatorState::Closed;
    }

    pub fn metadata(&self) -> Metadata {
        self.metadata
    }
}

impl<O: Operator<Output = Item>> RuntimeIterator for OperatorIterator<O> {
    fn open(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        self.open_scan(context)
    }

    fn has_next(&self) -> bool {
        self.has_next_value()
    }

    fn next(&mut self) -> Result<Item> {
        self.next_value()
    }

    fn close(&mut self) {
        self.close_scan();
    }

    fn metadata(&self) -> Metadata {
        self.metadata
    }

    fn collect_dependencies(&self, out: &mut VariableSet) {
        self.operator.dependencies(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::error::ErrorCode;

    struct Countdown {
        from: i32,
        current: i32,
        fail_at: Option<i32>,
    }

    impl Operator for Countdown {
        type Output = Item;

        fn name(&self) -> &'static str {
            "countdown"
        }

        fn start(&mut self, _context: &Arc<DynamicContext>) -> Result<()> {
            self.current = self.from;
            Ok(())
        }

        fn produce(&mut self) -> Result<Option<Item>> {
            if self.current == 0 {
                return Ok(None);
            }
            if self.fail_at == Some(self.current) {
                self.current = 0;
                return Err(Error::from_code(ErrorCode::FOER0000, "boom"));
            }
            self.current -= 1;
            Ok(Some(Item::Int(self.current + 1)))
        }

        fn stop(&mut self) {}

        fn dependencies(&self, _out: &mut VariableSet) {}
    }

    fn countdown(from: i32, fail_at: Option<i32>) -> OperatorIterator<Countdown> {
        OperatorIterator::new(Countdown { from, current: 0, fail_at }, Metadata::new(3, 7))
    }

    #[test]
    fn next_before_open_is_a_flow_error() {
        let mut it = countdown(2, None);
        assert!(it.next().unwrap_err().is_flow());
    }

    #[test]
    fn next_after_exhaustion_and_close_are_flow_errors() {
        let ctx = DynamicContext::empty();
        let mut it = countdown(1, None);
        it.open(&ctx).unwrap();
        assert_eq!(it.next().unwrap(), Item::Int(1));
        assert!(!it.has_next());
        assert!(it.next().unwrap_err().is_flow());
        it.close();
        it.close();
        assert!(it.next().unwrap_err().is_flow());
    }

    #[test]
    fn reopening_resets_the_scan() {
        let ctx = DynamicContext::empty();
        let mut it = countdown(2, None);
        assert_eq!(it.materialize(&ctx).unwrap(), vec![Item::Int(2), Item::Int(1)]);
        assert_eq!(it.materialize(&ctx).unwrap(), vec![Item::Int(2), Item::Int(1)]);
    }

    #[test]
    fn lookahead_errors_surface_on_the_following_next() {
        let ctx = DynamicContext::empty();
        let mut it = countdown(3, Some(2));
        it.open(&ctx).unwrap();
        assert_eq!(it.next().unwrap(), Item::Int(3));
        assert!(it.has_next());
        let err = it.next().unwrap_err();
        assert_eq!(err.code, ErrorCode::FOER0000);
        assert_eq!(err.metadata, Some(Metadata::new(3, 7)));
        assert!(!it.has_next());
    }

    #[test]
    fn at_most_one_rejects_a_second_item() {
        let ctx = DynamicContext::empty();
        assert_eq!(countdown(1, None).materialize_at_most_one_item(&ctx).unwrap(), Some(Item::Int(1)));
        assert_eq!(countdown(0, None).materialize_at_most_one_item(&ctx).unwrap(), None);
        let err = countdown(2, None).materialize_at_most_one_item(&ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cardinality);
    }
}
