//! FLWOR evaluation as a pipeline of tuple streams.
//!
//! Every clause pulls tuples from the clause before it and pushes extended
//! (or filtered, reordered, grouped) tuples downstream. The first clause of a
//! FLWOR has no parent and starts from a single empty tuple. `return` turns
//! the final tuple stream back into an item stream.

mod clauses;
mod group;
mod order;

use std::sync::Arc;

use compact_str::CompactString;
use indexmap::IndexMap;

use crate::item::{Item, Sequence};
use crate::runtime::context::DynamicContext;
use crate::runtime::error::Error;
use crate::runtime::iterator::{BoxedIterator, Metadata, Operator, OperatorIterator, Result, VariableSet};

pub use clauses::{count_clause, for_clause, let_clause, where_clause};
pub use group::{GroupSpec, group_by_clause};
pub use order::{OrderSpec, order_by_clause};

/// Variable bindings of one FLWOR iteration, in binding order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tuple {
    bindings: IndexMap<CompactString, Arc<Sequence>>,
}

impl Tuple {
    pub fn bind(&mut self, name: impl Into<CompactString>, value: Sequence) {
        self.bindings.insert(name.into(), Arc::new(value));
    }

    pub fn bind_shared(&mut self, name: impl Into<CompactString>, value: Arc<Sequence>) {
        self.bindings.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Sequence>> {
        self.bindings.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(CompactString::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Sequence>)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// A frame below `parent` holding every binding of this tuple.
    pub fn to_context(&self, parent: &Arc<DynamicContext>) -> Arc<DynamicContext> {
        let mut frame = DynamicContext::child(parent);
        for (name, value) in &self.bindings {
            frame.bind_shared(name.clone(), Arc::clone(value));
        }
        Arc::new(frame)
    }
}

/// Pull protocol over tuples; mirrors [`RuntimeIterator`](crate::runtime::RuntimeIterator).
pub trait TupleStream: Send {
    fn open(&mut self, context: &Arc<DynamicContext>) -> Result<()>;

    fn has_next(&self) -> bool;

    fn next(&mut self) -> Result<Tuple>;

    fn close(&mut self);

    /// Free variables read by this clause and the clauses before it.
    fn collect_dependencies(&self, out: &mut VariableSet);

    /// Variables visible in the tuples this stream produces.
    fn bound_variables(&self, out: &mut VariableSet);
}

pub type BoxedTupleStream = Box<dyn TupleStream>;

impl<O: Operator<Output = Tuple>> TupleStream for OperatorIterator<O> {
    fn open(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        self.open_scan(context)
    }

    fn has_next(&self) -> bool {
        self.has_next_value()
    }

    fn next(&mut self) -> Result<Tuple> {
        self.next_value()
    }

    fn close(&mut self) {
        self.close_scan();
    }

    fn collect_dependencies(&self, out: &mut VariableSet) {
        self.operator().dependencies(out);
    }

    fn bound_variables(&self, out: &mut VariableSet) {
        self.operator().bound_variables(out);
    }
}

/// Parent of a clause: another clause, or the single empty tuple a FLWOR
/// starts from.
pub(crate) struct Upstream {
    parent: Option<BoxedTupleStream>,
    seeded: bool,
}

impl Upstream {
    pub(crate) fn new(parent: Option<BoxedTupleStream>) -> Self {
        Self { parent, seeded: false }
    }

    pub(crate) fn open(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        self.seeded = false;
        match &mut self.parent {
            Some(parent) => parent.open(context),
            None => Ok(()),
        }
    }

    pub(crate) fn next_tuple(&mut self) -> Result<Option<Tuple>> {
        match &mut self.parent {
            Some(parent) if parent.has_next() => parent.next().map(Some),
            Some(_) => Ok(None),
            None if self.seeded => Ok(None),
            None => {
                self.seeded = true;
                Ok(Some(Tuple::default()))
            }
        }
    }

    pub(crate) fn close(&mut self) {
        if let Some(parent) = &mut self.parent {
            parent.close();
        }
    }

    pub(crate) fn bound_variables(&self, out: &mut VariableSet) {
        if let Some(parent) = &self.parent {
            parent.bound_variables(out);
        }
    }

    /// Upstream dependencies plus those of `expressions`, minus whatever the
    /// upstream clauses bind.
    pub(crate) fn dependencies<'a>(
        &self,
        expressions: impl IntoIterator<Item = &'a BoxedIterator>,
        out: &mut VariableSet,
    ) {
        if let Some(parent) = &self.parent {
            parent.collect_dependencies(out);
        }
        let mut bound = VariableSet::default();
        self.bound_variables(&mut bound);
        for expression in expressions {
            for name in expression.variable_dependencies() {
                if !bound.contains(&name) {
                    out.insert(name);
                }
            }
        }
    }
}

/// Position numbers are `int` while they fit.
pub(crate) fn position_item(position: usize) -> Item {
    i32::try_from(position).map(Item::Int).unwrap_or_else(|_| Item::integer(position))
}

/// Order and group keys are at most one atomic item.
pub(crate) fn atomic_key(mut key: Sequence, clause: &str) -> Result<Option<Item>> {
    match key.len() {
        0 => Ok(None),
        1 => {
            let item = key.swap_remove(0);
            if item.is_atomic() {
                Ok(Some(item))
            } else {
                Err(Error::unexpected_type(format!(
                    "{clause} keys must be atomic, found an item of type \"{}\"",
                    item.type_name()
                )))
            }
        }
        n => Err(Error::unexpected_type(format!("{clause} keys must hold at most one item, found {n}"))),
    }
}

/// `return expr`: evaluates `expr` once per tuple and flattens the results.
pub struct Return {
    upstream: BoxedTupleStream,
    expression: BoxedIterator,
    context: Option<Arc<DynamicContext>>,
    expression_open: bool,
}

impl Operator for Return {
    type Output = Item;

    fn name(&self) -> &'static str {
        "return-clause"
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        self.context = Some(Arc::clone(context));
        self.expression_open = false;
        self.upstream.open(context)
    }

    fn produce(&mut self) -> Result<Option<Item>> {
        let Some(context) = self.context.as_ref() else {
            return Ok(None);
        };
        loop {
            if self.expression_open {
                if self.expression.has_next() {
                    return self.expression.next().map(Some);
                }
                self.expression.close();
                self.expression_open = false;
            }
            if !self.upstream.has_next() {
                return Ok(None);
            }
            let tuple = self.upstream.next()?;
            self.expression.open(&tuple.to_context(context))?;
            self.expression_open = true;
        }
    }

    fn stop(&mut self) {
        self.expression.close();
        self.upstream.close();
        self.expression_open = false;
        self.context = None;
    }

    fn dependencies(&self, out: &mut VariableSet) {
        self.upstream.collect_dependencies(out);
        let mut bound = VariableSet::default();
        self.upstream.bound_variables(&mut bound);
        for name in self.expression.variable_dependencies() {
            if !bound.contains(&name) {
                out.insert(name);
            }
        }
    }
}

pub type FlworIterator = OperatorIterator<Return>;

/// Closes a clause pipeline into an item stream.
pub fn flwor(clauses: BoxedTupleStream, expression: BoxedIterator, metadata: Metadata) -> BoxedIterator {
    let operator = Return { upstream: clauses, expression, context: None, expression_open: false };
    Box::new(OperatorIterator::new(operator, metadata))
}
