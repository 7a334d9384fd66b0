//! Leaf and structural operators: literals, sequence concatenation, ranges,
//! variable and context-item references, external item sources.

use std::sync::Arc;

use compact_str::CompactString;
use num_bigint::BigInt;
use num_traits::{One, ToPrimitive};

use crate::item::{Item, Sequence};
use crate::runtime::context::DynamicContext;
use crate::runtime::error::{Error, ErrorCode};
use crate::runtime::iterator::{
    BoxedIterator, Metadata, Operator, OperatorIterator, Result, VariableSet, at_most_one_operand,
};

/// Emits a fixed sequence of items.
pub struct Literal {
    items: Sequence,
    index: usize,
}

impl Operator for Literal {
    type Output = Item;

    fn name(&self) -> &'static str {
        "literal"
    }

    fn start(&mut self, _context: &Arc<DynamicContext>) -> Result<()> {
        self.index = 0;
        Ok(())
    }

    fn produce(&mut self) -> Result<Option<Item>> {
        let item = self.items.get(self.index).cloned();
        self.index += 1;
        Ok(item)
    }

    fn stop(&mut self) {}

    fn dependencies(&self, _out: &mut VariableSet) {}
}

pub fn constant(item: Item, metadata: Metadata) -> BoxedIterator {
    Box::new(OperatorIterator::new(Literal { items: vec![item], index: 0 }, metadata))
}

pub fn sequence(items: Sequence, metadata: Metadata) -> BoxedIterator {
    Box::new(OperatorIterator::new(Literal { items, index: 0 }, metadata))
}

/// `()`
pub fn empty_sequence(metadata: Metadata) -> BoxedIterator {
    sequence(Vec::new(), metadata)
}

/// `a, b, c`: children drained one after another.
pub struct Comma {
    children: Vec<BoxedIterator>,
    current: usize,
    context: Option<Arc<DynamicContext>>,
}

impl Operator for Comma {
    type Output = Item;

    fn name(&self) -> &'static str {
        "comma"
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        self.current = 0;
        self.context = Some(Arc::clone(context));
        if let Some(first) = self.children.first_mut() {
            first.open(context)?;
        }
        Ok(())
    }

    fn produce(&mut self) -> Result<Option<Item>> {
        let Some(context) = self.context.clone() else {
            return Ok(None);
        };
        while self.current < self.children.len() {
            let child = &mut self.children[self.current];
            if child.has_next() {
                return child.next().map(Some);
            }
            child.close();
            self.current += 1;
            if let Some(next) = self.children.get_mut(self.current) {
                next.open(&context)?;
            }
        }
        Ok(None)
    }

    fn stop(&mut self) {
        for child in &mut self.children {
            child.close();
        }
        self.context = None;
    }

    fn dependencies(&self, out: &mut VariableSet) {
        for child in &self.children {
            child.collect_dependencies(out);
        }
    }
}

pub fn comma(children: Vec<BoxedIterator>, metadata: Metadata) -> BoxedIterator {
    Box::new(OperatorIterator::new(Comma { children, current: 0, context: None }, metadata))
}

/// `from to to` over integers. Empty when either bound is empty or `from > to`.
pub struct Range {
    from: BoxedIterator,
    to: BoxedIterator,
    metadata: Metadata,
    next: BigInt,
    last: Option<BigInt>,
}

impl Range {
    fn bound(&mut self, context: &Arc<DynamicContext>, left: bool) -> Result<Option<BigInt>> {
        let metadata = self.metadata;
        let (child, side) = if left { (&mut self.from, "left") } else { (&mut self.to, "right") };
        let Some(item) = at_most_one_operand(child.as_mut(), context, "Range", side, metadata)? else {
            return Ok(None);
        };
        item.to_big_integer().map(Some).ok_or_else(|| {
            Error::unexpected_type(format!(
                "Range expression requires integer bounds, found an item of type \"{}\"",
                item.type_name()
            ))
        })
    }
}

impl Operator for Range {
    type Output = Item;

    fn name(&self) -> &'static str {
        "range"
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        self.last = None;
        let from = self.bound(context, true)?;
        let to = self.bound(context, false)?;
        if let (Some(from), Some(to)) = (from, to) {
            self.next = from;
            self.last = Some(to);
        }
        Ok(())
    }

    fn produce(&mut self) -> Result<Option<Item>> {
        match &self.last {
            Some(last) if self.next <= *last => {
                let value = self.next.clone();
                self.next += BigInt::one();
                Ok(Some(value.to_i32().map_or(Item::Integer(value), Item::Int)))
            }
            _ => Ok(None),
        }
    }

    fn stop(&mut self) {
        self.last = None;
    }

    fn dependencies(&self, out: &mut VariableSet) {
        self.from.collect_dependencies(out);
        self.to.collect_dependencies(out);
    }
}

pub fn range(from: BoxedIterator, to: BoxedIterator, metadata: Metadata) -> BoxedIterator {
    Box::new(OperatorIterator::new(Range { from, to, metadata, next: BigInt::default(), last: None }, metadata))
}

/// `$name`
pub struct VariableReference {
    name: CompactString,
    value: Option<Arc<Sequence>>,
    index: usize,
}

impl Operator for VariableReference {
    type Output = Item;

    fn name(&self) -> &'static str {
        "variable-reference"
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        self.index = 0;
        let value = context.variable(&self.name).ok_or_else(|| {
            Error::from_code(ErrorCode::XPST0008, format!("variable ${} is not bound", self.name))
        })?;
        self.value = Some(Arc::clone(value));
        Ok(())
    }

    fn produce(&mut self) -> Result<Option<Item>> {
        let item = self.value.as_ref().and_then(|v| v.get(self.index).cloned());
        self.index += 1;
        Ok(item)
    }

    fn stop(&mut self) {
        self.value = None;
    }

    fn dependencies(&self, out: &mut VariableSet) {
        out.insert(self.name.clone());
    }
}

pub fn variable(name: impl Into<CompactString>, metadata: Metadata) -> BoxedIterator {
    Box::new(OperatorIterator::new(VariableReference { name: name.into(), value: None, index: 0 }, metadata))
}

/// `$$` / `.`
pub struct ContextItem {
    item: Option<Item>,
}

impl Operator for ContextItem {
    type Output = Item;

    fn name(&self) -> &'static str {
        "context-item"
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        let item = context
            .context_item()
            .ok_or_else(|| Error::from_code(ErrorCode::XPDY0002, "the context item is absent"))?;
        self.item = Some(item.clone());
        Ok(())
    }

    fn produce(&mut self) -> Result<Option<Item>> {
        Ok(self.item.take())
    }

    fn stop(&mut self) {
        self.item = None;
    }

    fn dependencies(&self, _out: &mut VariableSet) {}
}

pub fn context_item(metadata: Metadata) -> BoxedIterator {
    Box::new(OperatorIterator::new(ContextItem { item: None }, metadata))
}

/// A backing store the runtime can pull items from.
pub trait ItemSource: Send {
    fn open(&mut self) -> Result<()>;

    fn next_item(&mut self) -> Option<Result<Item>>;

    fn close(&mut self);
}

/// In-memory source, mostly for tests and drivers that already hold the data.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    items: Sequence,
    position: usize,
}

impl VecSource {
    pub fn new(items: Sequence) -> Self {
        Self { items, position: 0 }
    }
}

impl ItemSource for VecSource {
    fn open(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }

    fn next_item(&mut self) -> Option<Result<Item>> {
        let item = self.items.get(self.position).cloned()?;
        self.position += 1;
        Some(Ok(item))
    }

    fn close(&mut self) {}
}

/// Adapts an [`ItemSource`] to the pull protocol.
pub struct Source<S: ItemSource> {
    source: S,
}

impl<S: ItemSource> Operator for Source<S> {
    type Output = Item;

    fn name(&self) -> &'static str {
        "source"
    }

    fn start(&mut self, _context: &Arc<DynamicContext>) -> Result<()> {
        self.source.open()
    }

    fn produce(&mut self) -> Result<Option<Item>> {
        self.source.next_item().transpose()
    }

    fn stop(&mut self) {
        self.source.close();
    }

    fn dependencies(&self, _out: &mut VariableSet) {}
}

pub type SourceIterator<S> = OperatorIterator<Source<S>>;

pub fn source<S: ItemSource + 'static>(source: S, metadata: Metadata) -> BoxedIterator {
    Box::new(OperatorIterator::new(Source { source }, metadata))
}
