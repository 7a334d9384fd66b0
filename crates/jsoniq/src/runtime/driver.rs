//! Entry points for callers holding a finished iterator tree.

use std::sync::Arc;

use crate::item::{Item, Sequence};
use crate::runtime::context::DynamicContext;
use crate::runtime::iterator::{BoxedIterator, Result};

/// Evaluate `root` to completion.
pub fn evaluate(root: &mut BoxedIterator, context: &Arc<DynamicContext>) -> Result<Sequence> {
    let span = tracing::debug_span!("evaluate", metadata = %root.metadata());
    let _guard = span.enter();
    let items = root.materialize(context)?;
    tracing::debug!(items = items.len(), "evaluation finished");
    Ok(items)
}

/// Evaluate `root` only as far as its first item.
pub fn evaluate_first(root: &mut BoxedIterator, context: &Arc<DynamicContext>) -> Result<Option<Item>> {
    let span = tracing::debug_span!("evaluate_first", metadata = %root.metadata());
    let _guard = span.enter();
    root.open(context)?;
    let first = if root.has_next() { root.next().map(Some) } else { Ok(None) };
    root.close();
    first
}

/// Lazily pulls the items of an opened tree. Dropping the stream closes the
/// root, which cancels every scan below it.
pub struct ItemStream {
    root: BoxedIterator,
    done: bool,
}

/// Open `root` and hand it out as a standard [`Iterator`].
pub fn stream(mut root: BoxedIterator, context: &Arc<DynamicContext>) -> Result<ItemStream> {
    tracing::debug!(metadata = %root.metadata(), "stream opened");
    root.open(context)?;
    Ok(ItemStream { root, done: false })
}

impl Iterator for ItemStream {
    type Item = Result<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.root.has_next() {
            self.done = true;
            self.root.close();
            return None;
        }
        let item = self.root.next();
        if item.is_err() {
            self.done = true;
            self.root.close();
        }
        Some(item)
    }
}

impl Drop for ItemStream {
    fn drop(&mut self) {
        self.root.close();
    }
}
