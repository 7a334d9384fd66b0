use std::sync::Arc;

use crate::item::Item;
use crate::runtime::context::DynamicContext;
use crate::runtime::iterator::{BoxedIterator, Metadata, Operator, OperatorIterator, Result, VariableSet};

/// `left ! right`: the right operand is rescanned once per left item, with
/// that item (and its 1-based position) as the focus.
pub struct SimpleMap {
    left: BoxedIterator,
    right: BoxedIterator,
    context: Option<Arc<DynamicContext>>,
    position: usize,
    right_open: bool,
}

impl Operator for SimpleMap {
    type Output = Item;

    fn name(&self) -> &'static str {
        "simple-map"
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        self.context = Some(Arc::clone(context));
        self.position = 0;
        self.right_open = false;
        self.left.open(context)
    }

    fn produce(&mut self) -> Result<Option<Item>> {
        let Some(context) = self.context.as_ref() else {
            return Ok(None);
        };
        loop {
            if self.right_open {
                if self.right.has_next() {
                    return self.right.next().map(Some);
                }
                self.right.close();
                self.right_open = false;
            }
            if !self.left.has_next() {
                return Ok(None);
            }
            let item = self.left.next()?;
            self.position += 1;
            let mut frame = DynamicContext::child(context);
            frame.set_focus(item, self.position);
            self.right.open(&Arc::new(frame))?;
            self.right_open = true;
        }
    }

    fn stop(&mut self) {
        self.right.close();
        self.left.close();
        self.right_open = false;
        self.context = None;
    }

    fn dependencies(&self, out: &mut VariableSet) {
        self.left.collect_dependencies(out);
        self.right.collect_dependencies(out);
    }
}

pub type SimpleMapIterator = OperatorIterator<SimpleMap>;

pub fn simple_map(left: BoxedIterator, right: BoxedIterator, metadata: Metadata) -> BoxedIterator {
    let operator = SimpleMap { left, right, context: None, position: 0, right_open: false };
    Box::new(OperatorIterator::new(operator, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimeIterator;
    use crate::runtime::iterators::primary::{comma, context_item, empty_sequence, sequence};

    fn md() -> Metadata {
        Metadata::default()
    }

    #[test]
    fn each_left_item_becomes_the_focus() {
        let ctx = DynamicContext::empty();
        let right = comma(vec![context_item(md()), context_item(md())], md());
        let mut it = simple_map(sequence(vec![Item::Int(1), Item::Int(2)], md()), right, md());
        assert_eq!(it.materialize(&ctx).unwrap(), vec![Item::Int(1), Item::Int(1), Item::Int(2), Item::Int(2)]);
    }

    #[test]
    fn empty_right_results_are_skipped() {
        let ctx = DynamicContext::empty();
        let mut it = simple_map(sequence(vec![Item::Int(1), Item::Int(2)], md()), empty_sequence(md()), md());
        assert!(it.materialize(&ctx).unwrap().is_empty());
    }
}
