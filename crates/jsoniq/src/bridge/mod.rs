//! Boundary between the runtime and an external execution substrate.
//!
//! Items cross the boundary as bytes through an [`ItemCodec`]. Codecs and
//! closures keep their scratch state locally and rebuild it in `rehydrate`
//! after being shipped to another process.

mod codec;

use std::sync::Arc;

use compact_str::CompactString;

use crate::item::{Item, Sequence};
use crate::runtime::context::DynamicContext;
use crate::runtime::error::{Error, ErrorCode};
use crate::runtime::iterator::{BoxedIterator, Result, VariableSet};

pub use crate::runtime::iterators::ObjectProjection;
pub use codec::TaggedJsonCodec;

/// Item sequence <-> bytes.
pub trait ItemCodec: Send {
    fn encode(&mut self, items: &[Item]) -> Result<Vec<u8>>;

    fn decode(&mut self, bytes: &[u8]) -> Result<Sequence>;

    /// Rebuild transient state after the codec was moved across a process
    /// boundary.
    fn rehydrate(&mut self);
}

/// Evaluates a `let` expression over one row of encoded columns.
///
/// Only columns the expression actually reads are decoded and bound; the
/// result sequence is encoded with the same codec.
pub struct LetClosure<C: ItemCodec> {
    expression: BoxedIterator,
    columns: Vec<CompactString>,
    dependencies: VariableSet,
    codec: C,
    base: Arc<DynamicContext>,
}

impl<C: ItemCodec> LetClosure<C> {
    pub fn new(
        expression: BoxedIterator,
        columns: impl IntoIterator<Item = impl Into<CompactString>>,
        codec: C,
        base: Arc<DynamicContext>,
    ) -> Self {
        let dependencies = expression.variable_dependencies();
        Self { expression, columns: columns.into_iter().map(Into::into).collect(), dependencies, codec, base }
    }

    pub fn dependencies(&self) -> &VariableSet {
        &self.dependencies
    }

    pub fn call(&mut self, row: &[Vec<u8>]) -> Result<Vec<u8>> {
        if row.len() != self.columns.len() {
            return Err(Error::from_code(
                ErrorCode::FOER0000,
                format!("expected {} encoded columns, got {}", self.columns.len(), row.len()),
            ));
        }
        let mut frame = DynamicContext::child(&self.base);
        for (name, bytes) in self.columns.iter().zip(row) {
            if self.dependencies.contains(name) {
                frame.bind(name.clone(), self.codec.decode(bytes)?);
            }
        }
        let result = self.expression.materialize(&Arc::new(frame))?;
        self.codec.encode(&result)
    }

    pub fn rehydrate(&mut self) {
        tracing::debug!(columns = self.columns.len(), dependencies = self.dependencies.len(), "let closure rehydrated");
        self.codec.rehydrate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::dispatch::AdditiveOp;
    use crate::runtime::iterators::{additive, variable};
    use crate::runtime::Metadata;

    #[test]
    fn binds_only_dependency_columns() {
        let md = Metadata::default();
        let expression = additive(variable("a", md), variable("b", md), AdditiveOp::Add, md);
        let mut closure =
            LetClosure::new(expression, ["a", "junk", "b"], TaggedJsonCodec::new(), DynamicContext::empty());
        assert_eq!(closure.dependencies().len(), 2);

        let mut codec = TaggedJsonCodec::new();
        let a = codec.encode(&[Item::Int(2)]).unwrap();
        let b = codec.encode(&[Item::Int(40)]).unwrap();
        // never decoded, so it may be anything
        let junk = b"\xff".to_vec();
        let out = closure.call(&[a.clone(), junk.clone(), b.clone()]).unwrap();
        assert_eq!(codec.decode(&out).unwrap(), vec![Item::Int(42)]);

        closure.rehydrate();
        let out = closure.call(&[a, junk, b]).unwrap();
        assert_eq!(codec.decode(&out).unwrap(), vec![Item::Int(42)]);
    }

    #[test]
    fn column_count_mismatch() {
        let md = Metadata::default();
        let mut closure =
            LetClosure::new(variable("a", md), ["a"], TaggedJsonCodec::new(), DynamicContext::empty());
        assert_eq!(closure.call(&[]).unwrap_err().code, ErrorCode::FOER0000);
    }
}
