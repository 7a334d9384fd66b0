//! Operator library. Each operator is an [`Operator`](crate::runtime::Operator)
//! wrapped in an [`OperatorIterator`](crate::runtime::OperatorIterator); the
//! free functions build boxed nodes for the tree assembler.

pub mod arithmetic;
pub mod comparison;
pub mod logic;
pub mod object;
pub mod primary;
pub mod simple_map;

pub use arithmetic::{additive, multiplicative, unary};
pub use comparison::{general_comparison, value_comparison};
pub use logic::{and, conditional, not, or};
pub use object::{
    ObjectProjection, array_constructor, array_lookup, array_unboxing, object_constructor, object_lookup, project,
};
pub use primary::{
    ItemSource, SourceIterator, VecSource, comma, constant, context_item, empty_sequence, range, sequence, source,
    variable,
};
pub use simple_map::simple_map;
