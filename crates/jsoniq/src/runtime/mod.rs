//! Iterator runtime: the pull protocol, dynamic context, dispatch tables and
//! the operator library.

pub mod compare;
pub mod context;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod flwor;
pub mod iterator;
pub mod iterators;

pub use compare::ComparisonOp;
pub use context::{DynamicContext, DynamicContextBuilder, Focus};
pub use dispatch::{AdditiveOp, MultiplicativeOp};
pub use driver::{ItemStream, evaluate, evaluate_first, stream};
pub use error::{Error, ErrorCode, ErrorKind};
pub use iterator::{
    BoxedIterator, Metadata, Operator, OperatorIterator, OperatorState, Result, RuntimeIterator, VariableSet,
};
