pub mod bridge;
pub mod functions;
pub mod item;
pub mod runtime;

pub use bridge::{ItemCodec, LetClosure, ObjectProjection, TaggedJsonCodec};
pub use functions::{FunctionRegistry, ResolveError, default_function_registry};
pub use item::{Item, ItemType, ObjectMap, Sequence, effective_boolean_value};
pub use runtime::{
    BoxedIterator, DynamicContext, DynamicContextBuilder, Error, ErrorCode, ErrorKind, ItemStream, Metadata,
    RuntimeIterator, evaluate, evaluate_first, stream,
};
