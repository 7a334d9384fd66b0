//! Built-in function library.
//!
//! Registration conventions:
//! - One registration per function name, using an arity range when optional
//!   parameters exist; dispatch on `args.len()` inside the body.
//! - Eager bodies receive fully materialized arguments. Functions that must
//!   stream their input (or keep their own flow checks) register a builder
//!   that assembles a dedicated iterator instead.

mod datetime;
mod durations;
mod objects;
mod sequences;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use compact_str::CompactString;

use crate::item::Sequence;
use crate::runtime::context::DynamicContext;
use crate::runtime::error::{Error, ErrorCode};
use crate::runtime::iterator::{BoxedIterator, Metadata, Operator, OperatorIterator, Result, VariableSet};

pub use durations::{DurationConstructor, duration_constructor};

pub type Arity = usize;

/// What an eager function body sees besides its arguments.
pub struct CallCtx<'a> {
    pub context: &'a Arc<DynamicContext>,
    pub metadata: Metadata,
}

pub type FunctionImpl = Arc<dyn Fn(&CallCtx<'_>, &[Sequence]) -> Result<Sequence> + Send + Sync>;

/// Builds the iterator for a streaming function call from its argument iterators.
pub type StreamingBuilder = Arc<dyn Fn(Vec<BoxedIterator>, Metadata) -> BoxedIterator + Send + Sync>;

#[derive(Clone)]
pub enum FunctionBody {
    Eager(FunctionImpl),
    Streaming(StreamingBuilder),
}

impl fmt::Debug for FunctionBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionBody::Eager(_) => f.write_str("FunctionBody::Eager"),
            FunctionBody::Streaming(_) => f.write_str("FunctionBody::Streaming"),
        }
    }
}

type Overload = (Arity, Option<Arity>, FunctionBody);

/// Error type returned by function resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    Unknown(CompactString),
    /// The name exists, but not for the requested arity.
    WrongArity { name: CompactString, available: Vec<Arity> },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::Unknown(name) => write!(f, "unknown function {name}()"),
            ResolveError::WrongArity { name, available } => {
                let arities: Vec<String> = available.iter().map(ToString::to_string).collect();
                write!(f, "function {name}() cannot be called with this arity (known arities: {})", arities.join(", "))
            }
        }
    }
}

impl From<ResolveError> for Error {
    fn from(e: ResolveError) -> Self {
        Error::from_code(ErrorCode::XPST0017, e.to_string())
    }
}

#[derive(Default)]
pub struct FunctionRegistry {
    // (min_arity, max_arity, body); `None` as max means variadic. Kept sorted so
    // the most specific overload (higher min, then smaller max) wins.
    fns: HashMap<CompactString, Vec<Overload>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_range(&mut self, name: &str, min_arity: Arity, max_arity: Option<Arity>, body: FunctionBody) {
        let overloads = self.fns.entry(CompactString::from(name)).or_default();
        overloads.push((min_arity, max_arity, body));
        overloads.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| match (a.1, b.1) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }));
    }

    pub fn register_fn<F>(&mut self, name: &str, arity: Arity, f: F)
    where
        F: 'static + Send + Sync + Fn(&CallCtx<'_>, &[Sequence]) -> Result<Sequence>,
    {
        self.register_range(name, arity, Some(arity), FunctionBody::Eager(Arc::new(f)));
    }

    pub fn register_fn_range<F>(&mut self, name: &str, min_arity: Arity, max_arity: Option<Arity>, f: F)
    where
        F: 'static + Send + Sync + Fn(&CallCtx<'_>, &[Sequence]) -> Result<Sequence>,
    {
        self.register_range(name, min_arity, max_arity, FunctionBody::Eager(Arc::new(f)));
    }

    pub fn register_streaming<F>(&mut self, name: &str, arity: Arity, build: F)
    where
        F: 'static + Send + Sync + Fn(Vec<BoxedIterator>, Metadata) -> BoxedIterator,
    {
        self.register_range(name, arity, Some(arity), FunctionBody::Streaming(Arc::new(build)));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fns.contains_key(name)
    }

    pub fn resolve(&self, name: &str, arity: Arity) -> std::result::Result<&FunctionBody, ResolveError> {
        let Some(overloads) = self.fns.get(name) else {
            return Err(ResolveError::Unknown(name.into()));
        };
        if let Some((_, _, body)) =
            overloads.iter().find(|(min, max, _)| arity >= *min && max.is_none_or(|m| arity <= m))
        {
            return Ok(body);
        }
        let mut available: Vec<Arity> =
            overloads.iter().filter_map(|(min, max, _)| max.map(|m| *min..=m)).flatten().collect();
        available.sort_unstable();
        available.dedup();
        Err(ResolveError::WrongArity { name: name.into(), available })
    }

    /// Assemble the iterator for `name(args...)`.
    pub fn build_call(&self, name: &str, args: Vec<BoxedIterator>, metadata: Metadata) -> Result<BoxedIterator> {
        let body = self.resolve(name, args.len()).map_err(|e| Error::from(e).with_metadata(metadata))?;
        Ok(match body {
            FunctionBody::Streaming(build) => build(args, metadata),
            FunctionBody::Eager(f) => Box::new(OperatorIterator::new(
                FunctionCall {
                    name: CompactString::from(name),
                    body: Arc::clone(f),
                    args,
                    metadata,
                    results: Vec::new().into_iter(),
                },
                metadata,
            )),
        })
    }
}

/// Runs an eager function body: arguments are materialized on open, the
/// result is streamed out.
pub struct FunctionCall {
    name: CompactString,
    body: FunctionImpl,
    args: Vec<BoxedIterator>,
    metadata: Metadata,
    results: std::vec::IntoIter<crate::item::Item>,
}

impl Operator for FunctionCall {
    type Output = crate::item::Item;

    fn name(&self) -> &'static str {
        "function-call"
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        let args = self.args.iter_mut().map(|a| a.materialize(context)).collect::<Result<Vec<_>>>()?;
        let call = CallCtx { context, metadata: self.metadata };
        tracing::trace!(function = %self.name, arity = args.len(), "call");
        self.results = (self.body)(&call, &args)?.into_iter();
        Ok(())
    }

    fn produce(&mut self) -> Result<Option<crate::item::Item>> {
        Ok(self.results.next())
    }

    fn stop(&mut self) {
        self.results = Vec::new().into_iter();
    }

    fn dependencies(&self, out: &mut VariableSet) {
        for arg in &self.args {
            arg.collect_dependencies(out);
        }
    }
}

/// Registry with every built-in function.
pub fn default_function_registry() -> FunctionRegistry {
    let mut reg = FunctionRegistry::new();
    durations::register(&mut reg);
    datetime::register(&mut reg);
    objects::register(&mut reg);
    sequences::register(&mut reg);
    reg
}

/// The single item of an at-most-one argument.
pub(crate) fn optional_argument<'a>(
    args: &'a [Sequence],
    index: usize,
    function: &str,
) -> Result<Option<&'a crate::item::Item>> {
    let arg = args.get(index).map(Vec::as_slice).unwrap_or(&[]);
    match arg {
        [] => Ok(None),
        [item] => Ok(Some(item)),
        _ => Err(Error::cardinality(format!(
            "{function}() expects at most one item as argument {}, found {}",
            index + 1,
            arg.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Item;
    use crate::runtime::RuntimeIterator;
    use crate::runtime::iterators::{constant, sequence};

    fn md() -> Metadata {
        Metadata::default()
    }

    #[test]
    fn resolution_reports_known_arities() {
        let reg = default_function_registry();
        assert!(reg.resolve("count", 1).is_ok());
        assert_eq!(reg.resolve("nope", 0).unwrap_err(), ResolveError::Unknown("nope".into()));
        match reg.resolve("count", 3).unwrap_err() {
            ResolveError::WrongArity { available, .. } => assert_eq!(available, vec![1]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_functions_fail_to_build() {
        let reg = default_function_registry();
        let err = reg.build_call("nope", vec![], Metadata::new(2, 4)).err().unwrap();
        assert_eq!(err.code, ErrorCode::XPST0017);
        assert_eq!(err.metadata, Some(Metadata::new(2, 4)));
    }

    #[test]
    fn custom_functions_see_the_context() {
        let mut reg = FunctionRegistry::new();
        reg.register_fn("answer", 0, |call, _args| {
            Ok(call.context.variable("x").map(|v| v.to_vec()).unwrap_or_default())
        });
        reg.register_fn_range("pick", 1, None, |_call, args| Ok(args.last().cloned().unwrap_or_default()));
        let ctx = DynamicContext::builder().with_variable("x", vec![Item::Int(42)]).build();
        let mut it = reg.build_call("answer", vec![], md()).unwrap();
        assert_eq!(it.materialize(&ctx).unwrap(), vec![Item::Int(42)]);
        let args = vec![constant(Item::Int(1), md()), sequence(vec![Item::Int(2), Item::Int(3)], md())];
        let mut it = reg.build_call("pick", args, md()).unwrap();
        assert_eq!(it.materialize(&ctx).unwrap(), vec![Item::Int(2), Item::Int(3)]);
    }
}
