use std::sync::Arc;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;

use super::{CallCtx, FunctionRegistry, optional_argument};
use crate::item::{Item, Sequence};
use crate::item::duration::{Duration, DurationKind};
use crate::runtime::context::DynamicContext;
use crate::runtime::dispatch::delta_nanos;
use crate::runtime::error::{Error, ErrorKind};
use crate::runtime::iterator::{BoxedIterator, Metadata, Operator, OperatorIterator, Result, VariableSet};

/// `duration($s)`, `yearMonthDuration($s)`, `dayTimeDuration($s)`.
///
/// Strings are parsed with the grammar of the requested kind; durations of
/// another kind are converted by dropping the components the target lacks.
pub struct DurationConstructor {
    argument: BoxedIterator,
    kind: DurationKind,
    input: Option<Item>,
}

impl DurationConstructor {
    fn convert(&self, item: Item) -> Result<Item> {
        let target = self.kind.type_name();
        match item {
            Item::String(literal) => Duration::parse(&literal, self.kind)
                .map(|d| Item::duration_of_kind(d, self.kind))
                .map_err(|_| Error::cast(&literal, "string", target)),
            other => match other.duration_parts() {
                Some(d) => Ok(Item::duration_of_kind(d, self.kind)),
                None => Err(Error::unexpected_type(format!(
                    "{target}() expects a string or a duration, found an item of type \"{}\"",
                    other.type_name()
                ))),
            },
        }
    }
}

impl Operator for DurationConstructor {
    type Output = Item;

    fn name(&self) -> &'static str {
        self.kind.type_name()
    }

    fn start(&mut self, context: &Arc<DynamicContext>) -> Result<()> {
        self.input = self.argument.materialize_at_most_one_item(context).map_err(|e| {
            if e.kind() == ErrorKind::Cardinality {
                Error::cardinality(format!("{}() expects at most one item as its argument", self.kind.type_name()))
            } else {
                e
            }
        })?;
        Ok(())
    }

    fn produce(&mut self) -> Result<Option<Item>> {
        match self.input.take() {
            Some(item) => self.convert(item).map(Some),
            None => Ok(None),
        }
    }

    fn stop(&mut self) {
        self.input = None;
    }

    fn dependencies(&self, out: &mut VariableSet) {
        self.argument.collect_dependencies(out);
    }
}

pub fn duration_constructor(argument: BoxedIterator, kind: DurationKind, metadata: Metadata) -> BoxedIterator {
    Box::new(OperatorIterator::new(DurationConstructor { argument, kind, input: None }, metadata))
}

fn streaming(kind: DurationKind) -> impl Fn(Vec<BoxedIterator>, Metadata) -> BoxedIterator + Send + Sync {
    move |args, metadata| match args.into_iter().next() {
        Some(argument) => duration_constructor(argument, kind, metadata),
        // arity is checked by the registry
        None => crate::runtime::iterators::empty_sequence(metadata),
    }
}

#[derive(Debug, Clone, Copy)]
enum Component {
    Years,
    Months,
    Days,
    Hours,
    Minutes,
    Seconds,
}

fn component(d: Duration, which: Component) -> Item {
    let nanos = delta_nanos(d.delta);
    let int = |v: i64| i32::try_from(v).map(Item::Int).unwrap_or_else(|_| Item::integer(v));
    match which {
        Component::Years => Item::Int(d.months / 12),
        Component::Months => Item::Int(d.months % 12),
        Component::Days => int(d.delta.num_days()),
        Component::Hours => Item::Int((d.delta.num_hours() % 24) as i32),
        Component::Minutes => Item::Int((d.delta.num_minutes() % 60) as i32),
        Component::Seconds => {
            let within_minute = nanos % 60_000_000_000;
            Item::Decimal(BigDecimal::new(BigInt::from(within_minute), 9).normalized())
        }
    }
}

fn extractor(
    name: &'static str,
    which: Component,
) -> impl Fn(&CallCtx<'_>, &[Sequence]) -> Result<Sequence> + Send + Sync + 'static {
    move |_call, args| {
        let Some(item) = optional_argument(args, 0, name)? else {
            return Ok(vec![]);
        };
        let d = item.duration_parts().ok_or_else(|| {
            Error::unexpected_type(format!(
                "{name}() expects a duration, found an item of type \"{}\"",
                item.type_name()
            ))
        })?;
        Ok(vec![component(d, which)])
    }
}

pub(super) fn register(reg: &mut FunctionRegistry) {
    reg.register_streaming("duration", 1, streaming(DurationKind::Duration));
    reg.register_streaming("yearMonthDuration", 1, streaming(DurationKind::YearMonth));
    reg.register_streaming("dayTimeDuration", 1, streaming(DurationKind::DayTime));

    for (name, which) in [
        ("years-from-duration", Component::Years),
        ("months-from-duration", Component::Months),
        ("days-from-duration", Component::Days),
        ("hours-from-duration", Component::Hours),
        ("minutes-from-duration", Component::Minutes),
        ("seconds-from-duration", Component::Seconds),
    ] {
        reg.register_fn(name, 1, extractor(name, which));
    }
}
