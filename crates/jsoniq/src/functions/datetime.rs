use super::{CallCtx, FunctionRegistry, optional_argument};
use crate::item::temporal::{parse_date, parse_date_time, parse_time};
use crate::item::{Item, Sequence};
use crate::runtime::error::Error;
use crate::runtime::iterator::Result;

fn not_castable(item: &Item, target: &str) -> Error {
    Error::unexpected_type(format!("{target}() cannot convert an item of type \"{}\"", item.type_name()))
}

fn date_fn(_call: &CallCtx<'_>, args: &[Sequence]) -> Result<Sequence> {
    let Some(item) = optional_argument(args, 0, "date")? else {
        return Ok(vec![]);
    };
    let value = match item {
        Item::String(s) => {
            let (date, tz) = parse_date(s).map_err(|_| Error::cast(s, "string", "date"))?;
            Item::date(date, tz)
        }
        Item::Date { .. } => item.clone(),
        Item::DateTime { value, tz } => Item::date(value.date(), *tz),
        other => return Err(not_castable(other, "date")),
    };
    Ok(vec![value])
}

fn time_fn(_call: &CallCtx<'_>, args: &[Sequence]) -> Result<Sequence> {
    let Some(item) = optional_argument(args, 0, "time")? else {
        return Ok(vec![]);
    };
    let value = match item {
        Item::String(s) => {
            let (time, tz) = parse_time(s).map_err(|_| Error::cast(s, "string", "time"))?;
            Item::time(time, tz)
        }
        Item::Time { .. } => item.clone(),
        Item::DateTime { value, tz } => Item::time(value.time(), *tz),
        other => return Err(not_castable(other, "time")),
    };
    Ok(vec![value])
}

fn date_time_fn(_call: &CallCtx<'_>, args: &[Sequence]) -> Result<Sequence> {
    let Some(item) = optional_argument(args, 0, "dateTime")? else {
        return Ok(vec![]);
    };
    let value = match item {
        Item::String(s) => {
            let (value, tz) = parse_date_time(s).map_err(|_| Error::cast(s, "string", "dateTime"))?;
            Item::date_time(value, tz)
        }
        Item::DateTime { .. } => item.clone(),
        Item::Date { date, tz } => Item::date_time(date.and_time(chrono::NaiveTime::MIN), *tz),
        other => return Err(not_castable(other, "dateTime")),
    };
    Ok(vec![value])
}

pub(super) fn register(reg: &mut FunctionRegistry) {
    reg.register_fn("date", 1, date_fn);
    reg.register_fn("time", 1, time_fn);
    reg.register_fn("dateTime", 1, date_time_fn);

    // The instant is fixed per context chain, so repeated calls agree.
    reg.register_fn("current-dateTime", 0, |call, _args| {
        let now = call.context.now();
        Ok(vec![Item::date_time(now.naive_local(), Some(*now.offset()))])
    });
    reg.register_fn("current-date", 0, |call, _args| {
        let now = call.context.now();
        Ok(vec![Item::date(now.date_naive(), Some(*now.offset()))])
    });
    reg.register_fn("current-time", 0, |call, _args| {
        let now = call.context.now();
        Ok(vec![Item::time(now.time(), Some(*now.offset()))])
    });
}

#[cfg(test)]
mod tests {
    use crate::functions::default_function_registry;
    use crate::item::Item;
    use crate::runtime::error::ErrorCode;
    use crate::runtime::iterators::constant;
    use crate::runtime::{DynamicContext, Metadata, Result, RuntimeIterator};
    use chrono::{FixedOffset, NaiveDate, TimeZone};
    use rstest::rstest;
    use std::sync::Arc;

    fn call(name: &str, args: Vec<Item>, ctx: &Arc<DynamicContext>) -> Result<Vec<Item>> {
        let args = args.into_iter().map(|a| constant(a, Metadata::default())).collect();
        let mut it = default_function_registry().build_call(name, args, Metadata::default())?;
        it.materialize(ctx)
    }

    #[rstest]
    #[case("date", "2024-02-29", "2024-02-29")]
    #[case("date", "2024-02-29+01:00", "2024-02-29+01:00")]
    #[case("time", "13:20:00Z", "13:20:00Z")]
    #[case("dateTime", "2024-02-29T13:20:00-05:00", "2024-02-29T13:20:00-05:00")]
    fn constructors_round_trip(#[case] name: &str, #[case] literal: &str, #[case] rendered: &str) {
        let out = call(name, vec![Item::string(literal)], &DynamicContext::empty()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to_string(), rendered);
    }

    #[test]
    fn bad_literals_are_cast_errors() {
        let err = call("date", vec![Item::string("2024-13-01")], &DynamicContext::empty()).unwrap_err();
        assert_eq!(err.code, ErrorCode::FORG0001);
    }

    #[test]
    fn current_functions_use_the_fixed_instant() {
        let tz = FixedOffset::east_opt(3600).unwrap();
        let now = tz.with_ymd_and_hms(2020, 5, 17, 8, 30, 0).unwrap();
        let ctx = DynamicContext::builder().with_now(now).build();
        let date = call("current-date", vec![], &ctx).unwrap();
        assert_eq!(date, vec![Item::date(NaiveDate::from_ymd_opt(2020, 5, 17).unwrap(), Some(tz))]);
        let first = call("current-dateTime", vec![], &ctx).unwrap();
        assert_eq!(first, call("current-dateTime", vec![], &ctx).unwrap());
        assert_eq!(call("current-time", vec![], &ctx).unwrap()[0].to_string(), "08:30:00+01:00");
    }
}
