use super::{CallCtx, FunctionRegistry, optional_argument};
use crate::item::{Item, Sequence, effective_boolean_value};
use crate::runtime::error::{Error, ErrorCode};
use crate::runtime::iterator::Result;

fn count_item(n: usize) -> Item {
    i32::try_from(n).map(Item::Int).unwrap_or_else(|_| Item::integer(n))
}

fn string_fn(call: &CallCtx<'_>, args: &[Sequence]) -> Result<Sequence> {
    let item = match args.len() {
        0 => Some(
            call.context
                .context_item()
                .ok_or_else(|| {
                    Error::from_code(ErrorCode::XPDY0002, "string() without argument needs a context item")
                })?,
        ),
        _ => optional_argument(args, 0, "string")?,
    };
    let value = match item {
        Some(item) => item.string_value()?,
        None => String::new(),
    };
    Ok(vec![Item::string(value)])
}

pub(super) fn register(reg: &mut FunctionRegistry) {
    reg.register_fn("count", 1, |_call, args| Ok(vec![count_item(args[0].len())]));
    reg.register_fn("exists", 1, |_call, args| Ok(vec![Item::Boolean(!args[0].is_empty())]));
    reg.register_fn("empty", 1, |_call, args| Ok(vec![Item::Boolean(args[0].is_empty())]));

    reg.register_fn("zero-or-one", 1, |_call, args| {
        if args[0].len() > 1 {
            return Err(Error::from_code(
                ErrorCode::FORG0003,
                format!("zero-or-one() called with a sequence of {} items", args[0].len()),
            ));
        }
        Ok(args[0].clone())
    });
    reg.register_fn("exactly-one", 1, |_call, args| {
        if args[0].len() != 1 {
            return Err(Error::from_code(
                ErrorCode::FORG0005,
                format!("exactly-one() called with a sequence of {} items", args[0].len()),
            ));
        }
        Ok(args[0].clone())
    });

    reg.register_fn("head", 1, |_call, args| Ok(args[0].first().cloned().into_iter().collect()));
    reg.register_fn("tail", 1, |_call, args| Ok(args[0].iter().skip(1).cloned().collect()));

    reg.register_fn("boolean", 1, |_call, args| Ok(vec![Item::Boolean(effective_boolean_value(&args[0])?)]));
    reg.register_fn("not", 1, |_call, args| Ok(vec![Item::Boolean(!effective_boolean_value(&args[0])?)]));

    reg.register_fn_range("string", 0, Some(1), string_fn);
}
