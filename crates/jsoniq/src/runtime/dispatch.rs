//! Ordered dispatch tables for arithmetic on two atomic operands.
//!
//! Each table is an explicit sequence of rules tried top to bottom; the first
//! rule whose operand types match decides the operation. `Ok(None)` means no
//! rule matched, which the calling operator reports as a type error naming
//! both dynamic types.

use bigdecimal::BigDecimal;
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use num_bigint::BigInt;
use num_traits::{FromPrimitive, Zero};

use crate::item::temporal::{shift_date_time, time_on_reference_date, to_instant};
use crate::item::{Duration, Item};
use crate::runtime::error::{Error, ErrorCode};
use crate::runtime::iterator::Result;

/// Operands strictly inside this bound take the machine-int fast path.
const INT_FAST_PATH_BOUND: i32 = i32::MAX / 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdditiveOp {
    Add,
    Subtract,
}

impl AdditiveOp {
    pub fn symbol(self) -> &'static str {
        match self {
            AdditiveOp::Add => "+",
            AdditiveOp::Subtract => "-",
        }
    }

    fn is_minus(self) -> bool {
        self == AdditiveOp::Subtract
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplicativeOp {
    Multiply,
    Divide,
    IntegerDivide,
    Modulo,
}

impl MultiplicativeOp {
    pub fn symbol(self) -> &'static str {
        match self {
            MultiplicativeOp::Multiply => "*",
            MultiplicativeOp::Divide => "div",
            MultiplicativeOp::IntegerDivide => "idiv",
            MultiplicativeOp::Modulo => "mod",
        }
    }
}

/// Both operands promoted to the first common rung of the numeric ladder.
enum NumericPair {
    Int(i32, i32),
    Double(f64, f64),
    Float(f32, f32),
    Integer(BigInt, BigInt),
    Decimal(BigDecimal, BigDecimal),
}

// int (guarded) -> double -> float -> integer -> decimal, first match wins.
fn numeric_pair(left: &Item, right: &Item, int_fast_path: impl Fn(i32, i32) -> bool) -> Option<NumericPair> {
    if let (Item::Int(l), Item::Int(r)) = (left, right)
        && int_fast_path(*l, *r)
    {
        return Some(NumericPair::Int(*l, *r));
    }
    if !left.is_numeric() || !right.is_numeric() {
        return None;
    }
    if left.is_double() || right.is_double() {
        return Some(NumericPair::Double(left.cast_to_double()?, right.cast_to_double()?));
    }
    if left.is_float() || right.is_float() {
        return Some(NumericPair::Float(left.cast_to_float()?, right.cast_to_float()?));
    }
    if left.is_integer() && right.is_integer() {
        return Some(NumericPair::Integer(left.to_big_integer()?, right.to_big_integer()?));
    }
    Some(NumericPair::Decimal(left.to_big_decimal()?, right.to_big_decimal()?))
}

fn in_fast_path_range(v: i32) -> bool {
    v < INT_FAST_PATH_BOUND && v > -INT_FAST_PATH_BOUND
}

fn temporal_overflow() -> Error {
    Error::from_code(ErrorCode::FODT0001, "overflow in date/time arithmetic")
}

fn division_by_zero() -> Error {
    Error::from_code(ErrorCode::FOAR0001, "division by zero")
}

fn numeric_overflow(what: &str) -> Error {
    Error::from_code(ErrorCode::FOAR0002, format!("numeric overflow: {what}"))
}

/// `left + right` / `left - right`.
pub fn additive(left: &Item, right: &Item, op: AdditiveOp, implicit_tz: FixedOffset) -> Result<Option<Item>> {
    let minus = op.is_minus();
    let fast = |l: i32, r: i32| in_fast_path_range(l) && in_fast_path_range(r);
    if let Some(pair) = numeric_pair(left, right, fast) {
        return Ok(Some(match pair {
            NumericPair::Int(l, r) => Item::Int(if minus { l - r } else { l + r }),
            NumericPair::Double(l, r) => Item::Double(if minus { l - r } else { l + r }),
            NumericPair::Float(l, r) => Item::Float(if minus { l - r } else { l + r }),
            NumericPair::Integer(l, r) => Item::Integer(if minus { l - r } else { l + r }),
            NumericPair::Decimal(l, r) => Item::Decimal(if minus { l - r } else { l + r }),
        }));
    }

    match (left, right) {
        (Item::YearMonthDuration(l), Item::YearMonthDuration(r)) => {
            let months = if minus { l.checked_sub(*r) } else { l.checked_add(*r) };
            return months.map(|m| Some(Item::YearMonthDuration(m))).ok_or_else(temporal_overflow);
        }
        (Item::DayTimeDuration(l), Item::DayTimeDuration(r)) => {
            let delta = if minus { l.checked_sub(r) } else { l.checked_add(r) };
            return delta.map(|d| Some(Item::DayTimeDuration(d))).ok_or_else(temporal_overflow);
        }
        _ => {}
    }

    // point (+|-) duration, and duration + point in add mode only
    let point_and_duration = match (left, right) {
        (p, d) if is_point(p) && is_offset_duration(d) => Some((p, d, minus)),
        (d, p) if is_point(p) && is_offset_duration(d) && !minus => Some((p, d, false)),
        _ => None,
    };
    if let Some((point, duration, subtract)) = point_and_duration
        && let Some(result) = shift_point(point, duration, subtract)?
    {
        return Ok(Some(result));
    }

    if minus {
        let difference = match (left, right) {
            (Item::Date { date: l, tz: ltz }, Item::Date { date: r, tz: rtz }) => Some((
                date_instant(*l, *ltz, implicit_tz),
                date_instant(*r, *rtz, implicit_tz),
            )),
            (Item::Time { time: l, tz: ltz }, Item::Time { time: r, tz: rtz }) => Some((
                to_instant(time_on_reference_date(*l), *ltz, implicit_tz),
                to_instant(time_on_reference_date(*r), *rtz, implicit_tz),
            )),
            (Item::DateTime { value: l, tz: ltz }, Item::DateTime { value: r, tz: rtz }) => {
                Some((to_instant(*l, *ltz, implicit_tz), to_instant(*r, *rtz, implicit_tz)))
            }
            _ => None,
        };
        if let Some((l, r)) = difference {
            return Ok(Some(Item::DayTimeDuration(l.signed_duration_since(r))));
        }
    }

    Ok(None)
}

fn is_point(item: &Item) -> bool {
    item.is_date() || item.is_time() || item.is_date_time()
}

fn is_offset_duration(item: &Item) -> bool {
    item.is_year_month_duration() || item.is_day_time_duration()
}

// Offset a date/time/dateTime by a yearMonth or dayTime duration, keeping the
// point's timezone. `time` only combines with dayTime durations.
fn shift_point(point: &Item, duration: &Item, subtract: bool) -> Result<Option<Item>> {
    let (months, delta) = match duration {
        Item::YearMonthDuration(m) => (*m, TimeDelta::zero()),
        Item::DayTimeDuration(d) => (0, *d),
        _ => return Ok(None),
    };
    let (months, delta) =
        if subtract { (months.checked_neg().ok_or_else(temporal_overflow)?, -delta) } else { (months, delta) };
    match point {
        Item::Date { date, tz } => {
            let shifted = shift_date_time(date.and_time(NaiveTime::MIN), months, delta).ok_or_else(temporal_overflow)?;
            Ok(Some(Item::Date { date: shifted.date(), tz: *tz }))
        }
        Item::Time { time, tz } => {
            if months != 0 || duration.is_year_month_duration() {
                return Ok(None);
            }
            let (shifted, _) = time.overflowing_add_signed(delta);
            Ok(Some(Item::Time { time: shifted, tz: *tz }))
        }
        Item::DateTime { value, tz } => {
            let shifted = shift_date_time(*value, months, delta).ok_or_else(temporal_overflow)?;
            Ok(Some(Item::DateTime { value: shifted, tz: *tz }))
        }
        _ => Ok(None),
    }
}

/// `*`, `div`, `idiv`, `mod`.
pub fn multiplicative(left: &Item, right: &Item, op: MultiplicativeOp) -> Result<Option<Item>> {
    use MultiplicativeOp::*;

    // `int div int` is a decimal division, so only the other three take the fast path.
    let fast = |_: i32, _: i32| op != Divide;
    if let Some(pair) = numeric_pair(left, right, fast) {
        return numeric_multiplicative(pair, op).map(Some);
    }

    match (left, right, op) {
        (Item::YearMonthDuration(m), n, Multiply) | (n, Item::YearMonthDuration(m), Multiply) if n.is_numeric() => {
            let factor = finite_factor(n)?;
            scale_months(*m, factor).map(|m| Some(Item::YearMonthDuration(m)))
        }
        (Item::DayTimeDuration(d), n, Multiply) | (n, Item::DayTimeDuration(d), Multiply) if n.is_numeric() => {
            let factor = finite_factor(n)?;
            scale_delta(*d, factor).map(|d| Some(Item::DayTimeDuration(d)))
        }
        (Item::YearMonthDuration(m), n, Divide) if n.is_numeric() => {
            let divisor = finite_factor(n)?;
            if divisor == 0.0 {
                return Err(temporal_overflow());
            }
            scale_months(*m, 1.0 / divisor).map(|m| Some(Item::YearMonthDuration(m)))
        }
        (Item::DayTimeDuration(d), n, Divide) if n.is_numeric() => {
            let divisor = finite_factor(n)?;
            if divisor == 0.0 {
                return Err(temporal_overflow());
            }
            scale_delta(*d, 1.0 / divisor).map(|d| Some(Item::DayTimeDuration(d)))
        }
        (Item::YearMonthDuration(l), Item::YearMonthDuration(r), Divide) => {
            if *r == 0 {
                return Err(division_by_zero());
            }
            Ok(Some(Item::Decimal(BigDecimal::from(*l) / BigDecimal::from(*r))))
        }
        (Item::DayTimeDuration(l), Item::DayTimeDuration(r), Divide) => {
            let (l, r) = (delta_nanos(*l), delta_nanos(*r));
            if r == 0 {
                return Err(division_by_zero());
            }
            Ok(Some(Item::Decimal(BigDecimal::from(BigInt::from(l)) / BigDecimal::from(BigInt::from(r)))))
        }
        _ => Ok(None),
    }
}

fn numeric_multiplicative(pair: NumericPair, op: MultiplicativeOp) -> Result<Item> {
    use MultiplicativeOp::*;
    match pair {
        NumericPair::Int(l, r) => match op {
            Multiply => {
                Ok(l.checked_mul(r).map_or_else(|| Item::Integer(BigInt::from(l) * BigInt::from(r)), Item::Int))
            }
            IntegerDivide => {
                if r == 0 {
                    return Err(division_by_zero());
                }
                Ok(l.checked_div(r).map_or_else(|| Item::Integer(BigInt::from(l) / BigInt::from(r)), Item::Int))
            }
            Modulo => {
                if r == 0 {
                    return Err(division_by_zero());
                }
                Ok(Item::Int(l.checked_rem(r).unwrap_or(0)))
            }
            Divide => decimal_multiplicative(BigDecimal::from(l), BigDecimal::from(r), op),
        },
        NumericPair::Double(l, r) => match op {
            Multiply => Ok(Item::Double(l * r)),
            Divide => Ok(Item::Double(l / r)),
            Modulo => Ok(Item::Double(l % r)),
            IntegerDivide => float_integer_divide(l, r),
        },
        NumericPair::Float(l, r) => match op {
            Multiply => Ok(Item::Float(l * r)),
            Divide => Ok(Item::Float(l / r)),
            Modulo => Ok(Item::Float(l % r)),
            IntegerDivide => float_integer_divide(f64::from(l), f64::from(r)),
        },
        NumericPair::Integer(l, r) => match op {
            Multiply => Ok(Item::Integer(l * r)),
            Divide => decimal_multiplicative(BigDecimal::from(l), BigDecimal::from(r), op),
            IntegerDivide => {
                if r.is_zero() {
                    return Err(division_by_zero());
                }
                Ok(Item::Integer(l / r))
            }
            Modulo => {
                if r.is_zero() {
                    return Err(division_by_zero());
                }
                Ok(Item::Integer(l % r))
            }
        },
        NumericPair::Decimal(l, r) => decimal_multiplicative(l, r, op),
    }
}

fn decimal_multiplicative(l: BigDecimal, r: BigDecimal, op: MultiplicativeOp) -> Result<Item> {
    use MultiplicativeOp::*;
    if op == Multiply {
        return Ok(Item::Decimal(l * r));
    }
    if r.is_zero() {
        return Err(division_by_zero());
    }
    match op {
        Divide => Ok(Item::Decimal(l / r)),
        IntegerDivide => Ok(Item::Integer(truncated_quotient(&l, &r))),
        Modulo => {
            let quotient = BigDecimal::from(truncated_quotient(&l, &r));
            Ok(Item::Decimal(&l - &r * quotient))
        }
        Multiply => Ok(Item::Decimal(l * r)),
    }
}

// Exact `l idiv r`: both operands are brought to a common scale and their
// unscaled digits divided, truncating toward zero.
fn truncated_quotient(l: &BigDecimal, r: &BigDecimal) -> BigInt {
    let scale = l.as_bigint_and_exponent().1.max(r.as_bigint_and_exponent().1);
    let (numerator, _) = l.with_scale(scale).into_bigint_and_exponent();
    let (denominator, _) = r.with_scale(scale).into_bigint_and_exponent();
    numerator / denominator
}

fn float_integer_divide(l: f64, r: f64) -> Result<Item> {
    if r == 0.0 {
        return Err(division_by_zero());
    }
    if l.is_nan() || r.is_nan() || l.is_infinite() {
        return Err(numeric_overflow("idiv operand is NaN or infinite"));
    }
    BigInt::from_f64((l / r).trunc())
        .map(Item::Integer)
        .ok_or_else(|| numeric_overflow("idiv quotient is not representable"))
}

fn finite_factor(n: &Item) -> Result<f64> {
    match n.cast_to_double() {
        Some(f) if f.is_finite() => Ok(f),
        Some(f) if f.is_nan() => Err(Error::from_code(ErrorCode::FOER0000, "cannot scale a duration by NaN")),
        _ => Err(temporal_overflow()),
    }
}

fn scale_months(months: i32, factor: f64) -> Result<i32> {
    let scaled = (f64::from(months) * factor).round();
    if scaled.is_finite() && scaled >= f64::from(i32::MIN) && scaled <= f64::from(i32::MAX) {
        Ok(scaled as i32)
    } else {
        Err(temporal_overflow())
    }
}

fn scale_delta(delta: TimeDelta, factor: f64) -> Result<TimeDelta> {
    let scaled = (delta_nanos(delta) as f64 * factor).round();
    if !scaled.is_finite() || scaled.abs() >= i64::MAX as f64 {
        return Err(temporal_overflow());
    }
    Ok(TimeDelta::nanoseconds(scaled as i64))
}

/// Total nanoseconds of a delta.
pub(crate) fn delta_nanos(delta: TimeDelta) -> i128 {
    i128::from(delta.num_seconds()) * 1_000_000_000 + i128::from(delta.subsec_nanos())
}

/// Unary `+` / `-` on a numeric or duration item.
pub fn unary(item: &Item, negate: bool) -> Result<Item> {
    let symbol = if negate { "-" } else { "+" };
    let unsupported = || {
        Error::unexpected_type(format!(
            "\"{symbol}\": operation not possible with parameter of type \"{}\"",
            item.type_name()
        ))
    };
    if !(item.is_numeric() || item.is_duration()) {
        return Err(unsupported());
    }
    if !negate {
        return Ok(item.clone());
    }
    Ok(match item {
        Item::Int(i) => i.checked_neg().map_or_else(|| Item::Integer(-BigInt::from(*i)), Item::Int),
        Item::Integer(i) => Item::Integer(-i),
        Item::Decimal(d) => Item::Decimal(-d.clone()),
        Item::Double(d) => Item::Double(-d),
        Item::Float(f) => Item::Float(-f),
        Item::YearMonthDuration(m) => Item::YearMonthDuration(m.checked_neg().ok_or_else(temporal_overflow)?),
        Item::DayTimeDuration(d) => Item::DayTimeDuration(-*d),
        Item::Duration(d) => {
            Item::Duration(Duration::new(d.months.checked_neg().ok_or_else(temporal_overflow)?, -d.delta))
        }
        _ => return Err(unsupported()),
    })
}

/// Midnight of `date` in its own zone, as a UTC instant.
pub(crate) fn date_instant(date: NaiveDate, tz: Option<FixedOffset>, implicit_tz: FixedOffset) -> NaiveDateTime {
    to_instant(date.and_time(NaiveTime::MIN), tz, implicit_tz)
}
