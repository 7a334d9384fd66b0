//! Atomic comparison for value comparisons, general comparisons, order-by
//! keys and group-by keys.

use core::cmp::Ordering;

use bigdecimal::BigDecimal;
use chrono::FixedOffset;
use num_traits::FromPrimitive;

use crate::item::Item;
use crate::item::temporal::{time_on_reference_date, to_instant};
use crate::runtime::dispatch::{date_instant, delta_nanos};
use crate::runtime::error::Error;
use crate::runtime::iterator::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOp {
    /// Keyword of the value comparison (`eq`, `lt`, ...).
    pub fn value_symbol(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "eq",
            ComparisonOp::Ne => "ne",
            ComparisonOp::Lt => "lt",
            ComparisonOp::Le => "le",
            ComparisonOp::Gt => "gt",
            ComparisonOp::Ge => "ge",
        }
    }

    /// Symbol of the general comparison (`=`, `<`, ...).
    pub fn general_symbol(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
        }
    }

    fn holds(self, ord: Ordering) -> bool {
        match self {
            ComparisonOp::Eq => ord == Ordering::Equal,
            ComparisonOp::Ne => ord != Ordering::Equal,
            ComparisonOp::Lt => ord == Ordering::Less,
            ComparisonOp::Le => ord != Ordering::Greater,
            ComparisonOp::Gt => ord == Ordering::Greater,
            ComparisonOp::Ge => ord != Ordering::Less,
        }
    }

    fn is_equality(self) -> bool {
        matches!(self, ComparisonOp::Eq | ComparisonOp::Ne)
    }
}

enum Comparison {
    Ordered(Ordering),
    /// At least one operand is NaN.
    Unordered,
    /// The type only supports `eq`/`ne`.
    EqualityOnly(bool),
}

// `None` when the two types cannot be compared at all.
fn classify(left: &Item, right: &Item, implicit_tz: FixedOffset) -> Option<Comparison> {
    use Comparison::*;
    if !left.is_atomic() || !right.is_atomic() {
        return None;
    }
    match (left, right) {
        (Item::Null, Item::Null) => return Some(Ordered(Ordering::Equal)),
        (Item::Null, _) => return Some(Ordered(Ordering::Less)),
        (_, Item::Null) => return Some(Ordered(Ordering::Greater)),
        _ => {}
    }
    if left.is_numeric() && right.is_numeric() {
        if let (Item::Int(l), Item::Int(r)) = (left, right) {
            return Some(Ordered(l.cmp(r)));
        }
        if left.is_decimal() && right.is_decimal() {
            return Some(Ordered(left.to_big_decimal()?.cmp(&right.to_big_decimal()?)));
        }
        let (l, r) = (left.cast_to_double()?, right.cast_to_double()?);
        return Some(l.partial_cmp(&r).map_or(Unordered, Ordered));
    }
    Some(match (left, right) {
        (Item::String(l), Item::String(r)) => Ordered(l.cmp(r)),
        (Item::Boolean(l), Item::Boolean(r)) => Ordered(l.cmp(r)),
        (Item::Date { date: l, tz: ltz }, Item::Date { date: r, tz: rtz }) => {
            Ordered(date_instant(*l, *ltz, implicit_tz).cmp(&date_instant(*r, *rtz, implicit_tz)))
        }
        (Item::Time { time: l, tz: ltz }, Item::Time { time: r, tz: rtz }) => Ordered(
            to_instant(time_on_reference_date(*l), *ltz, implicit_tz)
                .cmp(&to_instant(time_on_reference_date(*r), *rtz, implicit_tz)),
        ),
        (Item::DateTime { value: l, tz: ltz }, Item::DateTime { value: r, tz: rtz }) => {
            Ordered(to_instant(*l, *ltz, implicit_tz).cmp(&to_instant(*r, *rtz, implicit_tz)))
        }
        (Item::YearMonthDuration(l), Item::YearMonthDuration(r)) => Ordered(l.cmp(r)),
        (Item::DayTimeDuration(l), Item::DayTimeDuration(r)) => Ordered(delta_nanos(*l).cmp(&delta_nanos(*r))),
        (l, r) if l.is_duration() && r.is_duration() => {
            let (l, r) = (l.duration_parts()?, r.duration_parts()?);
            EqualityOnly(l == r)
        }
        _ => return None,
    })
}

/// Value comparison of two atomics.
pub fn compare_atomics(left: &Item, right: &Item, op: ComparisonOp, implicit_tz: FixedOffset) -> Result<bool> {
    match classify(left, right, implicit_tz) {
        Some(Comparison::Ordered(ord)) => Ok(op.holds(ord)),
        Some(Comparison::Unordered) => Ok(op == ComparisonOp::Ne),
        Some(Comparison::EqualityOnly(equal)) if op.is_equality() => Ok(equal == (op == ComparisonOp::Eq)),
        _ => Err(Error::binary_operation(op.value_symbol(), left.type_name(), right.type_name())),
    }
}

/// Existential comparison over two sequences. Empty on either side is false.
pub fn general_compare(lefts: &[Item], rights: &[Item], op: ComparisonOp, implicit_tz: FixedOffset) -> Result<bool> {
    for l in lefts {
        for r in rights {
            let hit = compare_atomics(l, r, op, implicit_tz)
                .map_err(|_| Error::binary_operation(op.general_symbol(), l.type_name(), r.type_name()))?;
            if hit {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

// Position of a number in the `order by` order: NaN first, then the extended
// reals compared exactly, whatever the numeric type.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum NumericKey {
    NaN,
    NegativeInfinity,
    Finite(BigDecimal),
    PositiveInfinity,
}

fn numeric_key(item: &Item) -> Option<NumericKey> {
    if item.is_decimal() {
        return item.to_big_decimal().map(NumericKey::Finite);
    }
    let value = item.cast_to_double()?;
    Some(match value {
        v if v.is_nan() => NumericKey::NaN,
        f64::INFINITY => NumericKey::PositiveInfinity,
        f64::NEG_INFINITY => NumericKey::NegativeInfinity,
        v => NumericKey::Finite(BigDecimal::from_f64(v)?),
    })
}

/// Total order used by `order by`. NaN sorts below every other number, and
/// numbers of different types compare by exact value.
pub fn order_keys(left: &Item, right: &Item, implicit_tz: FixedOffset) -> Result<Ordering> {
    if left.is_numeric() && right.is_numeric() {
        if let (Some(l), Some(r)) = (numeric_key(left), numeric_key(right)) {
            return Ok(l.cmp(&r));
        }
    }
    match classify(left, right, implicit_tz) {
        Some(Comparison::Ordered(ord)) => Ok(ord),
        Some(Comparison::Unordered) => {
            let l_nan = left.cast_to_double().is_some_and(f64::is_nan);
            let r_nan = right.cast_to_double().is_some_and(f64::is_nan);
            Ok(match (l_nan, r_nan) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                _ => Ordering::Greater,
            })
        }
        _ => Err(Error::unexpected_type(format!(
            "order by keys of type \"{}\" and \"{}\" are not comparable",
            left.type_name(),
            right.type_name()
        ))),
    }
}

/// Grouping-key equality. Incomparable types are simply different keys.
pub fn group_keys_equal(left: &Item, right: &Item, implicit_tz: FixedOffset) -> bool {
    match classify(left, right, implicit_tz) {
        Some(Comparison::Ordered(ord)) => ord == Ordering::Equal,
        Some(Comparison::EqualityOnly(equal)) => equal,
        // NaN groups with NaN
        Some(Comparison::Unordered) => {
            left.cast_to_double().is_some_and(f64::is_nan) && right.cast_to_double().is_some_and(f64::is_nan)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::error::ErrorKind;
    use bigdecimal::BigDecimal;
    use rstest::rstest;
    use std::str::FromStr;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[rstest]
    #[case(Item::Int(1), Item::Double(1.0), ComparisonOp::Eq, true)]
    #[case(Item::Int(1), Item::Decimal(BigDecimal::from_str("1.0").unwrap()), ComparisonOp::Eq, true)]
    #[case(Item::integer(10), Item::Int(9), ComparisonOp::Gt, true)]
    #[case(Item::string("a"), Item::string("b"), ComparisonOp::Lt, true)]
    #[case(Item::Null, Item::Null, ComparisonOp::Eq, true)]
    #[case(Item::Null, Item::Int(0), ComparisonOp::Lt, true)]
    #[case(Item::Boolean(false), Item::Boolean(true), ComparisonOp::Lt, true)]
    #[case(Item::Double(f64::NAN), Item::Double(f64::NAN), ComparisonOp::Eq, false)]
    #[case(Item::Double(f64::NAN), Item::Double(f64::NAN), ComparisonOp::Ne, true)]
    #[case(Item::YearMonthDuration(12), Item::YearMonthDuration(13), ComparisonOp::Le, true)]
    fn value_comparisons(#[case] l: Item, #[case] r: Item, #[case] op: ComparisonOp, #[case] expected: bool) {
        assert_eq!(compare_atomics(&l, &r, op, utc()).unwrap(), expected);
    }

    #[test]
    fn mismatched_types_name_both_types_and_the_operator() {
        let err = compare_atomics(&Item::string("1"), &Item::Int(1), ComparisonOp::Eq, utc()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
        assert!(err.message.contains("\"eq\""));
        assert!(err.message.contains("string") && err.message.contains("int"));
        assert!(compare_atomics(&Item::array(vec![]), &Item::Int(1), ComparisonOp::Eq, utc()).is_err());
    }

    #[test]
    fn general_comparison_is_existential() {
        let l = [Item::Int(1), Item::Int(5)];
        assert!(general_compare(&l, &[Item::Int(5)], ComparisonOp::Eq, utc()).unwrap());
        assert!(!general_compare(&l, &[], ComparisonOp::Eq, utc()).unwrap());
        assert!(general_compare(&l, &[Item::Int(3)], ComparisonOp::Ne, utc()).unwrap());
    }

    #[test]
    fn order_keys_compare_mixed_numbers_exactly() {
        let two_53 = 2_i64.pow(53);
        let integer = Item::integer(two_53 + 1);
        let double = Item::Double(2_f64.powi(53));
        let decimal = Item::Decimal(BigDecimal::from(two_53) + BigDecimal::from_str("0.5").unwrap());
        assert_eq!(order_keys(&double, &decimal, utc()).unwrap(), Ordering::Less);
        assert_eq!(order_keys(&decimal, &integer, utc()).unwrap(), Ordering::Less);
        assert_eq!(order_keys(&double, &integer, utc()).unwrap(), Ordering::Less);
        let nan = Item::Double(f64::NAN);
        assert_eq!(order_keys(&nan, &Item::Double(f64::NEG_INFINITY), utc()).unwrap(), Ordering::Less);
        let infinity = Item::Float(f32::INFINITY);
        assert_eq!(order_keys(&infinity, &Item::integer(two_53), utc()).unwrap(), Ordering::Greater);
        let half = Item::Decimal(BigDecimal::from_str("0.5").unwrap());
        assert_eq!(order_keys(&Item::Float(0.5), &half, utc()).unwrap(), Ordering::Equal);
    }

    #[test]
    fn group_keys() {
        assert!(group_keys_equal(&Item::Int(1), &Item::Double(1.0), utc()));
        assert!(!group_keys_equal(&Item::Int(1), &Item::string("1"), utc()));
        assert!(!group_keys_equal(&Item::Null, &Item::Int(0), utc()));
        assert!(group_keys_equal(&Item::Double(f64::NAN), &Item::Float(f32::NAN), utc()));
    }
}
