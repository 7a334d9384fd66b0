use bigdecimal::BigDecimal;
use jsoniq_runtime::runtime::iterators::{additive, constant, empty_sequence, multiplicative, sequence, unary};
use jsoniq_runtime::runtime::{AdditiveOp, BoxedIterator, Metadata, MultiplicativeOp};
use jsoniq_runtime::{DynamicContext, ErrorCode, ErrorKind, Item, evaluate};
use num_bigint::BigInt;
use proptest::prelude::*;
use rstest::rstest;
use std::str::FromStr;

fn md() -> Metadata {
    Metadata::default()
}

fn lit(item: Item) -> BoxedIterator {
    constant(item, md())
}

fn add(l: Item, r: Item, op: AdditiveOp) -> jsoniq_runtime::runtime::Result<Vec<Item>> {
    evaluate(&mut additive(lit(l), lit(r), op, md()), &DynamicContext::empty())
}

fn dec(s: &str) -> Item {
    Item::Decimal(BigDecimal::from_str(s).unwrap())
}

#[rstest]
#[case(AdditiveOp::Add, true)]
#[case(AdditiveOp::Add, false)]
#[case(AdditiveOp::Subtract, true)]
#[case(AdditiveOp::Subtract, false)]
fn empty_operand_absorbs(#[case] op: AdditiveOp, #[case] empty_left: bool) {
    let present = lit(Item::string("not even a number"));
    let (l, r) = if empty_left { (empty_sequence(md()), present) } else { (present, empty_sequence(md())) };
    let out = evaluate(&mut additive(l, r, op, md()), &DynamicContext::empty()).unwrap();
    assert!(out.is_empty());
}

#[rstest]
#[case(Item::Int(2), Item::Double(0.5), Item::Double(2.5))]
#[case(Item::Float(1.5), Item::Double(1.0), Item::Double(2.5))]
#[case(Item::Int(1), Item::Float(0.5), Item::Float(1.5))]
#[case(dec("1.25"), Item::Float(1.0), Item::Float(2.25))]
#[case(Item::Int(1), dec("0.5"), dec("1.5"))]
#[case(Item::integer(BigInt::from(i64::MAX)), Item::Int(1), Item::integer(BigInt::from(i64::MAX) + 1))]
fn ladder_picks_the_first_common_type(#[case] l: Item, #[case] r: Item, #[case] expected: Item) {
    assert_eq!(add(l, r, AdditiveOp::Add).unwrap(), vec![expected]);
}

#[test]
fn int_outside_fast_path_widens_instead_of_overflowing() {
    let out = add(Item::Int(i32::MAX), Item::Int(i32::MAX), AdditiveOp::Add).unwrap();
    assert_eq!(out, vec![Item::integer(BigInt::from(i32::MAX) * 2)]);
    let out = add(Item::Int(i32::MIN), Item::Int(1), AdditiveOp::Subtract).unwrap();
    assert_eq!(out, vec![Item::integer(BigInt::from(i32::MIN) - 1)]);
}

#[test]
fn plural_operand_names_the_side() {
    let err = evaluate(
        &mut additive(sequence(vec![Item::Int(1), Item::Int(2)], md()), lit(Item::Int(3)), AdditiveOp::Add, md()),
        &DynamicContext::empty(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cardinality);
    assert!(err.message.contains("left"), "{}", err.message);
}

#[test]
fn mismatched_types_are_a_type_error_naming_both() {
    let err = add(Item::string("a"), Item::Int(1), AdditiveOp::Add).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0004);
    assert!(err.message.contains("\"string\"") && err.message.contains("\"int\""), "{}", err.message);
    assert!(err.message.contains('+'));
}

#[rstest]
#[case(Item::Int(7), Item::Int(2), MultiplicativeOp::IntegerDivide, Item::Int(3))]
#[case(Item::Int(7), Item::Int(2), MultiplicativeOp::Modulo, Item::Int(1))]
#[case(Item::Int(6), Item::Int(7), MultiplicativeOp::Multiply, Item::Int(42))]
#[case(Item::Int(7), Item::Int(2), MultiplicativeOp::Divide, dec("3.5"))]
#[case(Item::Double(1.0), Item::Int(4), MultiplicativeOp::Divide, Item::Double(0.25))]
fn multiplicative_ladder(#[case] l: Item, #[case] r: Item, #[case] op: MultiplicativeOp, #[case] expected: Item) {
    let out = evaluate(&mut multiplicative(lit(l), lit(r), op, md()), &DynamicContext::empty()).unwrap();
    assert_eq!(out, vec![expected]);
}

#[rstest]
#[case(MultiplicativeOp::Divide)]
#[case(MultiplicativeOp::IntegerDivide)]
#[case(MultiplicativeOp::Modulo)]
fn exact_division_by_zero(#[case] op: MultiplicativeOp) {
    let err =
        evaluate(&mut multiplicative(lit(Item::Int(1)), lit(Item::Int(0)), op, md()), &DynamicContext::empty())
            .unwrap_err();
    assert_eq!(err.code, ErrorCode::FOAR0001);
}

#[test]
fn unary_minus_keeps_the_type() {
    let out = evaluate(&mut unary(lit(Item::Int(5)), true, md()), &DynamicContext::empty()).unwrap();
    assert_eq!(out, vec![Item::Int(-5)]);
    let out = evaluate(&mut unary(lit(Item::year_month_duration(14)), true, md()), &DynamicContext::empty()).unwrap();
    assert_eq!(out, vec![Item::year_month_duration(-14)]);
}

const SAFE: i32 = i32::MAX / 2;

proptest! {
    #[test]
    fn safe_range_int_arithmetic_stays_int(a in -SAFE + 1..SAFE, b in -SAFE + 1..SAFE, minus in any::<bool>()) {
        let op = if minus { AdditiveOp::Subtract } else { AdditiveOp::Add };
        let expected = if minus { i64::from(a) - i64::from(b) } else { i64::from(a) + i64::from(b) };
        let out = add(Item::Int(a), Item::Int(b), op).unwrap();
        prop_assert_eq!(out.len(), 1);
        prop_assert!(out[0].is_int());
        prop_assert_eq!(out[0].to_big_integer(), Some(BigInt::from(expected)));
    }

    #[test]
    fn any_double_operand_yields_double(a in any::<i32>(), d in -1.0e9f64..1.0e9, left in any::<bool>()) {
        let (l, r) = if left { (Item::Double(d), Item::Int(a)) } else { (Item::Int(a), Item::Double(d)) };
        let out = add(l, r, AdditiveOp::Add).unwrap();
        prop_assert_eq!(out.len(), 1);
        prop_assert!(out[0].is_double());
    }

    #[test]
    fn big_integers_are_exact(a in any::<i64>(), b in any::<i64>()) {
        let out = add(Item::integer(a), Item::integer(b), AdditiveOp::Subtract).unwrap();
        prop_assert_eq!(out, vec![Item::integer(BigInt::from(a) - BigInt::from(b))]);
    }
}
