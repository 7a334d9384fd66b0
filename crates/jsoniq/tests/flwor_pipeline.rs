use bigdecimal::BigDecimal;
use jsoniq_runtime::runtime::flwor::{
    GroupSpec, OrderSpec, count_clause, flwor, for_clause, group_by_clause, let_clause, order_by_clause, where_clause,
};
use jsoniq_runtime::runtime::iterators::{
    array_unboxing, comma, constant, general_comparison, object_constructor, object_lookup, range, sequence, variable,
};
use jsoniq_runtime::runtime::{ComparisonOp, Metadata};
use jsoniq_runtime::{DynamicContext, ErrorCode, Item, default_function_registry, evaluate};
use rstest::rstest;
use serde_json::json;

fn md() -> Metadata {
    Metadata::default()
}

fn key(name: &str) -> jsoniq_runtime::BoxedIterator {
    constant(Item::string(name), md())
}

fn field(var: &str, name: &str) -> jsoniq_runtime::BoxedIterator {
    object_lookup(variable(var, md()), key(name), md())
}

fn orders() -> Vec<Item> {
    [
        json!({"customer": "bo", "total": 30, "items": ["pen", "ink"]}),
        json!({"customer": "al", "total": 5, "items": ["pad"]}),
        json!({"customer": "bo", "total": 12, "items": []}),
        json!({"customer": "cy", "total": 30, "items": ["pen"]}),
        json!({"customer": "al", "total": 40}),
    ]
    .iter()
    .map(Item::from_json)
    .collect()
}

#[test]
fn group_order_and_construct() {
    // for $o in $orders
    // where $o.total >= 10
    // group by $c := $o.customer
    // let $n := count($o)
    // order by $n descending, $c
    // count $rank
    // return { "rank": $rank, "customer": $c, "orders": $n }
    let ctx = DynamicContext::builder().with_variable("orders", orders()).build();
    let clauses = for_clause(None, "o", None, false, variable("orders", md()), md());
    let clauses = where_clause(
        clauses,
        general_comparison(field("o", "total"), constant(Item::Int(10), md()), ComparisonOp::Ge, md()),
        md(),
    );
    let clauses = group_by_clause(clauses, vec![GroupSpec::bind("c", field("o", "customer"))], md());
    let count = default_function_registry().build_call("count", vec![variable("o", md())], md()).unwrap();
    let clauses = let_clause(Some(clauses), "n", count, md());
    let clauses = order_by_clause(
        clauses,
        vec![OrderSpec::descending(variable("n", md())), OrderSpec::ascending(variable("c", md()))],
        md(),
    );
    let clauses = count_clause(clauses, "rank", md());
    let body = object_constructor(
        vec![
            (key("rank"), variable("rank", md())),
            (key("customer"), variable("c", md())),
            (key("orders"), variable("n", md())),
        ],
        md(),
    );
    let mut query = flwor(clauses, body, md());

    let out = evaluate(&mut query, &ctx).unwrap();
    let expected: Vec<Item> = [
        json!({"rank": 1, "customer": "bo", "orders": 2}),
        json!({"rank": 2, "customer": "al", "orders": 1}),
        json!({"rank": 3, "customer": "cy", "orders": 1}),
    ]
    .iter()
    .map(Item::from_json)
    .collect();
    assert_eq!(out, expected);
}

#[test]
fn nested_for_with_positions() {
    // for $o at $i in $orders, $item in $o.items[] return { "order": $i, "item": $item }
    let ctx = DynamicContext::builder().with_variable("orders", orders()).build();
    let outer = for_clause(None, "o", Some("i".into()), false, variable("orders", md()), md());
    let inner = for_clause(Some(outer), "item", None, false, array_unboxing(field("o", "items"), md()), md());
    let body = object_constructor(
        vec![(key("order"), variable("i", md())), (key("item"), variable("item", md()))],
        md(),
    );
    let out = evaluate(&mut flwor(inner, body, md()), &ctx).unwrap();
    let pairs: Vec<(String, String)> = out
        .iter()
        .map(|o| (o.get("order").unwrap().to_string(), o.get("item").unwrap().to_string()))
        .collect();
    let expected = [("1", "pen"), ("1", "ink"), ("2", "pad"), ("4", "pen")];
    assert_eq!(pairs, expected.map(|(a, b)| (a.to_string(), b.to_string())));
}

#[test]
fn allowing_empty_keeps_the_outer_tuple() {
    // for $x allowing empty at $i in () return ($i, $x)
    let clause = for_clause(None, "x", Some("i".into()), true, sequence(vec![], md()), md());
    let body = comma(vec![variable("i", md()), variable("x", md())], md());
    assert_eq!(evaluate(&mut flwor(clause, body, md()), &DynamicContext::empty()).unwrap(), vec![Item::Int(0)]);
}

#[test]
fn group_by_concatenates_the_other_variables() {
    // for $x in 1 to 6 let $parity := $x mod 2 group by $parity return [ $x ]
    use jsoniq_runtime::runtime::MultiplicativeOp;
    use jsoniq_runtime::runtime::iterators::{array_constructor, multiplicative};
    let upto = range(constant(Item::Int(1), md()), constant(Item::Int(6), md()), md());
    let clauses = for_clause(None, "x", None, false, upto, md());
    let parity = multiplicative(variable("x", md()), constant(Item::Int(2), md()), MultiplicativeOp::Modulo, md());
    let clauses = let_clause(Some(clauses), "parity", parity, md());
    let clauses = group_by_clause(clauses, vec![GroupSpec::variable("parity")], md());
    let body = array_constructor(Some(variable("x", md())), md());
    let out = evaluate(&mut flwor(clauses, body, md()), &DynamicContext::empty()).unwrap();
    assert_eq!(out, vec![Item::from_json(&json!([1, 3, 5])), Item::from_json(&json!([2, 4, 6]))]);
}

#[test]
fn order_by_rejects_plural_keys() {
    let clauses = for_clause(None, "o", None, false, sequence(orders(), md()), md());
    let clauses = order_by_clause(clauses, vec![OrderSpec::ascending(array_unboxing(field("o", "items"), md()))], md());
    let err = evaluate(&mut flwor(clauses, variable("o", md()), md()), &DynamicContext::empty()).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0004);
}

fn numeric_key(i: i32) -> Item {
    match i % 5 {
        0 => Item::Int(i),
        1 => Item::integer(i),
        2 => Item::Decimal(BigDecimal::from(i) / BigDecimal::from(4)),
        3 => Item::Double(f64::from(i) - 0.25),
        _ => Item::Float(i as f32),
    }
}

#[test]
fn order_by_mixed_numeric_keys_over_many_rows() {
    let two_53 = 2_i64.pow(53);
    let mut keys: Vec<Item> = (0..60).rev().map(numeric_key).collect();
    keys.push(Item::integer(two_53 + 1));
    keys.push(Item::Double(f64::NAN));
    keys.push(Item::Decimal(BigDecimal::from(two_53) + BigDecimal::from(1) / BigDecimal::from(2)));
    keys.push(Item::Double(f64::NEG_INFINITY));
    keys.push(Item::Double(2_f64.powi(53)));
    let clauses = for_clause(None, "k", None, false, sequence(keys.clone(), md()), md());
    let clauses = order_by_clause(clauses, vec![OrderSpec::ascending(variable("k", md()))], md());
    let out = evaluate(&mut flwor(clauses, variable("k", md()), md()), &DynamicContext::empty()).unwrap();

    assert_eq!(out.len(), keys.len());
    assert!(out[0].cast_to_double().unwrap().is_nan());
    assert_eq!(out[1], Item::Double(f64::NEG_INFINITY));
    let values: Vec<f64> = out[1..].iter().map(|k| k.cast_to_double().unwrap()).collect();
    assert!(values.windows(2).all(|w| w[0] <= w[1]), "{values:?}");
    let tail: Vec<&str> = out[out.len() - 3..].iter().map(Item::type_name).collect();
    assert_eq!(tail, ["double", "decimal", "integer"]);
}

#[rstest]
#[case((0..500).map(|i| if i % 2 == 0 { Item::Int(i) } else { Item::string(i.to_string()) }).collect())]
#[case((0..30).map(Item::Int).chain([Item::Boolean(true)]).collect())]
#[case(vec![Item::Null, Item::string("a"), Item::Null, Item::Int(1)])]
fn order_by_rejects_incomparable_key_columns(#[case] keys: Vec<Item>) {
    let clauses = for_clause(None, "k", None, false, sequence(keys, md()), md());
    let clauses = order_by_clause(clauses, vec![OrderSpec::descending(variable("k", md()))], md());
    let err = evaluate(&mut flwor(clauses, variable("k", md()), md()), &DynamicContext::empty()).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0004);
    assert!(err.message.contains("not comparable"), "{}", err.message);
}

#[test]
fn order_by_empty_greatest() {
    // for $o in $orders order by $o.items[[1]] empty greatest return $o.total
    use jsoniq_runtime::runtime::iterators::array_lookup;
    let clauses = for_clause(None, "o", None, false, sequence(orders(), md()), md());
    let first_item = array_lookup(field("o", "items"), constant(Item::Int(1), md()), md());
    let clauses = order_by_clause(clauses, vec![OrderSpec::ascending(first_item).empty_greatest()], md());
    let out = evaluate(&mut flwor(clauses, field("o", "total"), md()), &DynamicContext::empty()).unwrap();
    // first members: pen, pad, (), pen, ()
    assert_eq!(out, vec![Item::Int(5), Item::Int(30), Item::Int(30), Item::Int(12), Item::Int(40)]);
}

#[test]
fn flwor_dependencies_exclude_bound_variables() {
    let clauses = for_clause(None, "o", None, false, variable("orders", md()), md());
    let clauses = let_clause(Some(clauses), "t", field("o", "total"), md());
    let query = flwor(clauses, comma(vec![variable("t", md()), variable("limit", md())], md()), md());
    let deps: Vec<String> = query.variable_dependencies().iter().map(ToString::to_string).collect();
    assert_eq!(deps, ["orders", "limit"]);
}
