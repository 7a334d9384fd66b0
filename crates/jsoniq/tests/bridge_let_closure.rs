use chrono::{NaiveDate, TimeDelta};
use jsoniq_runtime::runtime::iterators::{additive, constant, object_lookup, variable};
use jsoniq_runtime::runtime::{AdditiveOp, Metadata};
use jsoniq_runtime::{DynamicContext, ErrorCode, Item, ItemCodec, LetClosure, ObjectProjection, TaggedJsonCodec};
use serde_json::json;

fn md() -> Metadata {
    Metadata::default()
}

fn encode(items: &[Item]) -> Vec<u8> {
    TaggedJsonCodec::new().encode(items).unwrap()
}

fn decode(bytes: &[u8]) -> Vec<Item> {
    TaggedJsonCodec::new().decode(bytes).unwrap()
}

fn assert_send<T: Send>(_: &T) {}

#[test]
fn shifts_a_date_column_by_a_duration_column() {
    // let $due := $start + $grace
    let expression = additive(variable("start", md()), variable("grace", md()), AdditiveOp::Add, md());
    let mut closure =
        LetClosure::new(expression, ["id", "start", "grace"], TaggedJsonCodec::new(), DynamicContext::empty());
    assert_send(&closure);
    let deps: Vec<String> = closure.dependencies().iter().map(ToString::to_string).collect();
    assert_eq!(deps, ["start", "grace"]);

    let start = Item::date(NaiveDate::from_ymd_opt(2024, 1, 30).unwrap(), None);
    let grace = Item::day_time_duration(TimeDelta::days(3));
    let row = vec![encode(&[Item::string("row-1")]), encode(&[start]), encode(&[grace])];
    let out = decode(&closure.call(&row).unwrap());
    assert_eq!(out, vec![Item::date(NaiveDate::from_ymd_opt(2024, 2, 2).unwrap(), None)]);
}

#[test]
fn empty_columns_propagate_as_empty_results() {
    let expression = additive(variable("a", md()), constant(Item::Int(1), md()), AdditiveOp::Add, md());
    let mut closure = LetClosure::new(expression, ["a"], TaggedJsonCodec::new(), DynamicContext::empty());
    let out = closure.call(&[encode(&[])]).unwrap();
    assert!(decode(&out).is_empty());
}

#[test]
fn evaluation_errors_come_back_as_runtime_errors() {
    let expression = additive(variable("a", md()), variable("b", md()), AdditiveOp::Add, md());
    let mut closure = LetClosure::new(expression, ["a", "b"], TaggedJsonCodec::new(), DynamicContext::empty());
    let err = closure.call(&[encode(&[Item::Null]), encode(&[Item::Int(1)])]).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0004);

    let err = closure.call(&[b"{".to_vec(), encode(&[Item::Int(1)])]).unwrap_err();
    assert_eq!(err.code, ErrorCode::FOER0000);
}

#[test]
fn closure_survives_rehydration() {
    let expression = object_lookup(variable("doc", md()), constant(Item::string("name"), md()), md());
    let mut closure = LetClosure::new(expression, ["doc"], TaggedJsonCodec::new(), DynamicContext::empty());
    let row = vec![encode(&[Item::from_json(&json!({"name": "x", "n": 1}))])];
    let before = closure.call(&row).unwrap();
    closure.rehydrate();
    assert_eq!(closure.call(&row).unwrap(), before);
    assert_eq!(decode(&before), vec![Item::string("x")]);
}

#[test]
fn decoded_objects_keep_key_order() {
    let rows = vec![Item::from_json(&json!({"zone": "eu", "id": 4, "kind": "pen"}))];
    let decoded = decode(&encode(&rows));
    assert_eq!(decoded[0].keys().collect::<Vec<_>>(), ["zone", "id", "kind"]);
    let projected = ObjectProjection::new(["kind", "zone"]).apply(decoded[0].clone());
    assert_eq!(projected.keys().collect::<Vec<_>>(), ["zone", "kind"]);
}

#[test]
fn projection_closure_over_decoded_rows() {
    let projection = ObjectProjection::new(["id"]);
    let rows = vec![Item::from_json(&json!({"id": 1, "blob": "..."})), Item::Int(7)];
    let decoded = decode(&encode(&rows));
    let projected: Vec<Item> = decoded.into_iter().map(|item| projection.apply(item)).collect();
    assert_eq!(projected, vec![Item::from_json(&json!({"id": 1})), Item::Int(7)]);
}
