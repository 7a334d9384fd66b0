use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use serde_json::{Map, Value, json};

use super::ItemCodec;
use crate::item::duration::{Duration, DurationKind};
use crate::item::temporal::{format_date, format_date_time, format_time, parse_date, parse_date_time, parse_time};
use crate::item::{Item, ObjectMap, Sequence};
use crate::runtime::error::{Error, ErrorCode};
use crate::runtime::iterator::Result;

/// Encodes a sequence as a JSON array of `{"type": ..., "value": ...}`
/// records, so the exact dynamic type survives the round trip.
///
/// Numbers that JSON cannot carry exactly (big integers, decimals, non-finite
/// floats) and all temporal values travel as their lexical form.
#[derive(Debug, Default)]
pub struct TaggedJsonCodec {
    scratch: Vec<u8>,
    ready: bool,
}

impl TaggedJsonCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_ready(&mut self) {
        if !self.ready {
            self.scratch = Vec::with_capacity(128);
            self.ready = true;
        }
    }
}

fn corrupt(msg: impl Into<String>) -> Error {
    Error::from_code(ErrorCode::FOER0000, format!("malformed encoded item: {}", msg.into()))
}

fn float_value(d: f64) -> Value {
    if d.is_finite() {
        json!(d)
    } else if d.is_nan() {
        json!("NaN")
    } else if d > 0.0 {
        json!("INF")
    } else {
        json!("-INF")
    }
}

fn tag(item: &Item) -> Value {
    let value = match item {
        Item::Null => Value::Null,
        Item::Boolean(b) => json!(b),
        Item::String(s) => json!(s),
        Item::Int(i) => json!(i),
        Item::Integer(i) => json!(i.to_string()),
        Item::Decimal(d) => json!(d.to_string()),
        Item::Double(d) => float_value(*d),
        Item::Float(f) => float_value(f64::from(*f)),
        Item::Date { date, tz } => json!(format_date(*date, *tz)),
        Item::Time { time, tz } => json!(format_time(*time, *tz)),
        Item::DateTime { value, tz } => json!(format_date_time(*value, *tz)),
        Item::Duration(_) | Item::YearMonthDuration(_) | Item::DayTimeDuration(_) => json!(item.to_string()),
        Item::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), tag(v))).collect()),
        Item::Array(members) => Value::Array(members.iter().map(tag).collect()),
    };
    json!({ "type": item.type_name(), "value": value })
}

fn float_from(value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| corrupt("number out of range")),
        Value::String(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "INF" => Ok(f64::INFINITY),
            "-INF" => Ok(f64::NEG_INFINITY),
            other => Err(corrupt(format!("\"{other}\" is not a floating point value"))),
        },
        _ => Err(corrupt("expected a floating point value")),
    }
}

fn lexical(value: &Value) -> Result<&str> {
    value.as_str().ok_or_else(|| corrupt("expected a lexical string"))
}

fn duration_from(value: &Value, kind: DurationKind) -> Result<Item> {
    let d = Duration::parse(lexical(value)?, kind).map_err(|_| corrupt(format!("invalid {}", kind.type_name())))?;
    Ok(Item::duration_of_kind(d, kind))
}

fn untag(record: &Value) -> Result<Item> {
    let type_name = record.get("type").and_then(Value::as_str).ok_or_else(|| corrupt("missing type tag"))?;
    let value = record.get("value").ok_or_else(|| corrupt("missing value"))?;
    let bad = |what: &str| corrupt(format!("invalid {what}"));
    Ok(match type_name {
        "null" => Item::Null,
        "boolean" => Item::Boolean(value.as_bool().ok_or_else(|| bad("boolean"))?),
        "string" => Item::String(lexical(value)?.to_string()),
        "int" => {
            let i = value.as_i64().and_then(|i| i32::try_from(i).ok()).ok_or_else(|| bad("int"))?;
            Item::Int(i)
        }
        "integer" => Item::Integer(BigInt::from_str(lexical(value)?).map_err(|_| bad("integer"))?),
        "decimal" => Item::Decimal(BigDecimal::from_str(lexical(value)?).map_err(|_| bad("decimal"))?),
        "double" => Item::Double(float_from(value)?),
        "float" => Item::Float(float_from(value)? as f32),
        "date" => {
            let (date, tz) = parse_date(lexical(value)?).map_err(|_| bad("date"))?;
            Item::date(date, tz)
        }
        "time" => {
            let (time, tz) = parse_time(lexical(value)?).map_err(|_| bad("time"))?;
            Item::time(time, tz)
        }
        "dateTime" => {
            let (value, tz) = parse_date_time(lexical(value)?).map_err(|_| bad("dateTime"))?;
            Item::date_time(value, tz)
        }
        "duration" => duration_from(value, DurationKind::Duration)?,
        "yearMonthDuration" => duration_from(value, DurationKind::YearMonth)?,
        "dayTimeDuration" => duration_from(value, DurationKind::DayTime)?,
        "object" => {
            let fields: &Map<String, Value> = value.as_object().ok_or_else(|| bad("object"))?;
            let map = fields.iter().map(|(k, v)| Ok((k.clone(), untag(v)?))).collect::<Result<ObjectMap>>()?;
            Item::object(map)
        }
        "array" => {
            let members = value.as_array().ok_or_else(|| bad("array"))?;
            Item::array(members.iter().map(untag).collect::<Result<Vec<_>>>()?)
        }
        other => return Err(corrupt(format!("unknown type tag \"{other}\""))),
    })
}

impl ItemCodec for TaggedJsonCodec {
    fn encode(&mut self, items: &[Item]) -> Result<Vec<u8>> {
        self.ensure_ready();
        self.scratch.clear();
        let records: Vec<Value> = items.iter().map(tag).collect();
        serde_json::to_writer(&mut self.scratch, &records)?;
        Ok(self.scratch.clone())
    }

    fn decode(&mut self, bytes: &[u8]) -> Result<Sequence> {
        self.ensure_ready();
        let records: Vec<Value> = serde_json::from_slice(bytes)?;
        records.iter().map(untag).collect()
    }

    fn rehydrate(&mut self) {
        tracing::debug!("tagged json codec rehydrated");
        self.scratch = Vec::new();
        self.ready = false;
    }
}
