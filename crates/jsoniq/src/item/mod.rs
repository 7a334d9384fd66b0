//! The item model: one tagged value per dynamic type.
//!
//! Items are immutable once built. Objects and arrays share their payload
//! behind an [`Arc`] so cloning an item (which the pull protocol does a lot)
//! never copies a container.

pub mod duration;
pub mod temporal;

use core::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use crate::runtime::error::{Error, ErrorCode};
pub use duration::{Duration, DurationKind};

/// Ordered key/value payload of an object item.
pub type ObjectMap = IndexMap<String, Item>;

/// An ordered, possibly empty list of items.
pub type Sequence = Vec<Item>;

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Null,
    Boolean(bool),
    String(String),
    /// 32-bit machine integer; the fast path of the numeric ladder.
    Int(i32),
    /// Arbitrary-precision integer.
    Integer(BigInt),
    Decimal(BigDecimal),
    Double(f64),
    Float(f32),
    Date { date: NaiveDate, tz: Option<FixedOffset> },
    Time { time: NaiveTime, tz: Option<FixedOffset> },
    DateTime { value: NaiveDateTime, tz: Option<FixedOffset> },
    Duration(Duration),
    YearMonthDuration(i32),
    DayTimeDuration(TimeDelta),
    Object(Arc<ObjectMap>),
    Array(Arc<Vec<Item>>),
}

/// Dynamic type tag of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    Null,
    Boolean,
    String,
    Int,
    Integer,
    Decimal,
    Double,
    Float,
    Date,
    Time,
    DateTime,
    Duration,
    YearMonthDuration,
    DayTimeDuration,
    Object,
    Array,
}

impl ItemType {
    pub fn name(self) -> &'static str {
        match self {
            ItemType::Null => "null",
            ItemType::Boolean => "boolean",
            ItemType::String => "string",
            ItemType::Int => "int",
            ItemType::Integer => "integer",
            ItemType::Decimal => "decimal",
            ItemType::Double => "double",
            ItemType::Float => "float",
            ItemType::Date => "date",
            ItemType::Time => "time",
            ItemType::DateTime => "dateTime",
            ItemType::Duration => "duration",
            ItemType::YearMonthDuration => "yearMonthDuration",
            ItemType::DayTimeDuration => "dayTimeDuration",
            ItemType::Object => "object",
            ItemType::Array => "array",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Factory
impl Item {
    pub fn null() -> Self {
        Item::Null
    }

    pub fn boolean(b: bool) -> Self {
        Item::Boolean(b)
    }

    pub fn string(s: impl Into<String>) -> Self {
        Item::String(s.into())
    }

    pub fn int(i: i32) -> Self {
        Item::Int(i)
    }

    pub fn integer(i: impl Into<BigInt>) -> Self {
        Item::Integer(i.into())
    }

    pub fn decimal(d: BigDecimal) -> Self {
        Item::Decimal(d)
    }

    pub fn double(d: f64) -> Self {
        Item::Double(d)
    }

    pub fn float(f: f32) -> Self {
        Item::Float(f)
    }

    pub fn date(date: NaiveDate, tz: Option<FixedOffset>) -> Self {
        Item::Date { date, tz }
    }

    pub fn time(time: NaiveTime, tz: Option<FixedOffset>) -> Self {
        Item::Time { time, tz }
    }

    pub fn date_time(value: NaiveDateTime, tz: Option<FixedOffset>) -> Self {
        Item::DateTime { value, tz }
    }

    pub fn duration(d: Duration) -> Self {
        Item::Duration(d)
    }

    pub fn year_month_duration(months: i32) -> Self {
        Item::YearMonthDuration(months)
    }

    pub fn day_time_duration(delta: TimeDelta) -> Self {
        Item::DayTimeDuration(delta)
    }

    /// Build a duration item of the given kind, dropping the components that
    /// kind does not carry.
    pub fn duration_of_kind(d: Duration, kind: DurationKind) -> Self {
        match kind {
            DurationKind::Duration => Item::Duration(d),
            DurationKind::YearMonth => Item::YearMonthDuration(d.months),
            DurationKind::DayTime => Item::DayTimeDuration(d.delta),
        }
    }

    pub fn object(map: ObjectMap) -> Self {
        Item::Object(Arc::new(map))
    }

    pub fn object_from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Item)>) -> Self {
        Item::Object(Arc::new(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()))
    }

    pub fn array(members: Vec<Item>) -> Self {
        Item::Array(Arc::new(members))
    }

    /// Ingest a JSON value. Integral numbers that fit 32 bits become `int`,
    /// larger ones `integer`; numbers rendered with an exponent become
    /// `double`, other fractional numbers `decimal`.
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Item::Null,
            Value::Bool(b) => Item::Boolean(*b),
            Value::String(s) => Item::String(s.clone()),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return i32::try_from(i).map_or_else(|_| Item::Integer(BigInt::from(i)), Item::Int);
                }
                if let Some(u) = n.as_u64() {
                    return Item::Integer(BigInt::from(u));
                }
                let text = n.to_string();
                if text.contains(['e', 'E']) {
                    return Item::Double(n.as_f64().unwrap_or(f64::NAN));
                }
                BigDecimal::from_str(&text)
                    .map_or_else(|_| Item::Double(n.as_f64().unwrap_or(f64::NAN)), Item::Decimal)
            }
            Value::Array(values) => Item::array(values.iter().map(Item::from_json).collect()),
            Value::Object(map) => Item::object(map.iter().map(|(k, v)| (k.clone(), Item::from_json(v))).collect()),
        }
    }
}

// Type inspection
impl Item {
    pub fn item_type(&self) -> ItemType {
        match self {
            Item::Null => ItemType::Null,
            Item::Boolean(_) => ItemType::Boolean,
            Item::String(_) => ItemType::String,
            Item::Int(_) => ItemType::Int,
            Item::Integer(_) => ItemType::Integer,
            Item::Decimal(_) => ItemType::Decimal,
            Item::Double(_) => ItemType::Double,
            Item::Float(_) => ItemType::Float,
            Item::Date { .. } => ItemType::Date,
            Item::Time { .. } => ItemType::Time,
            Item::DateTime { .. } => ItemType::DateTime,
            Item::Duration(_) => ItemType::Duration,
            Item::YearMonthDuration(_) => ItemType::YearMonthDuration,
            Item::DayTimeDuration(_) => ItemType::DayTimeDuration,
            Item::Object(_) => ItemType::Object,
            Item::Array(_) => ItemType::Array,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.item_type().name()
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Item::Int(_))
    }

    /// `int` is a subtype of `integer`.
    pub fn is_integer(&self) -> bool {
        matches!(self, Item::Int(_) | Item::Integer(_))
    }

    /// `int` and `integer` are subtypes of `decimal`.
    pub fn is_decimal(&self) -> bool {
        matches!(self, Item::Int(_) | Item::Integer(_) | Item::Decimal(_))
    }

    pub fn is_double(&self) -> bool {
        matches!(self, Item::Double(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Item::Float(_))
    }

    pub fn is_numeric(&self) -> bool {
        self.is_decimal() || self.is_double() || self.is_float()
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Item::String(_))
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Item::Boolean(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Item::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Item::Object(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Item::Array(_))
    }

    pub fn is_atomic(&self) -> bool {
        !self.is_object() && !self.is_array()
    }

    pub fn is_date(&self) -> bool {
        matches!(self, Item::Date { .. })
    }

    pub fn is_time(&self) -> bool {
        matches!(self, Item::Time { .. })
    }

    pub fn is_date_time(&self) -> bool {
        matches!(self, Item::DateTime { .. })
    }

    pub fn is_year_month_duration(&self) -> bool {
        matches!(self, Item::YearMonthDuration(_))
    }

    pub fn is_day_time_duration(&self) -> bool {
        matches!(self, Item::DayTimeDuration(_))
    }

    /// Any of the three duration kinds.
    pub fn is_duration(&self) -> bool {
        matches!(self, Item::Duration(_) | Item::YearMonthDuration(_) | Item::DayTimeDuration(_))
    }
}

// Accessors and conversions
impl Item {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Item::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Item::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectMap> {
        match self {
            Item::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Item]> {
        match self {
            Item::Array(members) => Some(members),
            _ => None,
        }
    }

    /// Object keys in insertion order; empty for non-objects.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.as_object().into_iter().flat_map(|m| m.keys().map(String::as_str))
    }

    pub fn get(&self, key: &str) -> Option<&Item> {
        self.as_object().and_then(|m| m.get(key))
    }

    pub fn members(&self) -> &[Item] {
        self.as_array().unwrap_or(&[])
    }

    /// 1-based array member access.
    pub fn member(&self, position: usize) -> Option<&Item> {
        position.checked_sub(1).and_then(|i| self.members().get(i))
    }

    pub fn cast_to_double(&self) -> Option<f64> {
        match self {
            Item::Int(i) => Some(f64::from(*i)),
            Item::Integer(i) => Some(i.to_f64().unwrap_or(f64::NAN)),
            Item::Decimal(d) => Some(d.to_f64().unwrap_or(f64::NAN)),
            Item::Double(d) => Some(*d),
            Item::Float(f) => Some(f64::from(*f)),
            _ => None,
        }
    }

    pub fn cast_to_float(&self) -> Option<f32> {
        match self {
            Item::Int(i) => i.to_f32(),
            Item::Integer(i) => Some(i.to_f32().unwrap_or(f32::NAN)),
            Item::Decimal(d) => Some(d.to_f32().unwrap_or(f32::NAN)),
            Item::Double(d) => d.to_f32(),
            Item::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn to_big_integer(&self) -> Option<BigInt> {
        match self {
            Item::Int(i) => Some(BigInt::from(*i)),
            Item::Integer(i) => Some(i.clone()),
            _ => None,
        }
    }

    pub fn to_big_decimal(&self) -> Option<BigDecimal> {
        match self {
            Item::Int(i) => Some(BigDecimal::from(*i)),
            Item::Integer(i) => Some(BigDecimal::from(i.clone())),
            Item::Decimal(d) => Some(d.clone()),
            _ => None,
        }
    }

    /// Months and day-time delta of any duration kind.
    pub fn duration_parts(&self) -> Option<Duration> {
        match self {
            Item::Duration(d) => Some(*d),
            Item::YearMonthDuration(m) => Some(Duration::new(*m, TimeDelta::zero())),
            Item::DayTimeDuration(t) => Some(Duration::new(0, *t)),
            _ => None,
        }
    }

    /// Lexical value of an atomic item; containers have none.
    pub fn string_value(&self) -> Result<String, Error> {
        match self {
            Item::String(s) => Ok(s.clone()),
            Item::Object(_) | Item::Array(_) => Err(Error::unexpected_type(format!(
                "an item of type {} has no string value",
                self.type_name()
            ))),
            other => Ok(other.to_string()),
        }
    }
}

/// Effective boolean value of a sequence.
pub fn effective_boolean_value(items: &[Item]) -> Result<bool, Error> {
    let Some(first) = items.first() else {
        return Ok(false);
    };
    if !first.is_atomic() {
        return Ok(true);
    }
    if items.len() > 1 {
        return Err(Error::from_code(
            ErrorCode::FORG0006,
            "effective boolean value is not defined for a sequence of two or more atomic items",
        ));
    }
    match first {
        Item::Null => Ok(false),
        Item::Boolean(b) => Ok(*b),
        Item::String(s) => Ok(!s.is_empty()),
        Item::Int(i) => Ok(*i != 0),
        Item::Integer(i) => Ok(!i.is_zero()),
        Item::Decimal(d) => Ok(!d.is_zero()),
        Item::Double(d) => Ok(*d != 0.0 && !d.is_nan()),
        Item::Float(f) => Ok(*f != 0.0 && !f.is_nan()),
        other => Err(Error::from_code(
            ErrorCode::FORG0006,
            format!("effective boolean value is not defined for an item of type {}", other.type_name()),
        )),
    }
}

fn format_decimal(d: &BigDecimal) -> String {
    d.normalized().to_plain_string()
}

fn format_double(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d.is_infinite() {
        if d > 0.0 { "INF".to_string() } else { "-INF".to_string() }
    } else {
        format!("{d}")
    }
}

fn format_float(f: f32) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "INF".to_string() } else { "-INF".to_string() }
    } else {
        format!("{f}")
    }
}

// Inside containers every atomic that is not a JSON literal is quoted.
fn write_nested(item: &Item, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match item {
        Item::Null
        | Item::Boolean(_)
        | Item::Int(_)
        | Item::Integer(_)
        | Item::Decimal(_)
        | Item::Object(_)
        | Item::Array(_) => write!(f, "{item}"),
        Item::Double(d) if d.is_finite() => write!(f, "{item}"),
        Item::Float(x) if x.is_finite() => write!(f, "{item}"),
        Item::String(s) => write_quoted(s, f),
        other => write_quoted(&other.to_string(), f),
    }
}

fn write_quoted(s: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match serde_json::to_string(s) {
        Ok(quoted) => f.write_str(&quoted),
        Err(_) => write!(f, "\"{s}\""),
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Null => f.write_str("null"),
            Item::Boolean(b) => write!(f, "{b}"),
            Item::String(s) => f.write_str(s),
            Item::Int(i) => write!(f, "{i}"),
            Item::Integer(i) => write!(f, "{i}"),
            Item::Decimal(d) => f.write_str(&format_decimal(d)),
            Item::Double(d) => f.write_str(&format_double(*d)),
            Item::Float(x) => f.write_str(&format_float(*x)),
            Item::Date { date, tz } => f.write_str(&temporal::format_date(*date, *tz)),
            Item::Time { time, tz } => f.write_str(&temporal::format_time(*time, *tz)),
            Item::DateTime { value, tz } => f.write_str(&temporal::format_date_time(*value, *tz)),
            Item::Duration(d) => f.write_str(&d.format(DurationKind::Duration)),
            Item::YearMonthDuration(m) => f.write_str(&duration::format_year_month(*m)),
            Item::DayTimeDuration(t) => f.write_str(&duration::format_day_time(*t)),
            Item::Object(map) => {
                if map.is_empty() {
                    return f.write_str("{ }");
                }
                f.write_str("{ ")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_quoted(k, f)?;
                    f.write_str(" : ")?;
                    write_nested(v, f)?;
                }
                f.write_str(" }")
            }
            Item::Array(members) => {
                if members.is_empty() {
                    return f.write_str("[ ]");
                }
                f.write_str("[ ")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_nested(m, f)?;
                }
                f.write_str(" ]")
            }
        }
    }
}

impl From<bool> for Item {
    fn from(b: bool) -> Self {
        Item::Boolean(b)
    }
}

impl From<i32> for Item {
    fn from(i: i32) -> Self {
        Item::Int(i)
    }
}

impl From<&str> for Item {
    fn from(s: &str) -> Self {
        Item::String(s.to_string())
    }
}

impl From<String> for Item {
    fn from(s: String) -> Self {
        Item::String(s)
    }
}

impl From<f64> for Item {
    fn from(d: f64) -> Self {
        Item::Double(d)
    }
}
