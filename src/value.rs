//! Value types for InfluxQL query results.

use chrono::{DateTime, SecondsFormat, Utc};
use ordered_float::OrderedFloat;

/// Represents a single cell of an InfluxQL query result.
///
/// InfluxDB's JSON responses carry untyped tokens; the decoder maps them onto
/// this closed set of variants. Typed projection into caller structs is a
/// separate step on top of this representation (see [`crate::schema`]).
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// String value (string fields and tag values).
    String(String),

    /// 64-bit floating point value. JSON numbers decode here by default.
    Float(OrderedFloat<f64>),

    /// Signed 64-bit integer, for integers not exactly representable as f64.
    Integer(i64),

    /// Boolean value.
    Bool(bool),

    /// Absolute timestamp, normalized to UTC.
    Timestamp(DateTime<Utc>),

    /// Explicit JSON `null`.
    Null,
}

impl Value {
    /// Returns the value as a string reference if it is a `String` variant.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an owned string if it is a `String` variant.
    pub fn string(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Returns the value as a f64 if it is a `Float` variant.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(f.into_inner()),
            _ => None,
        }
    }

    /// Returns the value as an i64 if it is an `Integer` variant.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a bool if it is a `Bool` variant.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as a DateTime if it is a `Timestamp` variant.
    pub fn as_timestamp(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(t),
            _ => None,
        }
    }

    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(OrderedFloat::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::Float(d) => write!(f, "{}", d),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Timestamp(t) => write!(f, "{}", t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Null => write!(f, "null"),
        }
    }
}
