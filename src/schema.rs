//! Projection of dynamic rows into caller-defined types.
//!
//! A [`Schema`] is an ordered list of field mappings, each naming a column, the
//! type the field expects and a setter. It is built once per query and reused
//! for every row, so the mapping is plain data that can be inspected and tested.
//!
//! # Example
//!
//! ```
//! use chrono::{DateTime, Utc};
//! use influxql_series::schema::{FromRow, Schema};
//!
//! #[derive(Default)]
//! struct Cpu {
//!     time: Option<DateTime<Utc>>,
//!     host: String,
//!     usage: f64,
//! }
//!
//! impl FromRow for Cpu {
//!     fn schema() -> Schema<Self> {
//!         Schema::new()
//!             .timestamp("time", |c: &mut Cpu, v| c.time = Some(v))
//!             .string("host", |c: &mut Cpu, v| c.host = v)
//!             .float("usage", |c: &mut Cpu, v| c.usage = v)
//!     }
//! }
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use ordered_float::OrderedFloat;

use crate::error::CoercionError;
use crate::types::Row;
use crate::value::Value;

/// Types a schema field can request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Text.
    String,
    /// 64-bit float.
    Float,
    /// 64-bit signed integer.
    Integer,
    /// Boolean.
    Bool,
    /// Absolute UTC timestamp.
    Timestamp,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FieldType::String => "string",
            FieldType::Float => "float",
            FieldType::Integer => "integer",
            FieldType::Bool => "boolean",
            FieldType::Timestamp => "timestamp",
        };
        write!(f, "{}", s)
    }
}

/// What to do when a column value cannot be converted to its field's type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CoercionPolicy {
    /// Leave the field at its default value and keep going.
    #[default]
    Lenient,
    /// Abort projection of the row and report the failure.
    FailFast,
}

/// Types that can be built from a result row.
pub trait FromRow: Default + Sized {
    /// The column mapping for this type.
    fn schema() -> Schema<Self>;
}

/// Convert a non-null value to `target`.
///
/// Returns `None` when the conversion is not allowed. Floats narrow to
/// integers only when they are whole and in range.
pub fn coerce(value: &Value, target: FieldType) -> Option<Value> {
    match (value, target) {
        (Value::String(_), FieldType::String)
        | (Value::Float(_), FieldType::Float)
        | (Value::Integer(_), FieldType::Integer)
        | (Value::Bool(_), FieldType::Bool)
        | (Value::Timestamp(_), FieldType::Timestamp) => Some(value.clone()),

        (Value::Float(f), FieldType::Integer) => {
            let f = f.into_inner();
            // i64::MAX as f64 rounds up to 2^63, which is already out of range.
            (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64)
                .then(|| Value::Integer(f as i64))
        }
        (Value::Integer(i), FieldType::Float) => Some(Value::Float(OrderedFloat::from(*i as f64))),
        (Value::String(s), FieldType::Timestamp) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| Value::Timestamp(t.with_timezone(&Utc))),
        (Value::Timestamp(t), FieldType::String) => Some(Value::String(
            t.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        )),
        (Value::Timestamp(t), FieldType::Integer) => t.timestamp_nanos_opt().map(Value::Integer),
        _ => None,
    }
}

enum Setter<T> {
    String(Box<dyn Fn(&mut T, String) + Send + Sync>),
    Float(Box<dyn Fn(&mut T, f64) + Send + Sync>),
    Integer(Box<dyn Fn(&mut T, i64) + Send + Sync>),
    Bool(Box<dyn Fn(&mut T, bool) + Send + Sync>),
    Timestamp(Box<dyn Fn(&mut T, DateTime<Utc>) + Send + Sync>),
}

impl<T> Setter<T> {
    fn field_type(&self) -> FieldType {
        match self {
            Setter::String(_) => FieldType::String,
            Setter::Float(_) => FieldType::Float,
            Setter::Integer(_) => FieldType::Integer,
            Setter::Bool(_) => FieldType::Bool,
            Setter::Timestamp(_) => FieldType::Timestamp,
        }
    }

    /// `value` has already been coerced to `self.field_type()`.
    fn apply(&self, target: &mut T, value: Value) {
        match (self, value) {
            (Setter::String(set), Value::String(v)) => set(target, v),
            (Setter::Float(set), Value::Float(v)) => set(target, v.into_inner()),
            (Setter::Integer(set), Value::Integer(v)) => set(target, v),
            (Setter::Bool(set), Value::Bool(v)) => set(target, v),
            (Setter::Timestamp(set), Value::Timestamp(v)) => set(target, v),
            _ => {}
        }
    }
}

struct FieldMapping<T> {
    column: String,
    setter: Setter<T>,
}

/// Column-to-field mapping for a caller type `T`.
pub struct Schema<T> {
    fields: Vec<FieldMapping<T>>,
}

impl<T> Default for Schema<T> {
    fn default() -> Self {
        Self { fields: Vec::new() }
    }
}

impl<T> std::fmt::Debug for Schema<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.fields()).finish()
    }
}

impl<T> Schema<T> {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    fn with(mut self, column: impl Into<String>, setter: Setter<T>) -> Self {
        self.fields.push(FieldMapping {
            column: column.into(),
            setter,
        });
        self
    }

    /// Map a column to a string field.
    pub fn string(
        self,
        column: impl Into<String>,
        set: impl Fn(&mut T, String) + Send + Sync + 'static,
    ) -> Self {
        self.with(column, Setter::String(Box::new(set)))
    }

    /// Map a column to a float field.
    pub fn float(
        self,
        column: impl Into<String>,
        set: impl Fn(&mut T, f64) + Send + Sync + 'static,
    ) -> Self {
        self.with(column, Setter::Float(Box::new(set)))
    }

    /// Map a column to an integer field. Whole-valued floats are accepted.
    pub fn integer(
        self,
        column: impl Into<String>,
        set: impl Fn(&mut T, i64) + Send + Sync + 'static,
    ) -> Self {
        self.with(column, Setter::Integer(Box::new(set)))
    }

    /// Map a column to a boolean field.
    pub fn boolean(
        self,
        column: impl Into<String>,
        set: impl Fn(&mut T, bool) + Send + Sync + 'static,
    ) -> Self {
        self.with(column, Setter::Bool(Box::new(set)))
    }

    /// Map a column to a timestamp field.
    pub fn timestamp(
        self,
        column: impl Into<String>,
        set: impl Fn(&mut T, DateTime<Utc>) + Send + Sync + 'static,
    ) -> Self {
        self.with(column, Setter::Timestamp(Box::new(set)))
    }

    /// Mapped columns and their field types, in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.fields
            .iter()
            .map(|f| (f.column.as_str(), f.setter.field_type()))
    }

    /// Number of mapped fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if no fields are mapped.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<T: Default> Schema<T> {
    /// Build a `T` from a row.
    ///
    /// Columns match field names case-insensitively; a field with no matching
    /// column falls back to the series tag of that name. Fields that match
    /// nothing, or whose value is null, keep their default. Under
    /// [`CoercionPolicy::Lenient`] a value that cannot be converted is skipped;
    /// under [`CoercionPolicy::FailFast`] it is returned as an error.
    pub fn project(
        &self,
        row: &Row,
        tags: &BTreeMap<String, String>,
        policy: CoercionPolicy,
    ) -> Result<T, CoercionError> {
        let mut target = T::default();

        for field in &self.fields {
            let Some(value) = lookup(row, tags, &field.column) else {
                continue;
            };
            if value.is_null() {
                continue;
            }

            let expected = field.setter.field_type();
            match coerce(&value, expected) {
                Some(coerced) => field.setter.apply(&mut target, coerced),
                None if policy == CoercionPolicy::FailFast => {
                    return Err(CoercionError {
                        column: field.column.clone(),
                        expected,
                        value: value.to_string(),
                    });
                }
                None => {}
            }
        }

        Ok(target)
    }
}

fn lookup(row: &Row, tags: &BTreeMap<String, String>, column: &str) -> Option<Value> {
    if let Some(v) = row.get(column) {
        return Some(v.clone());
    }
    if let Some((_, v)) = row
        .values
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(column))
    {
        return Some(v.clone());
    }
    tags.iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(column))
        .map(|(_, v)| Value::String(v.clone()))
}
