//! Core types for materialized InfluxQL query results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result, StatementError};
use crate::value::Value;

/// Name of the time column in every InfluxQL result.
pub const TIME_COLUMN: &str = "time";

/// A single row of a series, keyed by column name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    /// Column name to value mapping.
    pub values: BTreeMap<String, Value>,
}

impl Row {
    /// Create a new empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value by column name.
    ///
    /// `None` means the column is absent; `Some(Value::Null)` means the
    /// column is present with no value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Whether the row has a column with this name (null or not).
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Get value as string.
    pub fn get_string(&self, name: &str) -> Option<String> {
        self.values.get(name).and_then(|v| v.string())
    }

    /// Get value as f64.
    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(|v| v.as_float())
    }

    /// Get value as i64.
    pub fn get_integer(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(|v| v.as_integer())
    }

    /// Get value as bool.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(|v| v.as_bool())
    }

    /// Get the timestamp (`time` column).
    pub fn time(&self) -> Option<&DateTime<Utc>> {
        self.values.get(TIME_COLUMN).and_then(|v| v.as_timestamp())
    }

    /// Column names, sorted.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Identity of a series: measurement name plus tag set.
///
/// Two series blocks with equal keys belong to the same logical series. Tag
/// order does not matter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    /// Series name.
    pub name: String,
    /// Tag key to tag value.
    pub tags: BTreeMap<String, String>,
}

/// A materialized series.
///
/// `R` is [`Row`] for dynamic results, or a caller type for typed results
/// (see [`crate::schema::FromRow`]).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Series<R = Row> {
    /// Name of the series, usually the measurement name. May be empty.
    pub name: String,
    /// Tag key to tag value. Empty when the server sent no tags.
    pub tags: BTreeMap<String, String>,
    /// Rows, in server order.
    pub entries: Vec<R>,
    /// True if the response was truncated by a server row limit. The server
    /// does not say which series was cut, so every series of a partial
    /// statement carries this flag.
    pub partial: bool,
}

impl<R> Series<R> {
    /// Whether this series has any entries.
    pub fn has_entries(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Identity of this series.
    pub fn key(&self) -> SeriesKey {
        SeriesKey {
            name: self.name.clone(),
            tags: self.tags.clone(),
        }
    }

    /// Get a tag value.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// All series produced by one statement of a query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Statement<R = Row> {
    /// Ordinal declared by the server for this statement.
    pub statement_id: usize,
    /// Series of this statement, in server order. Empty when `error` is set.
    pub series: Vec<Series<R>>,
    /// True if the server signalled a row-limit truncation for this
    /// statement. Propagated to every series in `series`.
    pub partial: bool,
    /// Error recorded for this statement.
    pub error: Option<StatementError>,
}

impl<R> Statement<R> {
    /// Turn a recorded statement error into an `Err`.
    pub fn check(&self) -> Result<()> {
        match &self.error {
            Some(e) => Err(Error::Statement {
                statement_id: self.statement_id,
                source: e.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Consume the statement, returning its series or its error.
    pub fn into_series(self) -> Result<Vec<Series<R>>> {
        self.check()?;
        Ok(self.series)
    }

    /// Total number of rows across all series.
    pub fn row_count(&self) -> usize {
        self.series.iter().map(|s| s.entries.len()).sum()
    }
}
