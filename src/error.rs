//! Error types for influxql-series.

use thiserror::Error;

use crate::schema::FieldType;

/// Error type for influxql-series operations.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to deserialize a JSON response body.
    #[error("Failed to parse JSON response: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The server URL could not be parsed.
    #[error("Invalid InfluxDB URL '{url}': {message}")]
    InvalidUrl {
        /// The URL as given.
        url: String,
        /// Parser message.
        message: String,
    },

    /// Failed to parse a value from the response.
    #[error("Failed to parse value: {message}")]
    Parse {
        /// Description of what failed to parse.
        message: String,
    },

    /// Row has different number of values than the series has columns.
    #[error("Column count mismatch: expected {expected}, got {actual}")]
    ColumnMismatch {
        /// Number of columns declared by the series.
        expected: usize,
        /// Number of values found in the row.
        actual: usize,
    },

    /// A value could not be converted to a schema field's type.
    #[error("Coercion failed in series {series}, row {row}: {source}")]
    Coercion {
        /// Index of the series within its statement.
        series: usize,
        /// Index of the row within its series.
        row: usize,
        /// Field-level failure.
        #[source]
        source: CoercionError,
    },

    /// The whole request was rejected by InfluxDB.
    #[error("Query error from InfluxDB: {message}")]
    Query {
        /// Error message returned by InfluxDB.
        message: String,
    },

    /// A single statement of a (possibly multi-statement) query failed.
    #[error("Statement {statement_id} failed: {source}")]
    Statement {
        /// Declared ordinal of the failed statement.
        statement_id: usize,
        /// What went wrong.
        #[source]
        source: StatementError,
    },

    /// A chunked query was cancelled by the caller.
    #[error("Query cancelled")]
    Cancelled,

    /// I/O error during streaming.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A failure recorded against one statement.
///
/// Recorded on [`Statement::error`](crate::types::Statement::error) so that
/// sibling statements of the same response are still materialized.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum StatementError {
    /// InfluxDB reported an error for this statement.
    #[error("database error: {0}")]
    Database(String),

    /// The statement body did not have the expected shape.
    #[error("protocol violation{}: {message}", location(.series, .row))]
    Protocol {
        /// Series index, when the violation is inside a series block.
        series: Option<usize>,
        /// Row index, when the violation is inside a value tuple.
        row: Option<usize>,
        /// Description of the violation.
        message: String,
    },

    /// Typed projection failed under fail-fast coercion.
    #[error("coercion failed in series {series}, row {row}: {source}")]
    Coercion {
        /// Series index within the statement.
        series: usize,
        /// Row index within the series.
        row: usize,
        /// Field-level failure.
        source: CoercionError,
    },
}

fn location(series: &Option<usize>, row: &Option<usize>) -> String {
    match (series, row) {
        (Some(s), Some(r)) => format!(" in series {}, row {}", s, r),
        (Some(s), None) => format!(" in series {}", s),
        _ => String::new(),
    }
}

/// A single column value that could not be converted to a field type.
#[derive(Error, Clone, Debug, PartialEq)]
#[error("column '{column}' value {value} cannot be converted to {expected}")]
pub struct CoercionError {
    /// Column (or tag) name the value came from.
    pub column: String,
    /// Type requested by the schema field.
    pub expected: FieldType,
    /// Display form of the offending value.
    pub value: String,
}

/// Result type alias for influxql-series operations.
pub type Result<T> = std::result::Result<T, Error>;
