//! Raw JSON shapes returned by the InfluxDB `/query` endpoint.
//!
//! A response looks like:
//!
//! ```json
//! {"results": [
//!   {"statement_id": 0,
//!    "series": [{"name": "cpu", "tags": {"host": "a"},
//!                "columns": ["time", "value"],
//!                "values": [[1625097600000000000, 42.5]]}],
//!    "partial": true},
//!   {"statement_id": 1, "error": "measurement not found"}
//! ]}
//! ```
//!
//! Statements are kept as untyped JSON in [`RawResponse`] and deserialized one
//! at a time, so a malformed statement does not prevent its siblings from
//! being materialized.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::Error;

/// One JSON document from the query endpoint (a whole response, or one chunk
/// of a chunked response).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawResponse {
    /// Statement objects, in response order.
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
    /// Request-level error (e.g. unparseable query, unknown database).
    #[serde(default)]
    pub error: Option<String>,
}

/// One statement object.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawStatement {
    /// Ordinal declared by the server.
    #[serde(default)]
    pub statement_id: Option<usize>,
    /// Series produced by the statement; absent for empty results.
    #[serde(default)]
    pub series: Vec<RawSeries>,
    /// Statement-level error.
    #[serde(default)]
    pub error: Option<String>,
    /// Set when the server truncated the statement, or, in chunked mode,
    /// when more chunks for this statement follow.
    #[serde(default)]
    pub partial: bool,
}

/// One series block.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawSeries {
    /// Measurement (or series) name.
    #[serde(default)]
    pub name: Option<String>,
    /// Tag set identifying the series within the measurement.
    #[serde(default)]
    pub tags: Option<BTreeMap<String, String>>,
    /// Column names; the first is conventionally `time`.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Value tuples, each matching `columns` in length.
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
    /// Set when the series was truncated, or, in chunked mode, when more rows
    /// of this series follow in a later chunk.
    #[serde(default)]
    pub partial: bool,
}

impl RawResponse {
    /// Parse a response body.
    pub fn from_slice(body: &[u8]) -> Result<Self, Error> {
        Ok(serde_json::from_slice(body)?)
    }

    /// True if any statement or series in this document carries a `partial`
    /// marker.
    ///
    /// The server does not say which series hit the row limit, so callers use
    /// this as a response-wide flag.
    pub fn is_partial(&self) -> bool {
        self.results.iter().any(|statement| {
            flag(statement)
                || statement
                    .get("series")
                    .and_then(|s| s.as_array())
                    .is_some_and(|series| series.iter().any(flag))
        })
    }
}

impl FromStr for RawResponse {
    type Err = Error;

    fn from_str(body: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(body)?)
    }
}

impl RawStatement {
    /// Deserialize a statement object taken from [`RawResponse::results`].
    pub fn from_json(value: &serde_json::Value) -> Result<Self, Error> {
        Ok(RawStatement::deserialize(value)?)
    }
}

/// Best-effort read of a statement's declared ordinal, used when the rest of
/// the statement is malformed.
pub(crate) fn declared_statement_id(value: &serde_json::Value) -> Option<usize> {
    value
        .get("statement_id")
        .and_then(|id| id.as_u64())
        .and_then(|id| usize::try_from(id).ok())
}

fn flag(value: &serde_json::Value) -> bool {
    value
        .get("partial")
        .and_then(|p| p.as_bool())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_series() {
        let resp: RawResponse = r#"{"results":[{"statement_id":3,"series":[
            {"name":"cpu","columns":["time","value"],"values":[[1,2.5]]}]}]}"#
            .parse()
            .unwrap();
        assert_eq!(resp.results.len(), 1);
        assert!(resp.error.is_none());

        let stmt = RawStatement::from_json(&resp.results[0]).unwrap();
        assert_eq!(stmt.statement_id, Some(3));
        assert!(!stmt.partial);
        assert_eq!(stmt.series.len(), 1);
        assert!(stmt.series[0].tags.is_none());
        assert_eq!(stmt.series[0].columns, vec!["time", "value"]);
    }

    #[test]
    fn test_statement_without_series() {
        let stmt = RawStatement::from_json(&serde_json::json!({"statement_id": 0})).unwrap();
        assert!(stmt.series.is_empty());
        assert!(stmt.error.is_none());
    }

    #[test]
    fn test_request_level_error() {
        let resp = RawResponse::from_slice(br#"{"error":"database not found: nope"}"#).unwrap();
        assert!(resp.results.is_empty());
        assert_eq!(resp.error.as_deref(), Some("database not found: nope"));
    }

    #[test]
    fn test_is_partial() {
        let resp: RawResponse = r#"{"results":[{"statement_id":0},{"statement_id":1,"partial":true}]}"#
            .parse()
            .unwrap();
        assert!(resp.is_partial());

        let resp: RawResponse =
            r#"{"results":[{"statement_id":0,"series":[{"name":"a","partial":true}]}]}"#
                .parse()
                .unwrap();
        assert!(resp.is_partial());

        let resp: RawResponse = r#"{"results":[{"statement_id":0,"series":[{"name":"a"}]}]}"#
            .parse()
            .unwrap();
        assert!(!resp.is_partial());
    }

    #[test]
    fn test_declared_statement_id_of_malformed_statement() {
        let v = serde_json::json!({"statement_id": 7, "series": "not-a-list"});
        assert!(RawStatement::from_json(&v).is_err());
        assert_eq!(declared_statement_id(&v), Some(7));
        assert_eq!(declared_statement_id(&serde_json::json!({})), None);
    }

    #[test]
    fn test_malformed_body() {
        assert!(matches!(
            "{not json".parse::<RawResponse>(),
            Err(Error::Serialization(_))
        ));
    }
}
