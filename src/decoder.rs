//! Decoding of raw value tuples into [`Row`]s.

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde_json::Number;

use crate::error::{Error, Result};
use crate::precision::TimePrecision;
use crate::types::{Row, TIME_COLUMN};
use crate::value::Value;

/// Largest integer magnitude that survives a round trip through f64.
const MAX_EXACT_F64_INT: u64 = 1 << 53;

/// Decode one value tuple against its column list.
///
/// Column and value counts must match. If the server repeats a column name the
/// later value wins.
pub fn decode_row(
    columns: &[String],
    values: &[serde_json::Value],
    precision: TimePrecision,
) -> Result<Row> {
    if columns.len() != values.len() {
        return Err(Error::ColumnMismatch {
            expected: columns.len(),
            actual: values.len(),
        });
    }

    let mut row = Row::new();
    for (column, token) in columns.iter().zip(values) {
        let value = if column == TIME_COLUMN {
            decode_time(token, precision)?
        } else {
            decode_value(token, column)?
        };
        row.values.insert(column.clone(), value);
    }
    Ok(row)
}

/// Decode every value tuple of a series block.
///
/// On failure, returns the index of the offending row with the error.
pub fn decode_rows(
    columns: &[String],
    values: &[Vec<serde_json::Value>],
    precision: TimePrecision,
) -> std::result::Result<Vec<Row>, (usize, Error)> {
    values
        .iter()
        .enumerate()
        .map(|(i, tuple)| decode_row(columns, tuple, precision).map_err(|e| (i, e)))
        .collect()
}

/// Decode a non-time token using its JSON type.
fn decode_value(token: &serde_json::Value, column: &str) -> Result<Value> {
    match token {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::String(s) => Ok(Value::String(s.clone())),
        serde_json::Value::Number(n) => decode_number(n, column),
        other => Err(Error::Parse {
            message: format!(
                "Unsupported JSON token {} for column '{}'",
                other, column
            ),
        }),
    }
}

/// Integers beyond the i64 range (unsigned fields) fall back to f64 and keep
/// their magnitude.
fn decode_number(n: &Number, column: &str) -> Result<Value> {
    if let Some(i) = n.as_i64() {
        if i.unsigned_abs() > MAX_EXACT_F64_INT {
            return Ok(Value::Integer(i));
        }
    }

    n.as_f64()
        .map(|f| Value::Float(OrderedFloat::from(f)))
        .ok_or_else(|| Error::Parse {
            message: format!("Invalid number {} for column '{}'", n, column),
        })
}

/// Decode the time column: integer epoch in `precision`, or RFC3339 text.
fn decode_time(token: &serde_json::Value, precision: TimePrecision) -> Result<Value> {
    let out_of_range = || Error::Parse {
        message: format!(
            "Timestamp {} out of range for precision '{}'",
            token, precision
        ),
    };

    match token {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Number(n) => {
            let epoch = match n.as_i64() {
                Some(i) => i,
                None => match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                        f as i64
                    }
                    _ => {
                        return Err(Error::Parse {
                            message: format!("Invalid epoch timestamp {}", n),
                        });
                    }
                },
            };
            precision
                .to_datetime(epoch)
                .map(Value::Timestamp)
                .ok_or_else(out_of_range)
        }
        serde_json::Value::String(s) => {
            let t = DateTime::parse_from_rfc3339(s).map_err(|e| Error::Parse {
                message: format!(
                    "Invalid RFC3339 timestamp '{}' for column '{}': {}",
                    s, TIME_COLUMN, e
                ),
            })?;
            Ok(Value::Timestamp(t.with_timezone(&Utc)))
        }
        other => Err(Error::Parse {
            message: format!("Unsupported time token {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_decode_nanosecond_epoch_and_float() {
        let row = decode_row(
            &cols(&["time", "value"]),
            &[json!(1625097600000000000i64), json!(42.5)],
            TimePrecision::Nanoseconds,
        )
        .unwrap();

        assert_eq!(row.time(), Some(&utc("2021-07-01T00:00:00Z")));
        assert_eq!(row.get_float("value"), Some(42.5));
    }

    #[test]
    fn test_decode_epoch_in_requested_precision() {
        let row = decode_row(
            &cols(&["time"]),
            &[json!(1625097600)],
            TimePrecision::Seconds,
        )
        .unwrap();
        assert_eq!(row.time(), Some(&utc("2021-07-01T00:00:00Z")));
    }

    #[test]
    fn test_decode_rfc3339_time() {
        let row = decode_row(
            &cols(&["time"]),
            &[json!("2021-07-01T02:00:00.123456789+02:00")],
            TimePrecision::Nanoseconds,
        )
        .unwrap();
        assert_eq!(row.time(), Some(&utc("2021-07-01T00:00:00.123456789Z")));
    }

    #[test]
    fn test_decode_invalid_time() {
        let err = decode_row(&cols(&["time"]), &[json!("yesterday")], TimePrecision::Nanoseconds)
            .unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));

        let err = decode_row(&cols(&["time"]), &[json!(1.5)], TimePrecision::Seconds).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));

        let err = decode_row(&cols(&["time"]), &[json!(true)], TimePrecision::Seconds).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_integers_decode_as_float() {
        let row = decode_row(&cols(&["n"]), &[json!(42)], TimePrecision::Nanoseconds).unwrap();
        assert_eq!(row.get("n"), Some(&Value::from(42.0)));
    }

    #[test]
    fn test_large_integers_keep_precision() {
        let big = 9_007_199_254_740_993i64;
        let row = decode_row(&cols(&["n"]), &[json!(big)], TimePrecision::Nanoseconds).unwrap();
        assert_eq!(row.get("n"), Some(&Value::Integer(big)));

    }

    #[test]
    fn test_unsigned_beyond_i64_decodes_as_float() {
        let row = decode_row(
            &cols(&["time", "u"]),
            &[json!(1), json!(18446744073709551615u64)],
            TimePrecision::Nanoseconds,
        )
        .unwrap();
        assert_eq!(row.get_float("u"), Some(18446744073709551615.0));
    }

    #[test]
    fn test_null_bool_and_string_tokens() {
        let row = decode_row(
            &cols(&["a", "b", "c"]),
            &[json!(null), json!(false), json!("x")],
            TimePrecision::Nanoseconds,
        )
        .unwrap();
        assert_eq!(row.get("a"), Some(&Value::Null));
        assert_eq!(row.get("b"), Some(&Value::Bool(false)));
        assert_eq!(row.get("c"), Some(&Value::from("x")));
        assert_eq!(row.get("d"), None);
    }

    #[test]
    fn test_nested_tokens_are_rejected() {
        let err = decode_row(&cols(&["a"]), &[json!([1, 2])], TimePrecision::Nanoseconds)
            .unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_column_count_mismatch() {
        let err = decode_row(
            &cols(&["time", "value"]),
            &[json!(1)],
            TimePrecision::Nanoseconds,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::ColumnMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_duplicate_column_last_write_wins() {
        let row = decode_row(
            &cols(&["v", "v"]),
            &[json!(1.0), json!(2.0)],
            TimePrecision::Nanoseconds,
        )
        .unwrap();
        assert_eq!(row.len(), 1);
        assert_eq!(row.get_float("v"), Some(2.0));
    }

    #[test]
    fn test_decode_rows_reports_failing_index() {
        let values = vec![vec![json!(1.0)], vec![json!(2.0)], vec![json!(1.0), json!(2.0)]];
        let (index, err) = decode_rows(&cols(&["v"]), &values, TimePrecision::Nanoseconds)
            .unwrap_err();
        assert_eq!(index, 2);
        assert!(matches!(err, Error::ColumnMismatch { .. }));
    }
}
