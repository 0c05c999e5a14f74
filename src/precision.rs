//! Epoch precision of query results.

use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::Error;

/// Unit of the integer timestamps InfluxDB returns when `epoch` is requested.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TimePrecision {
    /// Hours (`h`).
    Hours,
    /// Minutes (`m`).
    Minutes,
    /// Seconds (`s`).
    Seconds,
    /// Milliseconds (`ms`).
    Milliseconds,
    /// Microseconds (`u`).
    Microseconds,
    /// Nanoseconds (`ns`).
    #[default]
    Nanoseconds,
}

impl TimePrecision {
    /// Value of the `epoch` query-string parameter for this precision.
    pub fn as_query_param(&self) -> &'static str {
        match self {
            TimePrecision::Hours => "h",
            TimePrecision::Minutes => "m",
            TimePrecision::Seconds => "s",
            TimePrecision::Milliseconds => "ms",
            TimePrecision::Microseconds => "u",
            TimePrecision::Nanoseconds => "ns",
        }
    }

    /// Convert an integer epoch in this precision to an absolute instant.
    ///
    /// Returns `None` when the instant is outside chrono's representable range.
    pub fn to_datetime(&self, epoch: i64) -> Option<DateTime<Utc>> {
        match self {
            TimePrecision::Hours => DateTime::from_timestamp(epoch.checked_mul(3600)?, 0),
            TimePrecision::Minutes => DateTime::from_timestamp(epoch.checked_mul(60)?, 0),
            TimePrecision::Seconds => DateTime::from_timestamp(epoch, 0),
            TimePrecision::Milliseconds => DateTime::from_timestamp_millis(epoch),
            TimePrecision::Microseconds => DateTime::from_timestamp_micros(epoch),
            TimePrecision::Nanoseconds => Some(DateTime::from_timestamp_nanos(epoch)),
        }
    }
}

impl FromStr for TimePrecision {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "h" => Ok(Self::Hours),
            "m" => Ok(Self::Minutes),
            "s" => Ok(Self::Seconds),
            "ms" => Ok(Self::Milliseconds),
            "u" | "us" | "µ" => Ok(Self::Microseconds),
            "ns" | "n" => Ok(Self::Nanoseconds),
            _ => Err(Error::Parse {
                message: format!("Unknown time precision: {}", input),
            }),
        }
    }
}

impl std::fmt::Display for TimePrecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_query_param())
    }
}
