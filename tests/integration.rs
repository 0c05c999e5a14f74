//! Integration tests for influxql-series.
//!
//! These tests require a running InfluxDB 1.x instance on localhost:8086
//! with authentication disabled, e.g.
//! `docker run -p 8086:8086 influxdb:1.8`.
//!
//! Run tests with: `cargo test --test integration`

use futures::StreamExt;
use influxql_series::{
    Client, ClientConfig, CoercionPolicy, Error, FromRow, QueryOptions, Schema, StatementError,
    TimePrecision,
};
use serial_test::serial;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const INFLUXDB_URL: &str = "http://localhost:8086";
const INFLUXDB_DB: &str = "influxql_series_test";

/// Helper to check if InfluxDB is available
async fn influxdb_available() -> bool {
    let client = reqwest::Client::new();
    client
        .get(format!("{}/ping", INFLUXDB_URL))
        .timeout(Duration::from_secs(2))
        .send()
        .await
        .map(|r| r.status().is_success())
        .unwrap_or(false)
}

/// Drop and recreate the test database.
async fn reset_database() -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();
    for q in [
        format!("DROP DATABASE {}", INFLUXDB_DB),
        format!("CREATE DATABASE {}", INFLUXDB_DB),
    ] {
        client
            .post(format!("{}/query", INFLUXDB_URL))
            .form(&[("q", q)])
            .send()
            .await?
            .error_for_status()?;
    }
    Ok(())
}

/// Helper to write test data using Line Protocol
async fn write_test_data(lines: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();
    let url = format!("{}/write?db={}&precision=ms", INFLUXDB_URL, INFLUXDB_DB);

    let response = client.post(&url).body(lines.to_string()).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await?;
        return Err(format!("Write failed: {} - {}", status, body).into());
    }

    Ok(())
}

/// Generate Line Protocol for `count` points spread over `hosts` hosts.
fn generate_line_protocol(measurement: &str, count: usize, hosts: usize) -> String {
    let base_ts = 1700000000000i64; // 2023-11-14
    let mut lines = Vec::with_capacity(count);

    for i in 0..count {
        let ts = base_ts + (i as i64 * 1000);
        lines.push(format!(
            "{},host=server{},region=us-east value={}.5,count={}i {}",
            measurement,
            i % hosts,
            i % 100,
            i,
            ts
        ));
    }

    lines.join("\n")
}

fn client() -> Client {
    Client::new(INFLUXDB_URL, ClientConfig::default()).unwrap()
}

#[derive(Debug, Default)]
struct Reading {
    host: String,
    value: f64,
    count: i64,
}

impl FromRow for Reading {
    fn schema() -> Schema<Self> {
        Schema::new()
            .string("host", |r: &mut Reading, v| r.host = v)
            .float("value", |r: &mut Reading, v| r.value = v)
            .integer("count", |r: &mut Reading, v| r.count = v)
    }
}

// ============================================================================
// Basic Integration Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn test_server_version() {
    if !influxdb_available().await {
        eprintln!("Skipping test: InfluxDB not available");
        return;
    }

    let version = client().server_version().await.unwrap();
    assert!(!version.is_empty());
}

#[tokio::test]
#[serial]
async fn test_group_by_tag() {
    if !influxdb_available().await {
        eprintln!("Skipping test: InfluxDB not available");
        return;
    }

    reset_database().await.unwrap();
    write_test_data(&generate_line_protocol("cpu", 100, 4))
        .await
        .unwrap();

    let series = client()
        .query_series(
            INFLUXDB_DB,
            "SELECT value FROM cpu GROUP BY host",
            &QueryOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(series.len(), 4);
    for s in &series {
        assert_eq!(s.name, "cpu");
        assert!(s.tag("host").unwrap().starts_with("server"));
        assert_eq!(s.entries.len(), 25);
        assert!(!s.partial);
        assert!(s.entries.iter().all(|row| row.time().is_some()));
    }
}

#[tokio::test]
#[serial]
async fn test_multiple_statements() {
    if !influxdb_available().await {
        eprintln!("Skipping test: InfluxDB not available");
        return;
    }

    reset_database().await.unwrap();
    write_test_data(&generate_line_protocol("mem", 10, 1))
        .await
        .unwrap();

    let statements = client()
        .query(
            INFLUXDB_DB,
            "SELECT count(value) FROM mem; SELECT * FROM does_not_exist; SHOW MEASUREMENTS ON no_such_database",
            &QueryOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(statements.len(), 3);
    let ids: Vec<usize> = statements.iter().map(|s| s.statement_id).collect();
    assert_eq!(ids, vec![0, 1, 2]);

    let counted = &statements[0].series[0].entries[0];
    assert_eq!(counted.get_float("count"), Some(10.0));

    // Unknown measurement is an empty statement, not an error
    assert!(statements[1].error.is_none());
    assert!(statements[1].series.is_empty());

    assert!(matches!(
        statements[2].error,
        Some(StatementError::Database(_))
    ));
}

#[tokio::test]
#[serial]
async fn test_invalid_query() {
    if !influxdb_available().await {
        eprintln!("Skipping test: InfluxDB not available");
        return;
    }

    let err = client()
        .query(INFLUXDB_DB, "SELEC value FORM cpu", &QueryOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Query { .. }), "got {:?}", err);
}

#[tokio::test]
#[serial]
async fn test_precision() {
    if !influxdb_available().await {
        eprintln!("Skipping test: InfluxDB not available");
        return;
    }

    reset_database().await.unwrap();
    write_test_data(&generate_line_protocol("disk", 1, 1))
        .await
        .unwrap();

    for precision in [TimePrecision::Nanoseconds, TimePrecision::Milliseconds] {
        let series = client()
            .query_series(
                INFLUXDB_DB,
                "SELECT value FROM disk",
                &QueryOptions::new().precision(precision),
            )
            .await
            .unwrap();
        let time = series[0].entries[0].time().unwrap();
        assert_eq!(time.timestamp_millis(), 1700000000000);
    }
}

#[tokio::test]
#[serial]
async fn test_typed_query() {
    if !influxdb_available().await {
        eprintln!("Skipping test: InfluxDB not available");
        return;
    }

    reset_database().await.unwrap();
    write_test_data(&generate_line_protocol("net", 20, 2))
        .await
        .unwrap();

    let options = QueryOptions::new().coercion(CoercionPolicy::FailFast);
    let series = client()
        .query_series_typed::<Reading>(
            INFLUXDB_DB,
            "SELECT value, count FROM net GROUP BY host",
            &options,
        )
        .await
        .unwrap();

    assert_eq!(series.len(), 2);
    for s in &series {
        assert_eq!(s.entries.len(), 10);
        for reading in &s.entries {
            // host comes from the series tags
            assert_eq!(reading.host, s.tags["host"]);
            assert!(reading.value >= 0.5);
            assert!(reading.count >= 0);
        }
    }
}

// ============================================================================
// Chunked Query Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn test_chunked_reassembles_series() {
    if !influxdb_available().await {
        eprintln!("Skipping test: InfluxDB not available");
        return;
    }

    reset_database().await.unwrap();
    write_test_data(&generate_line_protocol("chunky", 1_000, 2))
        .await
        .unwrap();

    let mut stream = client()
        .query_chunked_stream(
            INFLUXDB_DB,
            "SELECT value FROM chunky GROUP BY host",
            100,
            &QueryOptions::new(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let mut series = Vec::new();
    while let Some(result) = stream.next().await {
        series.push(result.expect("Failed to reassemble series"));
    }

    assert_eq!(series.len(), 2, "one series per host");
    for s in &series {
        assert_eq!(s.statement_id, 0);
        assert_eq!(s.series.entries.len(), 500);
        assert!(!s.series.partial);
    }
}

#[tokio::test]
#[serial]
async fn test_chunked_matches_unchunked() {
    if !influxdb_available().await {
        eprintln!("Skipping test: InfluxDB not available");
        return;
    }

    reset_database().await.unwrap();
    write_test_data(&generate_line_protocol("same", 300, 3))
        .await
        .unwrap();

    let query = "SELECT value FROM same GROUP BY host";
    let whole = client()
        .query(INFLUXDB_DB, query, &QueryOptions::new())
        .await
        .unwrap();
    let chunked = client()
        .query_chunked(
            INFLUXDB_DB,
            query,
            7,
            &QueryOptions::new(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(whole, chunked);
}

#[tokio::test]
#[serial]
async fn test_chunked_cancel() {
    if !influxdb_available().await {
        eprintln!("Skipping test: InfluxDB not available");
        return;
    }

    reset_database().await.unwrap();
    write_test_data(&generate_line_protocol("cancel", 1_000, 1))
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = client()
        .query_chunked(
            INFLUXDB_DB,
            "SELECT value FROM cancel",
            10,
            &QueryOptions::new(),
            cancel,
        )
        .await;
    assert!(matches!(result, Err(Error::Cancelled)));
}
