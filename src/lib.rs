//! # influxql-series
//!
//! Async InfluxQL client that turns the `/query` endpoint's schema-less JSON
//! into queryable series.
//!
//! InfluxDB answers a query with statements, each holding series, each holding
//! a column list and untyped value tuples. This crate materializes that into
//! [`Statement`]s of [`Series`] whose rows are either dynamic [`Row`]s (column
//! name to [`Value`]) or instances of your own types via a [`Schema`].
//!
//! ## Quick Start
//!
//! ```ignore
//! use influxql_series::{Client, ClientConfig, QueryOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new("http://localhost:8086", ClientConfig::default())?;
//!
//!     let statements = client
//!         .query("telegraf", "SELECT mean(usage_idle) FROM cpu GROUP BY host; SHOW DATABASES", &QueryOptions::new())
//!         .await?;
//!
//!     for statement in statements {
//!         statement.check()?;
//!         for series in &statement.series {
//!             for row in &series.entries {
//!                 println!("{} {:?} {:?} {:?}", series.name, series.tags, row.time(), row.get("mean"));
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Typed rows
//!
//! ```ignore
//! use influxql_series::{FromRow, Schema};
//!
//! #[derive(Default)]
//! struct Cpu {
//!     host: String,
//!     usage: f64,
//! }
//!
//! impl FromRow for Cpu {
//!     fn schema() -> Schema<Self> {
//!         Schema::new()
//!             .string("host", |c: &mut Cpu, v| c.host = v)
//!             .float("usage_idle", |c: &mut Cpu, v| c.usage = v)
//!     }
//! }
//!
//! let series = client.query_series_typed::<Cpu>("telegraf", "SELECT * FROM cpu", &QueryOptions::new()).await?;
//! ```
//!
//! ## Chunked queries
//!
//! ```ignore
//! use futures::StreamExt;
//! use tokio_util::sync::CancellationToken;
//!
//! let mut stream = client
//!     .query_chunked_stream("telegraf", "SELECT * FROM cpu GROUP BY host", 10_000, &QueryOptions::new(), CancellationToken::new())
//!     .await?;
//! while let Some(item) = stream.next().await {
//!     let streamed = item?;
//!     println!("statement {}: {} rows", streamed.statement_id, streamed.series.entries.len());
//! }
//! ```
//!
//! ## Partial results
//!
//! When the server hits a row limit it does not say which series was cut.
//! Every series of such a response carries `partial == true`.

pub mod chunked;
pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod precision;
pub mod schema;
pub mod series;
pub mod statement;
pub mod tags;
pub mod types;
pub mod value;
pub mod wire;

// Re-export main types at crate root
pub use chunked::{
    ChunkEvent, ChunkReassembler, ReassemblerState, StreamedSeries, collect_chunked, decode_chunks,
    reassemble,
};
pub use client::Client;
pub use config::{ClientConfig, Credentials, QueryOptions};
pub use error::{CoercionError, Error, Result, StatementError};
pub use precision::TimePrecision;
pub use schema::{CoercionPolicy, FieldType, FromRow, Schema};
pub use statement::{aggregate, aggregate_typed, flatten_series, parse_response};
pub use types::{Row, Series, SeriesKey, Statement};
pub use value::Value;
pub use wire::{RawResponse, RawSeries, RawStatement};
