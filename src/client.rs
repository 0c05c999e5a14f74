//! InfluxDB query client.
//!
//! This module provides the main `Client` type for executing InfluxQL queries
//! against the `/query` endpoint of an InfluxDB 1.x compatible server.

use std::pin::Pin;
use std::time::Duration;

use futures::{Stream, TryStreamExt};
use reqwest::{Method, RequestBuilder, Response, Url};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use crate::chunked::{StreamedSeries, collect_chunked, decode_chunks, reassemble};
use crate::config::{ClientConfig, QueryOptions};
use crate::error::{Error, Result};
use crate::schema::FromRow;
use crate::statement::{aggregate, flatten_series};
use crate::types::{Series, Statement};
use crate::wire::RawResponse;

/// InfluxDB query client.
///
/// # Example
///
/// ```ignore
/// use influxql_series::{Client, ClientConfig, QueryOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Client::new("http://localhost:8086", ClientConfig::default())?;
///
///     let series = client
///         .query_series("telegraf", "SELECT usage_idle FROM cpu GROUP BY host", &QueryOptions::new())
///         .await?;
///
///     for s in series {
///         println!("{} {:?}: {} rows", s.name, s.tags, s.entries.len());
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    config: ClientConfig,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url.as_str())
            .field("config", &self.config)
            .finish()
    }
}

impl Client {
    /// Create a new InfluxDB client.
    ///
    /// # Arguments
    ///
    /// * `url` - Base URL of the InfluxDB server (e.g., "http://localhost:8086")
    /// * `config` - Timeout and credentials
    pub fn new(url: impl Into<String>, config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Self::with_http_client(http, url, config)
    }

    /// Create a new client with a custom reqwest client.
    ///
    /// This allows you to configure proxies, TLS settings, etc. The reqwest
    /// client's own timeout applies; `config.timeout` is only reported by
    /// [`timeout`](Self::timeout).
    pub fn with_http_client(
        http: reqwest::Client,
        url: impl Into<String>,
        config: ClientConfig,
    ) -> Result<Self> {
        let url_str = url.into();
        let base_url = Url::parse(&url_str).map_err(|e| Error::InvalidUrl {
            url: url_str.clone(),
            message: e.to_string(),
        })?;

        Ok(Self {
            http,
            base_url,
            config,
        })
    }

    /// Get the base URL.
    pub fn url(&self) -> &Url {
        &self.base_url
    }

    /// Get the configured request timeout.
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Build the full URL for an API endpoint.
    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(path);
        url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.endpoint(path));
        match &self.config.credentials {
            Some(c) => builder.basic_auth(&c.username, Some(&c.password)),
            None => builder,
        }
    }

    fn query_request(
        &self,
        database: &str,
        query: &str,
        options: &QueryOptions,
        chunk_size: Option<usize>,
    ) -> RequestBuilder {
        let mut params: Vec<(&str, String)> = vec![
            ("db", database.to_string()),
            ("q", query.to_string()),
            ("epoch", options.precision.as_query_param().to_string()),
        ];
        if let Some(rp) = &options.retention_policy {
            params.push(("rp", rp.clone()));
        }
        if let Some(size) = chunk_size {
            params.push(("chunked", "true".to_string()));
            if size > 0 {
                params.push(("chunk_size", size.to_string()));
            }
        }

        self.request(Method::GET, "/query")
            .header("Accept", "application/json")
            .query(&params)
    }

    /// Send a request, turning error statuses into errors.
    ///
    /// InfluxDB reports bad queries as `{"error": "..."}` with a 4xx status;
    /// that message is returned as [`Error::Query`].
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let http_error = response.error_for_status_ref().err();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(%status, error = %e, "failed to read error body");
                String::new()
            }
        };
        tracing::debug!(%status, body = %body, "query rejected");

        if let Some(message) = body.parse::<RawResponse>().ok().and_then(|r| r.error) {
            return Err(Error::Query { message });
        }
        match http_error {
            Some(e) => Err(Error::Http(e)),
            None => Err(Error::Query {
                message: format!("unexpected status {}", status),
            }),
        }
    }

    /// Get the server version from the `/ping` endpoint.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn server_version(&self) -> Result<String> {
        let response = self.send(self.request(Method::GET, "/ping")).await?;
        let version = response
            .headers()
            .get("X-Influxdb-Version")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Ok(version)
    }

    /// Execute a query and materialize every statement.
    ///
    /// Statement-level errors are recorded on the returned statements; a
    /// request-level error is returned as `Err`. If any statement or series
    /// in the response is marked partial, every series in the response is.
    #[tracing::instrument(level = "debug", skip(self, options), err)]
    pub async fn query(
        &self,
        database: &str,
        query: &str,
        options: &QueryOptions,
    ) -> Result<Vec<Statement>> {
        let response = self
            .send(self.query_request(database, query, options, None))
            .await?;
        let body = response.bytes().await?;
        let raw = RawResponse::from_slice(&body)?;

        let partial = raw.is_partial();
        if partial {
            tracing::warn!("response truncated by server row limit");
        }
        aggregate(&raw, partial, options.precision)
    }

    /// Execute a query and return all series of all statements.
    ///
    /// Fails if any statement failed.
    pub async fn query_series(
        &self,
        database: &str,
        query: &str,
        options: &QueryOptions,
    ) -> Result<Vec<Series>> {
        flatten_series(self.query(database, query, options).await?)
    }

    /// Execute a query and project every row into `T`.
    ///
    /// With [`CoercionPolicy::FailFast`](crate::CoercionPolicy::FailFast) a
    /// value that does not fit its field is recorded as an error on its
    /// statement.
    pub async fn query_typed<T: FromRow>(
        &self,
        database: &str,
        query: &str,
        options: &QueryOptions,
    ) -> Result<Vec<Statement<T>>> {
        let statements = self.query(database, query, options).await?;
        Ok(project_all(&statements, options))
    }

    /// Execute a query and return all series projected into `T`.
    ///
    /// Fails if any statement failed, including coercion failures under
    /// fail-fast coercion.
    pub async fn query_series_typed<T: FromRow>(
        &self,
        database: &str,
        query: &str,
        options: &QueryOptions,
    ) -> Result<Vec<Series<T>>> {
        flatten_series(self.query_typed(database, query, options).await?)
    }

    /// Execute a chunked query and stream series as they complete.
    ///
    /// The server sends at most `chunk_size` rows per chunk (0 uses the server
    /// default). Rows of a series split across chunks are merged before the
    /// series is yielded. See [`reassemble`] for error and
    /// cancellation behaviour.
    #[tracing::instrument(level = "debug", skip(self, options, cancel), err)]
    pub async fn query_chunked_stream(
        &self,
        database: &str,
        query: &str,
        chunk_size: usize,
        options: &QueryOptions,
        cancel: CancellationToken,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamedSeries>> + Send>>> {
        let chunks = self
            .chunk_stream(database, query, chunk_size, options)
            .await?;
        Ok(reassemble(chunks, options.precision, cancel))
    }

    /// Execute a chunked query and collect the reassembled statements.
    ///
    /// **Warning**: This loads all results into memory. Use
    /// [`query_chunked_stream`](Self::query_chunked_stream) to consume series
    /// while later chunks are still arriving.
    #[tracing::instrument(level = "debug", skip(self, options, cancel), err)]
    pub async fn query_chunked(
        &self,
        database: &str,
        query: &str,
        chunk_size: usize,
        options: &QueryOptions,
        cancel: CancellationToken,
    ) -> Result<Vec<Statement>> {
        let chunks = self
            .chunk_stream(database, query, chunk_size, options)
            .await?;
        collect_chunked(chunks, options.precision, cancel).await
    }

    /// Execute a chunked query and project the reassembled rows into `T`.
    pub async fn query_chunked_typed<T: FromRow>(
        &self,
        database: &str,
        query: &str,
        chunk_size: usize,
        options: &QueryOptions,
        cancel: CancellationToken,
    ) -> Result<Vec<Statement<T>>> {
        let statements = self
            .query_chunked(database, query, chunk_size, options, cancel)
            .await?;
        Ok(project_all(&statements, options))
    }

    async fn chunk_stream(
        &self,
        database: &str,
        query: &str,
        chunk_size: usize,
        options: &QueryOptions,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<RawResponse>> + Send>>> {
        let response = self
            .send(self.query_request(database, query, options, Some(chunk_size)))
            .await?;

        // Convert the response body to an async reader
        let reader = StreamReader::new(response.bytes_stream().map_err(std::io::Error::other));
        Ok(Box::pin(decode_chunks(reader)))
    }
}

fn project_all<T: FromRow>(statements: &[Statement], options: &QueryOptions) -> Vec<Statement<T>> {
    let schema = T::schema();
    statements
        .iter()
        .map(|s| s.project(&schema, options.coercion))
        .collect()
}
