//! Client and per-query configuration.

use std::time::Duration;

use crate::precision::TimePrecision;
use crate::schema::CoercionPolicy;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(100);

/// Username and password sent as HTTP basic auth.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// InfluxDB user.
    pub username: String,
    /// Password for `username`.
    pub password: String,
}

impl Credentials {
    /// Create credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Settings applied to every request a [`Client`](crate::Client) sends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Timeout for a whole request, including reading the body.
    pub timeout: Duration,
    /// Basic-auth credentials, if the server requires authentication.
    pub credentials: Option<Credentials>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            credentials: None,
        }
    }
}

impl ClientConfig {
    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Authenticate with username and password.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }
}

/// Options for a single query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Epoch precision requested from the server and used to decode `time`.
    pub precision: TimePrecision,
    /// Retention policy to query instead of the database default.
    pub retention_policy: Option<String>,
    /// How typed queries treat values that do not fit their field.
    pub coercion: CoercionPolicy,
}

impl QueryOptions {
    /// Options with nanosecond precision, default retention policy and
    /// lenient coercion.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the epoch precision.
    pub fn precision(mut self, precision: TimePrecision) -> Self {
        self.precision = precision;
        self
    }

    /// Query a specific retention policy.
    pub fn retention_policy(mut self, rp: impl Into<String>) -> Self {
        self.retention_policy = Some(rp.into());
        self
    }

    /// Set the coercion policy for typed queries.
    pub fn coercion(mut self, policy: CoercionPolicy) -> Self {
        self.coercion = policy;
        self
    }
}
