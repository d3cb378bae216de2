//! Sink configuration.
//!
//! Configuration is built in code with [`SinkConfig::builder`] or loaded from
//! environment variables with [`SinkConfig::from_env`].

use crate::batching::BatcherOptions;
use crate::error::SinkError;
use crate::severity::Facility;
use crate::translate::{FormatProvider, InvariantFormat, TimestampField};
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

/// Default number of events per batch.
pub const DEFAULT_BATCH_SIZE_LIMIT: usize = 100;

/// Default flush period.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(30);

/// Default cap on buffered events.
pub const DEFAULT_QUEUE_LIMIT: usize = 100_000;

/// Default wait for the final flush on shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Default timeout for a single destination request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default measurement name.
pub const DEFAULT_SOURCE: &str = "syslog";

/// Destination address, credentials and target database.
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct ConnectionInfo {
    /// Host or base URL of the destination (e.g. `http://localhost`).
    #[validate(length(min = 1, message = "Address cannot be empty"))]
    pub address: String,

    /// Destination port.
    #[validate(range(min = 1, message = "Port must be greater than zero"))]
    pub port: u16,

    /// Username; empty disables authentication.
    pub username: String,

    /// Password for `username`.
    pub password: String,

    /// Database the points are written to.
    #[validate(length(min = 1, message = "Database name cannot be empty"))]
    pub database_name: String,
}

impl ConnectionInfo {
    /// Creates connection info without credentials.
    #[must_use]
    pub fn new(address: impl Into<String>, port: u16, database_name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port,
            username: String::new(),
            password: String::new(),
            database_name: database_name.into(),
        }
    }

    /// Sets the credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Base URL including scheme and port, without a trailing slash.
    ///
    /// # Example
    ///
    /// ```
    /// use sink::config::ConnectionInfo;
    ///
    /// let info = ConnectionInfo::new("influx.local", 8086, "logs");
    /// assert_eq!(info.base_url(), "http://influx.local:8086");
    /// ```
    #[must_use]
    pub fn base_url(&self) -> String {
        let address = self.address.trim_end_matches('/');
        if address.contains("://") {
            format!("{address}:{}", self.port)
        } else {
            format!("http://{address}:{}", self.port)
        }
    }

    /// Whether credentials should be sent.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }
}

/// Complete sink configuration.
#[derive(Clone)]
pub struct SinkConfig {
    /// Destination connection.
    pub connection: ConnectionInfo,
    /// Measurement name written on every point.
    pub source: String,
    /// Maximum events per batch.
    pub batch_size_limit: usize,
    /// Maximum time an event waits before being flushed.
    pub period: Duration,
    /// Cap on buffered events; newer events are dropped past it.
    pub queue_limit: Option<usize>,
    /// Bounded wait for the final flush on shutdown.
    pub shutdown_grace: Duration,
    /// Timeout for a single destination request.
    pub request_timeout: Duration,
    /// Value of the `appname` tag.
    pub application_name: String,
    /// Syslog facility tag and code.
    pub facility: Facility,
    /// Renders message text.
    pub format_provider: Arc<dyn FormatProvider>,
    /// Which instant the `timestamp` field carries.
    pub timestamp_field: TimestampField,
}

impl std::fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkConfig")
            .field("connection", &self.connection)
            .field("source", &self.source)
            .field("batch_size_limit", &self.batch_size_limit)
            .field("period", &self.period)
            .field("queue_limit", &self.queue_limit)
            .field("shutdown_grace", &self.shutdown_grace)
            .field("request_timeout", &self.request_timeout)
            .field("application_name", &self.application_name)
            .field("facility", &self.facility)
            .field("timestamp_field", &self.timestamp_field)
            .finish_non_exhaustive()
    }
}

impl SinkConfig {
    /// Starts a configuration builder.
    #[must_use]
    pub fn builder() -> SinkConfigBuilder {
        SinkConfigBuilder::default()
    }

    /// Loads configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `LOGFLUX_DB_ADDRESS`: Destination address (default: <http://localhost>)
    /// - `LOGFLUX_DB_PORT`: Destination port (default: 8086)
    /// - `LOGFLUX_DB_USER` / `LOGFLUX_DB_PASSWORD`: Credentials (default: none)
    /// - `LOGFLUX_DB_NAME`: Target database (default: "logs")
    /// - `LOGFLUX_SOURCE`: Measurement name (default: "syslog")
    /// - `LOGFLUX_APP_NAME`: `appname` tag (default: executable name)
    /// - `LOGFLUX_FACILITY`: Syslog facility name (default: "user")
    /// - `LOGFLUX_BATCH_SIZE`: Events per batch (default: 100)
    /// - `LOGFLUX_PERIOD_SECS`: Flush period in seconds (default: 30)
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed, or if the
    /// resulting configuration is invalid.
    pub fn from_env() -> Result<Self, SinkError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    ///
    /// [`SinkConfig::from_env`] uses the process environment.
    ///
    /// # Errors
    ///
    /// Same as [`SinkConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SinkError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port = parse_var(&lookup, "LOGFLUX_DB_PORT")?.unwrap_or(8086);
        let connection = ConnectionInfo::new(
            get("LOGFLUX_DB_ADDRESS", "http://localhost"),
            port,
            get("LOGFLUX_DB_NAME", "logs"),
        )
        .with_credentials(get("LOGFLUX_DB_USER", ""), get("LOGFLUX_DB_PASSWORD", ""));

        let mut builder = Self::builder()
            .connection(connection)
            .source(get("LOGFLUX_SOURCE", DEFAULT_SOURCE));

        if let Some(name) = lookup("LOGFLUX_APP_NAME") {
            builder = builder.application_name(name);
        }
        if let Some(facility) = lookup("LOGFLUX_FACILITY") {
            let facility = facility
                .parse::<Facility>()
                .map_err(|e| SinkError::config("LOGFLUX_FACILITY", e.to_string()))?;
            builder = builder.facility(facility);
        }
        if let Some(size) = parse_var(&lookup, "LOGFLUX_BATCH_SIZE")? {
            builder = builder.batch_size_limit(size);
        }
        if let Some(secs) = parse_var(&lookup, "LOGFLUX_PERIOD_SECS")? {
            builder = builder.period(Duration::from_secs(secs));
        }

        builder.build()
    }

    /// Batcher options derived from this configuration.
    #[must_use]
    pub fn batcher_options(&self) -> BatcherOptions {
        BatcherOptions {
            batch_size_limit: self.batch_size_limit,
            period: self.period,
            queue_limit: self.queue_limit,
            shutdown_grace: self.shutdown_grace,
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, SinkError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| SinkError::config(key, format!("cannot parse '{raw}': {e}")))
        })
        .transpose()
}

fn default_application_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "logflux".to_string())
}

/// Builder for [`SinkConfig`].
#[derive(Clone)]
pub struct SinkConfigBuilder {
    connection: Option<ConnectionInfo>,
    source: String,
    batch_size_limit: usize,
    period: Duration,
    queue_limit: Option<usize>,
    shutdown_grace: Duration,
    request_timeout: Duration,
    application_name: Option<String>,
    facility: Facility,
    format_provider: Arc<dyn FormatProvider>,
    timestamp_field: TimestampField,
}

impl Default for SinkConfigBuilder {
    fn default() -> Self {
        Self {
            connection: None,
            source: DEFAULT_SOURCE.to_string(),
            batch_size_limit: DEFAULT_BATCH_SIZE_LIMIT,
            period: DEFAULT_PERIOD,
            queue_limit: Some(DEFAULT_QUEUE_LIMIT),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            application_name: None,
            facility: Facility::default(),
            format_provider: Arc::new(InvariantFormat),
            timestamp_field: TimestampField::default(),
        }
    }
}

impl SinkConfigBuilder {
    /// Sets the destination connection (required).
    #[must_use]
    pub fn connection(mut self, connection: ConnectionInfo) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Sets the measurement name.
    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Sets the maximum number of events per batch.
    #[must_use]
    pub fn batch_size_limit(mut self, limit: usize) -> Self {
        self.batch_size_limit = limit;
        self
    }

    /// Sets the flush period.
    #[must_use]
    pub fn period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Sets the buffered event cap; `None` means unbounded.
    #[must_use]
    pub fn queue_limit(mut self, limit: Option<usize>) -> Self {
        self.queue_limit = limit;
        self
    }

    /// Sets the bounded wait for the final flush.
    #[must_use]
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Sets the destination request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the `appname` tag.
    #[must_use]
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Sets the syslog facility.
    #[must_use]
    pub fn facility(mut self, facility: Facility) -> Self {
        self.facility = facility;
        self
    }

    /// Sets the provider used to render message text.
    #[must_use]
    pub fn format_provider(mut self, provider: Arc<dyn FormatProvider>) -> Self {
        self.format_provider = provider;
        self
    }

    /// Chooses which instant the `timestamp` field carries.
    #[must_use]
    pub fn timestamp_field(mut self, timestamp_field: TimestampField) -> Self {
        self.timestamp_field = timestamp_field;
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No connection was supplied, or it fails validation
    /// - The source or application name is empty
    /// - The batch size limit, period or queue limit is zero
    pub fn build(self) -> Result<SinkConfig, SinkError> {
        let connection = self
            .connection
            .ok_or_else(|| SinkError::config("connection", "connection info is required"))?;
        connection
            .validate()
            .map_err(|e| SinkError::config("connection", e.to_string()))?;

        if self.source.is_empty() {
            return Err(SinkError::config("source", "cannot be empty"));
        }
        if self.batch_size_limit == 0 {
            return Err(SinkError::config(
                "batch_size_limit",
                "must be greater than zero",
            ));
        }
        if self.period.is_zero() {
            return Err(SinkError::config("period", "must be greater than zero"));
        }
        if self.queue_limit == Some(0) {
            return Err(SinkError::config("queue_limit", "must be greater than zero"));
        }

        let application_name = self
            .application_name
            .unwrap_or_else(default_application_name);
        if application_name.is_empty() {
            return Err(SinkError::config("application_name", "cannot be empty"));
        }

        Ok(SinkConfig {
            connection,
            source: self.source,
            batch_size_limit: self.batch_size_limit,
            period: self.period,
            queue_limit: self.queue_limit,
            shutdown_grace: self.shutdown_grace,
            request_timeout: self.request_timeout,
            application_name,
            facility: self.facility,
            format_provider: self.format_provider,
            timestamp_field: self.timestamp_field,
        })
    }
}
