//! Log event model.
//!
//! Defines the `LogEvent` structure handed to the sink by producers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Log level of an application event.
///
/// Ordered from least to most severe, so `LogLevel::Warn < LogLevel::Error`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Detailed tracing information.
    #[serde(alias = "verbose")]
    Trace,
    /// Debug information.
    Debug,
    /// Informational messages.
    #[serde(alias = "information")]
    #[default]
    Info,
    /// Warning conditions.
    #[serde(alias = "warning")]
    Warn,
    /// Error conditions.
    Error,
    /// Critical/fatal conditions.
    #[serde(alias = "critical")]
    Fatal,
}

impl LogLevel {
    /// Every level, in ascending order.
    pub const ALL: [LogLevel; 6] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Fatal,
    ];
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Error attached to a log event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Type name of the error, e.g. `std::io::Error`.
    pub type_name: String,

    /// Rendered error message.
    #[serde(default)]
    pub message: String,
}

impl ErrorInfo {
    /// Captures the type name and display text of an error value.
    #[must_use]
    pub fn from_error<E: std::error::Error>(error: &E) -> Self {
        Self {
            type_name: std::any::type_name::<E>().to_string(),
            message: error.to_string(),
        }
    }
}

/// A single structured log event.
///
/// The message is kept as a template (`"User {userId} logged in"`) and is
/// rendered against `properties` when the event is translated.
///
/// # Example
///
/// ```
/// use sink::models::{LogEvent, LogLevel};
///
/// let event = LogEvent::new(LogLevel::Info, "User {userId} logged in")
///     .with_property("userId", 42);
///
/// assert_eq!(event.properties.get("userId"), Some(&serde_json::json!(42)));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    /// When the event was emitted.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Severity level of the event.
    #[serde(default)]
    pub level: LogLevel,

    /// Message template, rendered with `properties`.
    #[serde(alias = "message")]
    pub message_template: String,

    /// Structured properties captured with the event.
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,

    /// Optional error associated with the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl LogEvent {
    /// Creates a new event stamped with the current time.
    #[must_use]
    pub fn new(level: LogLevel, message_template: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message_template: message_template.into(),
            properties: BTreeMap::new(),
            error: None,
        }
    }

    /// Adds a property. Values that fail to serialize are stored as `null`.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.properties.insert(
            key.into(),
            serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
        );
        self
    }

    /// Attaches an error to the event.
    #[must_use]
    pub fn with_error(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }

    /// Overrides the event timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
