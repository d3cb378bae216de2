//! Event to point translation.
//!
//! [`EventTranslator`] turns one [`LogEvent`] into one [`DataPoint`] using the
//! syslog measurement layout:
//!
//! | kind  | keys |
//! |-------|------|
//! | tags  | `appname`, `facility`, `host`, `hostname`, `severity`, optional `exceptionType` |
//! | fields| every event property, then `facility_code`, `message`, `procid`, `severity_code`, `timestamp`, `version` |
//!
//! The fixed fields are written after the properties, so a property named
//! like a fixed field is overwritten.

pub mod host;
pub mod render;

pub use host::HostInfo;
pub use render::{render, FormatProvider, InvariantFormat, LocaleFormat};

use crate::config::SinkConfig;
use crate::models::{DataPoint, FieldValue, LogEvent, PointError};
use crate::severity::{map_level, Facility};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Schema version written in the `version` field.
pub const SCHEMA_VERSION: i64 = 1;

/// Which instant the `timestamp` field carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampField {
    /// The moment the event is translated (during the flush).
    #[default]
    Processing,
    /// The event's own timestamp.
    Event,
}

/// Errors that can occur while translating an event.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// The resulting point would violate the point invariants.
    #[error("Invalid point for event '{template}': {source}")]
    InvalidPoint {
        /// Message template of the offending event.
        template: String,
        /// Underlying point error.
        #[source]
        source: PointError,
    },
}

/// Converts log events into syslog-shaped data points.
#[derive(Clone)]
pub struct EventTranslator {
    source: String,
    application_name: String,
    facility: Facility,
    host: HostInfo,
    format_provider: Arc<dyn FormatProvider>,
    timestamp_field: TimestampField,
}

impl std::fmt::Debug for EventTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventTranslator")
            .field("source", &self.source)
            .field("application_name", &self.application_name)
            .field("facility", &self.facility)
            .field("host", &self.host)
            .field("timestamp_field", &self.timestamp_field)
            .finish_non_exhaustive()
    }
}

impl EventTranslator {
    /// Creates a translator writing to measurement `source`.
    ///
    /// Host information is resolved here, once.
    #[must_use]
    pub fn new(source: impl Into<String>, application_name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            application_name: application_name.into(),
            facility: Facility::default(),
            host: HostInfo::resolve(),
            format_provider: Arc::new(InvariantFormat),
            timestamp_field: TimestampField::default(),
        }
    }

    /// Creates a translator from sink configuration.
    #[must_use]
    pub fn from_config(config: &SinkConfig) -> Self {
        Self::new(&config.source, &config.application_name)
            .with_facility(config.facility)
            .with_format_provider(Arc::clone(&config.format_provider))
            .with_timestamp_field(config.timestamp_field)
    }

    /// Sets the facility tag and code.
    #[must_use]
    pub fn with_facility(mut self, facility: Facility) -> Self {
        self.facility = facility;
        self
    }

    /// Overrides the resolved host information.
    #[must_use]
    pub fn with_host(mut self, host: HostInfo) -> Self {
        self.host = host;
        self
    }

    /// Sets the provider used to render message text.
    #[must_use]
    pub fn with_format_provider(mut self, provider: Arc<dyn FormatProvider>) -> Self {
        self.format_provider = provider;
        self
    }

    /// Chooses which instant the `timestamp` field carries.
    #[must_use]
    pub fn with_timestamp_field(mut self, timestamp_field: TimestampField) -> Self {
        self.timestamp_field = timestamp_field;
        self
    }

    /// Host information stamped on every point.
    #[must_use]
    pub fn host(&self) -> &HostInfo {
        &self.host
    }

    /// Translates one event.
    ///
    /// # Errors
    ///
    /// Returns an error if a property has an empty key or a non-finite
    /// float value, or if a timestamp falls outside the nanosecond range
    /// (roughly 1677 to 2262).
    pub fn translate(&self, event: &LogEvent) -> Result<DataPoint, TranslateError> {
        let severity = map_level(event.level);
        let message = render(
            &event.message_template,
            &event.properties,
            self.format_provider.as_ref(),
        );
        let invalid = |source| TranslateError::InvalidPoint {
            template: event.message_template.clone(),
            source,
        };
        let stamp = match self.timestamp_field {
            TimestampField::Processing => Utc::now(),
            TimestampField::Event => event.timestamp,
        };
        let timestamp_nanos = stamp
            .timestamp_nanos_opt()
            .ok_or_else(|| invalid(PointError::TimestampOutOfRange(stamp)))?;

        let mut builder = DataPoint::builder(&self.source).timestamp(event.timestamp);

        for (key, value) in &event.properties {
            builder = builder.field(key, FieldValue::from_json(value));
        }

        if let Some(error) = &event.error {
            builder = builder.tag("exceptionType", &error.type_name);
        }

        builder
            .tag("appname", &self.application_name)
            .tag("facility", self.facility.name())
            .tag("host", &self.host.hostname)
            .tag("hostname", &self.host.hostname)
            .tag("severity", severity.name())
            .field("facility_code", self.facility.code())
            .field("message", message)
            .field("procid", self.host.process_id.to_string())
            .field("severity_code", severity.code())
            .field("timestamp", timestamp_nanos)
            .field("version", SCHEMA_VERSION)
            .build()
            .map_err(invalid)
    }

    /// Translates a slice of events, skipping the ones that fail.
    ///
    /// `on_error` is called for each skipped event. Submission order is kept.
    pub fn translate_all<F>(&self, events: &[LogEvent], mut on_error: F) -> Vec<DataPoint>
    where
        F: FnMut(&LogEvent, TranslateError),
    {
        let mut points = Vec::with_capacity(events.len());
        for event in events {
            match self.translate(event) {
                Ok(point) => points.push(point),
                Err(e) => on_error(event, e),
            }
        }
        points
    }
}
