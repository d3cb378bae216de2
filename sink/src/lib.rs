//! logflux sink library
//!
//! Batches structured log events and writes them to a time-series store as
//! syslog-shaped data points.
//!
//! # Modules
//!
//! - [`models`] - Log events and data points
//! - [`severity`] - Log level to syslog severity mapping, syslog facilities
//! - [`translate`] - Event to point translation and message rendering
//! - [`batching`] - Generic periodic batcher
//! - [`writer`] - Destination writers (InfluxDB, `ClickHouse`, console, memory)
//! - [`sink`] - The sink tying the pieces together
//!
//! # Example
//!
//! ```
//! use sink::models::{LogEvent, LogLevel};
//! use sink::translate::{EventTranslator, HostInfo};
//!
//! let translator = EventTranslator::new("syslog", "billing")
//!     .with_host(HostInfo::new("web-1", 4242));
//! let event = LogEvent::new(LogLevel::Error, "Payment {Id} failed")
//!     .with_property("Id", 17);
//!
//! let point = translator.translate(&event).unwrap();
//! assert_eq!(point.tag("severity"), Some("err"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod batching;
pub mod config;
pub mod error;
pub mod models;
pub mod severity;
pub mod sink;
pub mod translate;
pub mod writer;

pub use config::{ConnectionInfo, SinkConfig};
pub use error::{ErrorSink, SinkError, TracingErrorSink};
pub use sink::LogSink;

/// Re-export common dependencies for convenience.
pub use chrono;
pub use serde_json;
