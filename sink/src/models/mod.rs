//! Data models for logflux.
//!
//! `LogEvent` is what producers emit; `DataPoint` is what gets written.

pub mod event;
pub mod point;

pub use event::{ErrorInfo, LogEvent, LogLevel};
pub use point::{DataPoint, DataPointBuilder, FieldValue, PointError};
