//! Destination writers.
//!
//! The [`PointWriter`] trait is the only thing the sink knows about the
//! destination. Implementations must tolerate concurrent use, but the sink
//! never has more than one `write_batch` in flight.

pub mod clickhouse;
pub mod console;
pub mod influx;
pub mod line_protocol;
pub mod memory;

pub use self::clickhouse::ClickHouseWriter;
pub use console::ConsoleWriter;
pub use influx::InfluxDbWriter;
pub use memory::{MemoryWriter, WrittenBatch};

use crate::models::DataPoint;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by writers.
#[derive(Debug, Error)]
pub enum WriterError {
    /// The HTTP request could not be completed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The destination answered with a non-success status.
    #[error("Destination returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as returned by the destination.
        body: String,
    },

    /// A `ClickHouse` operation failed.
    #[error("ClickHouse error: {0}")]
    ClickHouse(#[from] ::clickhouse::error::Error),

    /// Local I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The destination rejected the request.
    #[error("Request rejected: {0}")]
    Rejected(String),
}

/// Sends points to a time-series destination.
#[async_trait]
pub trait PointWriter: Send + Sync {
    /// Creates `name` if the destination does not know it yet.
    ///
    /// Must be idempotent and must succeed when the database already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the databases cannot be listed or created.
    async fn ensure_database(&self, name: &str) -> Result<(), WriterError>;

    /// Writes all points in a single call. There is no partial success.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination did not accept the batch.
    async fn write_batch(&self, points: &[DataPoint], database: &str) -> Result<(), WriterError>;
}

#[async_trait]
impl<W: PointWriter + ?Sized> PointWriter for Arc<W> {
    async fn ensure_database(&self, name: &str) -> Result<(), WriterError> {
        (**self).ensure_database(name).await
    }

    async fn write_batch(&self, points: &[DataPoint], database: &str) -> Result<(), WriterError> {
        (**self).write_batch(points, database).await
    }
}
