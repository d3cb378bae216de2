//! Writer that prints line protocol instead of sending it anywhere.

use super::line_protocol::write_point;
use super::{PointWriter, WriterError};
use crate::models::DataPoint;
use async_trait::async_trait;
use std::io::Write;
use std::sync::Mutex;

/// Prints every batch as line protocol, one point per line.
///
/// Useful for dry runs and for piping into `influx write`.
#[derive(Debug)]
pub struct ConsoleWriter<W: Write + Send> {
    out: Mutex<W>,
}

impl ConsoleWriter<std::io::Stdout> {
    /// Writes to standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleWriter<W> {
    /// Writes to `out`.
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl<W: Write + Send> PointWriter for ConsoleWriter<W> {
    async fn ensure_database(&self, _name: &str) -> Result<(), WriterError> {
        Ok(())
    }

    async fn write_batch(&self, points: &[DataPoint], _database: &str) -> Result<(), WriterError> {
        let mut text = String::new();
        for point in points {
            write_point(&mut text, point);
            text.push('\n');
        }

        let mut out = self
            .out
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}
