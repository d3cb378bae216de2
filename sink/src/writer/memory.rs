//! In-memory writer for tests and embedding.

use super::{PointWriter, WriterError};
use crate::models::DataPoint;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A batch as the writer received it.
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenBatch {
    /// Target database.
    pub database: String,
    /// Points in submission order.
    pub points: Vec<DataPoint>,
}

/// Keeps every written batch in memory.
///
/// Can be told to fail or to take a while, which makes it a convenient
/// stand-in for a real destination.
///
/// # Example
///
/// ```
/// use sink::writer::{MemoryWriter, PointWriter};
///
/// # #[tokio::main]
/// # async fn main() {
/// let writer = MemoryWriter::new();
/// writer.ensure_database("logs").await.unwrap();
/// assert!(writer.has_database("logs"));
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryWriter {
    batches: Mutex<Vec<WrittenBatch>>,
    databases: Mutex<BTreeSet<String>>,
    ensure_calls: AtomicUsize,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    ensure_delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes every `write_batch` sleep before completing.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *lock(&self.delay) = delay;
    }

    /// Makes every `ensure_database` sleep before completing.
    pub fn set_ensure_delay(&self, delay: Option<Duration>) {
        *lock(&self.ensure_delay) = delay;
    }

    /// All batches written so far.
    #[must_use]
    pub fn batches(&self) -> Vec<WrittenBatch> {
        lock(&self.batches).clone()
    }

    /// All points written so far, in order.
    #[must_use]
    pub fn points(&self) -> Vec<DataPoint> {
        lock(&self.batches)
            .iter()
            .flat_map(|b| b.points.iter().cloned())
            .collect()
    }

    /// Whether `ensure_database` created or saw `name`.
    #[must_use]
    pub fn has_database(&self, name: &str) -> bool {
        lock(&self.databases).contains(name)
    }

    /// Number of `ensure_database` calls.
    #[must_use]
    pub fn ensure_calls(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent `write_batch` calls observed.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn check_failing(&self) -> Result<(), WriterError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(WriterError::Rejected("memory writer set to fail".to_string()))
        } else {
            Ok(())
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PointWriter for MemoryWriter {
    async fn ensure_database(&self, name: &str) -> Result<(), WriterError> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.ensure_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_failing()?;
        lock(&self.databases).insert(name.to_string());
        Ok(())
    }

    async fn write_batch(&self, points: &[DataPoint], database: &str) -> Result<(), WriterError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.check_failing()?;
        lock(&self.batches).push(WrittenBatch {
            database: database.to_string(),
            points: points.to_vec(),
        });
        Ok(())
    }
}
