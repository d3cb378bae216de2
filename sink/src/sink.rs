//! The log sink: batching, translation and writing put together.

use crate::batching::{BatchHandler, BatcherState, BatcherStats, Enqueue, PeriodicBatcher};
use crate::config::SinkConfig;
use crate::error::{ErrorSink, SinkError, TracingErrorSink};
use crate::models::LogEvent;
use crate::translate::EventTranslator;
use crate::writer::PointWriter;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct WriteHandler {
    translator: EventTranslator,
    writer: Arc<dyn PointWriter>,
    database: String,
    errors: Arc<dyn ErrorSink>,
}

#[async_trait]
impl BatchHandler<LogEvent> for WriteHandler {
    async fn emit_batch(&self, batch: Vec<LogEvent>) -> Result<(), SinkError> {
        let points = self.translator.translate_all(&batch, |event, error| {
            warn!(template = %event.message_template, "Skipping event that cannot be translated");
            self.errors.report(&SinkError::Translate(error));
        });

        if points.is_empty() {
            debug!(events = batch.len(), "No points to write");
            return Ok(());
        }

        let count = points.len();
        self.writer
            .write_batch(&points, &self.database)
            .await
            .map_err(|source| SinkError::Write {
                points: count,
                source,
            })
    }
}

/// Forwards log events to a time-series destination in batches.
///
/// Creating a sink starts two background tasks: a one-off database check and
/// the batch worker. [`LogSink::emit`] never waits for the network, and
/// failures after an event was accepted go to the error sink.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use sink::config::{ConnectionInfo, SinkConfig};
/// use sink::models::{LogEvent, LogLevel};
/// use sink::writer::MemoryWriter;
/// use sink::LogSink;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), sink::error::SinkError> {
/// let config = SinkConfig::builder()
///     .connection(ConnectionInfo::new("localhost", 8086, "logs"))
///     .build()?;
/// let writer = Arc::new(MemoryWriter::new());
///
/// let sink = LogSink::new(config, writer.clone())?;
/// sink.emit(LogEvent::new(LogLevel::Info, "Started"));
/// sink.shutdown().await?;
///
/// assert_eq!(writer.points().len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct LogSink {
    batcher: PeriodicBatcher<LogEvent>,
    startup: Mutex<Option<JoinHandle<()>>>,
    database: String,
}

impl LogSink {
    /// Creates a sink that reports errors through `tracing`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Config`] if the batching limits are unusable.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(config: SinkConfig, writer: Arc<dyn PointWriter>) -> Result<Self, SinkError> {
        Self::with_error_sink(config, writer, Arc::new(TracingErrorSink))
    }

    /// Creates a sink that reports errors to `errors`.
    ///
    /// Events are accepted right away; the database check runs alongside
    /// the batch worker and does not hold back the first flush.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Config`] if the batching limits are unusable.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn with_error_sink(
        config: SinkConfig,
        writer: Arc<dyn PointWriter>,
        errors: Arc<dyn ErrorSink>,
    ) -> Result<Self, SinkError> {
        let database = config.connection.database_name.clone();

        let handler = WriteHandler {
            translator: EventTranslator::from_config(&config),
            writer: Arc::clone(&writer),
            database: database.clone(),
            errors: Arc::clone(&errors),
        };
        let batcher =
            PeriodicBatcher::new(config.batcher_options(), handler, Arc::clone(&errors))?;

        let startup = tokio::spawn(ensure_database(writer, database.clone(), errors));

        info!(
            database = %database,
            source = %config.source,
            batch_size_limit = config.batch_size_limit,
            period_secs = config.period.as_secs(),
            "Log sink started"
        );

        Ok(Self {
            batcher,
            startup: Mutex::new(Some(startup)),
            database,
        })
    }

    /// Queues an event. Returns immediately.
    pub fn emit(&self, event: LogEvent) -> Enqueue {
        self.batcher.enqueue(event)
    }

    /// Flushes everything buffered without waiting for the period.
    pub fn request_flush(&self) {
        self.batcher.request_flush();
    }

    /// Target database.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Events waiting for the next flush.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.batcher.len()
    }

    /// Current batcher state.
    #[must_use]
    pub fn state(&self) -> BatcherState {
        self.batcher.state()
    }

    /// Batcher counters.
    #[must_use]
    pub fn stats(&self) -> BatcherStats {
        self.batcher.stats()
    }

    /// Stops accepting events and writes what is buffered.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::ShutdownTimeout`] if the final flush exceeded the
    /// configured grace period.
    pub async fn shutdown(&self) -> Result<(), SinkError> {
        let startup = self
            .startup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = startup {
            if !task.is_finished() {
                debug!("Abandoning database check");
                task.abort();
            }
        }

        self.batcher.shutdown().await?;
        info!(database = %self.database, "Log sink stopped");
        Ok(())
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink")
            .field("database", &self.database)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

async fn ensure_database(writer: Arc<dyn PointWriter>, database: String, errors: Arc<dyn ErrorSink>) {
    match writer.ensure_database(&database).await {
        Ok(()) => debug!(database = %database, "Database is ready"),
        Err(source) => errors.report(&SinkError::DatabaseCheck { database, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionInfo;
    use crate::models::{FieldValue, LogLevel};
    use crate::writer::MemoryWriter;
    use std::time::Duration;

    fn config(batch_size_limit: usize) -> SinkConfig {
        SinkConfig::builder()
            .connection(ConnectionInfo::new("localhost", 8086, "logs"))
            .application_name("billing")
            .batch_size_limit(batch_size_limit)
            .period(Duration::from_secs(10))
            .build()
            .unwrap()
    }

    fn collecting() -> (Arc<Mutex<Vec<String>>>, Arc<dyn ErrorSink>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let errors: Arc<dyn ErrorSink> =
            Arc::new(move |e: &SinkError| seen_clone.lock().unwrap().push(e.to_string()));
        (seen, errors)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_database_checked_on_start() {
        let writer = Arc::new(MemoryWriter::new());
        let sink = LogSink::new(config(10), writer.clone()).unwrap();
        settle().await;

        assert!(writer.has_database("logs"));
        assert_eq!(writer.ensure_calls(), 1);
        sink.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_database_check_failure_is_reported() {
        let writer = Arc::new(MemoryWriter::new());
        writer.set_failing(true);
        let (seen, errors) = collecting();

        let sink = LogSink::with_error_sink(config(10), writer.clone(), errors).unwrap();
        settle().await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("Database check for 'logs' failed"));
        drop(sink);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_written_when_full() {
        let writer = Arc::new(MemoryWriter::new());
        let sink = LogSink::new(config(2), writer.clone()).unwrap();

        sink.emit(LogEvent::new(LogLevel::Info, "one"));
        sink.emit(LogEvent::new(LogLevel::Warn, "two"));
        settle().await;

        let batches = writer.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].database, "logs");
        let codes: Vec<_> = batches[0]
            .points
            .iter()
            .map(|p| p.field("severity_code").cloned())
            .collect();
        assert_eq!(
            codes,
            vec![Some(FieldValue::Integer(5)), Some(FieldValue::Integer(4))]
        );
        assert_eq!(sink.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_untranslatable_event_is_skipped() {
        let writer = Arc::new(MemoryWriter::new());
        let (seen, errors) = collecting();
        let sink = LogSink::with_error_sink(config(2), writer.clone(), errors).unwrap();

        sink.emit(LogEvent::new(LogLevel::Info, "bad").with_property("", 1));
        sink.emit(LogEvent::new(LogLevel::Info, "good"));
        settle().await;

        let points = writer.points();
        assert_eq!(points.len(), 1);
        assert_eq!(
            points[0].field("message"),
            Some(&FieldValue::String("good".to_string()))
        );
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_of_only_bad_events_writes_nothing() {
        let writer = Arc::new(MemoryWriter::new());
        let (_seen, errors) = collecting();
        let sink = LogSink::with_error_sink(config(1), writer.clone(), errors).unwrap();

        sink.emit(LogEvent::new(LogLevel::Info, "bad").with_property("", 1));
        settle().await;

        assert!(writer.batches().is_empty());
        assert_eq!(sink.stats().batches_failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_reported_and_batch_dropped() {
        let writer = Arc::new(MemoryWriter::new());
        let (seen, errors) = collecting();
        let sink = LogSink::with_error_sink(config(1), writer.clone(), errors).unwrap();
        settle().await;
        writer.set_failing(true);

        assert_eq!(sink.emit(LogEvent::new(LogLevel::Error, "lost")), Enqueue::Accepted);
        settle().await;

        assert!(writer.batches().is_empty());
        assert_eq!(sink.pending(), 0);
        assert_eq!(sink.stats().batches_failed, 1);
        assert!(seen.lock().unwrap()[0].contains("1 points dropped"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_and_closes() {
        let writer = Arc::new(MemoryWriter::new());
        let sink = LogSink::new(config(100), writer.clone()).unwrap();

        sink.emit(LogEvent::new(LogLevel::Debug, "pending"));
        sink.shutdown().await.unwrap();

        assert_eq!(writer.points().len(), 1);
        assert_eq!(sink.emit(LogEvent::new(LogLevel::Info, "late")), Enqueue::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emit_accepted_while_database_check_pending() {
        let writer = Arc::new(MemoryWriter::new());
        writer.set_ensure_delay(Some(Duration::from_secs(60)));
        let sink = LogSink::new(config(2), writer.clone()).unwrap();

        assert_eq!(sink.emit(LogEvent::new(LogLevel::Info, "one")), Enqueue::Accepted);
        assert_eq!(sink.emit(LogEvent::new(LogLevel::Info, "two")), Enqueue::Accepted);
        sink.emit(LogEvent::new(LogLevel::Info, "three"));
        settle().await;

        // The first batch went out before the check finished.
        assert!(!writer.has_database("logs"));
        assert_eq!(writer.ensure_calls(), 1);
        assert_eq!(writer.points().len(), 2);
        assert_eq!(sink.pending(), 1);

        sink.shutdown().await.unwrap();
        assert_eq!(writer.points().len(), 3);
        assert!(!writer.has_database("logs"));
    }

    #[tokio::test]
    async fn test_invalid_batching_limits_rejected() {
        let mut config = config(10);
        config.batch_size_limit = 0;
        let writer = Arc::new(MemoryWriter::new());

        let err = LogSink::new(config, writer.clone()).unwrap_err();

        assert!(matches!(err, SinkError::Config { .. }));
        tokio::task::yield_now().await;
        assert_eq!(writer.ensure_calls(), 0);
    }
}
