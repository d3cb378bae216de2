//! Generic periodic batching.
//!
//! [`PeriodicBatcher`] buffers items of any type and hands them to a
//! [`BatchHandler`] in batches. A batch is flushed when the buffer reaches
//! `batch_size_limit` items or when `period` elapses, whichever comes first.
//!
//! A single background task owns every flush, so at most one batch is in
//! flight. Producers only take a short-held mutex to append; they never wait
//! on the handler.
//!
//! ```text
//!  enqueue ──> [ buffer ] ──(size or timer)──> worker ──> BatchHandler::emit_batch
//!   (any thread)   mutex                     one task      (network I/O)
//! ```

use crate::error::{ErrorSink, SinkError};
use async_trait::async_trait;
use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Receives flushed batches.
#[async_trait]
pub trait BatchHandler<T>: Send + Sync + 'static {
    /// Emits one batch. Items arrive in submission order.
    ///
    /// # Errors
    ///
    /// A returned error is reported to the batcher's error sink and the batch
    /// is dropped.
    async fn emit_batch(&self, batch: Vec<T>) -> Result<(), SinkError>;
}

/// Batching limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatcherOptions {
    /// Maximum items per batch; reaching it triggers a flush.
    pub batch_size_limit: usize,
    /// Maximum time between flushes.
    pub period: Duration,
    /// Cap on buffered items; `None` means unbounded.
    pub queue_limit: Option<usize>,
    /// Bounded wait for the final flush on shutdown.
    pub shutdown_grace: Duration,
}

impl BatcherOptions {
    /// Checks that every limit is usable.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Config`] if the batch size limit, the period or
    /// the queue limit is zero.
    pub fn validate(&self) -> Result<(), SinkError> {
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
        Ok(())
    }
}

impl Default for BatcherOptions {
    fn default() -> Self {
        Self {
            batch_size_limit: crate::config::DEFAULT_BATCH_SIZE_LIMIT,
            period: crate::config::DEFAULT_PERIOD,
            queue_limit: Some(crate::config::DEFAULT_QUEUE_LIMIT),
            shutdown_grace: crate::config::DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// Observable state of the batcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatcherState {
    /// Nothing buffered, no flush running.
    Idle,
    /// Items buffered, no flush running.
    Accumulating,
    /// A batch is being handed to the handler.
    Flushing,
}

/// Outcome of [`PeriodicBatcher::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    /// The item was buffered.
    Accepted,
    /// The queue limit was reached and the item was discarded.
    Dropped,
    /// The batcher is shut down.
    Closed,
}

/// Counters describing what the batcher has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatcherStats {
    /// Items accepted by `enqueue`.
    pub enqueued: u64,
    /// Items discarded because the queue limit was reached.
    pub dropped: u64,
    /// Batches the handler accepted.
    pub batches_written: u64,
    /// Batches the handler rejected.
    pub batches_failed: u64,
    /// Items in accepted batches.
    pub items_written: u64,
    /// Items in rejected batches.
    pub items_failed: u64,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    batches_written: AtomicU64,
    batches_failed: AtomicU64,
    items_written: AtomicU64,
    items_failed: AtomicU64,
}

struct Buffer<T> {
    items: VecDeque<T>,
    closed: bool,
}

struct Shared<T> {
    buffer: Mutex<Buffer<T>>,
    wake: Notify,
    drain_requested: AtomicBool,
    flushing: AtomicBool,
    counters: Counters,
    options: BatcherOptions,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the in-progress flag even if the flush future is dropped.
struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop<R>(JoinHandle<R>);

impl<R> Drop for AbortOnDrop<R> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string())
}

/// Runs one `emit_batch` on its own task so that a panicking handler only
/// loses its batch and the worker keeps running.
async fn emit_isolated<T, H>(handler: &Arc<H>, batch: Vec<T>) -> Result<(), SinkError>
where
    T: Send + 'static,
    H: BatchHandler<T>,
{
    let items = batch.len();
    let handler = Arc::clone(handler);
    let mut task = AbortOnDrop(tokio::spawn(async move { handler.emit_batch(batch).await }));

    match (&mut task.0).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(SinkError::BatchAborted {
            items,
            reason: panic_message(e.into_panic().as_ref()),
        }),
        Err(e) => Err(SinkError::BatchAborted {
            items,
            reason: e.to_string(),
        }),
    }
}

fn as_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

impl<T: Send + 'static> Shared<T> {
    /// Flushes buffered items.
    ///
    /// With `drain_all` every item present when the flush starts is emitted,
    /// in chunks of at most `batch_size_limit`. Otherwise only full batches
    /// are emitted. A call made while another flush runs is a no-op.
    async fn flush<H: BatchHandler<T>>(
        &self,
        handler: &Arc<H>,
        errors: &dyn ErrorSink,
        drain_all: bool,
    ) {
        if self.flushing.swap(true, Ordering::AcqRel) {
            debug!("Flush already in progress, skipping");
            return;
        }
        let _guard = FlushGuard(&self.flushing);

        let limit = self.options.batch_size_limit;
        let mut budget = if drain_all {
            lock(&self.buffer).items.len()
        } else {
            usize::MAX
        };

        loop {
            let batch: Vec<T> = {
                let mut buffer = lock(&self.buffer);
                let available = buffer.items.len().min(budget);
                if available == 0 || (!drain_all && available < limit) {
                    break;
                }
                let take = available.min(limit);
                let drained: Vec<T> = buffer.items.drain(..take).collect();
                drained
            };
            budget = budget.saturating_sub(batch.len());

            let size = batch.len();
            debug!(size, "Flushing batch");
            match emit_isolated(handler, batch).await {
                Ok(()) => {
                    self.counters.batches_written.fetch_add(1, Ordering::Relaxed);
                    self.counters
                        .items_written
                        .fetch_add(as_u64(size), Ordering::Relaxed);
                }
                Err(e) => {
                    self.counters.batches_failed.fetch_add(1, Ordering::Relaxed);
                    self.counters
                        .items_failed
                        .fetch_add(as_u64(size), Ordering::Relaxed);
                    errors.report(&e);
                }
            }
        }
    }

    fn close(&self) {
        lock(&self.buffer).closed = true;
    }
}

/// Buffers items and flushes them periodically or when a batch fills up.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use sink::batching::{BatchHandler, BatcherOptions, Enqueue, PeriodicBatcher};
/// use sink::error::{SinkError, TracingErrorSink};
/// use std::sync::Arc;
///
/// struct Print;
///
/// #[async_trait]
/// impl BatchHandler<String> for Print {
///     async fn emit_batch(&self, batch: Vec<String>) -> Result<(), SinkError> {
///         println!("{batch:?}");
///         Ok(())
///     }
/// }
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), SinkError> {
/// let batcher =
///     PeriodicBatcher::new(BatcherOptions::default(), Print, Arc::new(TracingErrorSink))?;
/// assert_eq!(batcher.enqueue("hello".to_string()), Enqueue::Accepted);
/// batcher.shutdown().await?;
/// # Ok::<(), SinkError>(())
/// # }
/// ```
pub struct PeriodicBatcher<T> {
    shared: Arc<Shared<T>>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> PeriodicBatcher<T> {
    /// Creates the batcher and spawns its worker task.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Config`] if `options` fails
    /// [`BatcherOptions::validate`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new<H>(
        options: BatcherOptions,
        handler: H,
        errors: Arc<dyn ErrorSink>,
    ) -> Result<Self, SinkError>
    where
        H: BatchHandler<T>,
    {
        options.validate()?;

        let shared = Arc::new(Shared {
            buffer: Mutex::new(Buffer {
                items: VecDeque::new(),
                closed: false,
            }),
            wake: Notify::new(),
            drain_requested: AtomicBool::new(false),
            flushing: AtomicBool::new(false),
            counters: Counters::default(),
            options,
        });
        let cancel = CancellationToken::new();

        let worker = tokio::spawn(run_worker(
            Arc::clone(&shared),
            Arc::new(handler),
            errors,
            cancel.clone(),
        ));

        Ok(Self {
            shared,
            cancel,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Appends an item to the current batch without blocking on I/O.
    ///
    /// Wakes the worker when the batch size limit is reached.
    pub fn enqueue(&self, item: T) -> Enqueue {
        let options = &self.shared.options;
        let mut buffer = lock(&self.shared.buffer);
        if buffer.closed {
            return Enqueue::Closed;
        }
        if let Some(limit) = options.queue_limit {
            if buffer.items.len() >= limit {
                drop(buffer);
                let dropped = self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped, queue_limit = limit, "Queue full, dropped newest item");
                return Enqueue::Dropped;
            }
        }
        buffer.items.push_back(item);
        let batch_ready = buffer.items.len() >= options.batch_size_limit;
        drop(buffer);

        self.shared.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        if batch_ready {
            self.shared.wake.notify_one();
        }
        Enqueue::Accepted
    }

    /// Asks the worker to flush everything buffered now.
    ///
    /// Returns immediately; the flush happens on the worker task.
    pub fn request_flush(&self) {
        self.shared.drain_requested.store(true, Ordering::Release);
        self.shared.wake.notify_one();
    }

    /// Number of buffered items.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.shared.buffer).items.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> BatcherState {
        if self.shared.flushing.load(Ordering::Acquire) {
            BatcherState::Flushing
        } else if self.is_empty() {
            BatcherState::Idle
        } else {
            BatcherState::Accumulating
        }
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> BatcherStats {
        let c = &self.shared.counters;
        BatcherStats {
            enqueued: c.enqueued.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            batches_written: c.batches_written.load(Ordering::Relaxed),
            batches_failed: c.batches_failed.load(Ordering::Relaxed),
            items_written: c.items_written.load(Ordering::Relaxed),
            items_failed: c.items_failed.load(Ordering::Relaxed),
        }
    }

    /// Limits this batcher was created with.
    #[must_use]
    pub fn options(&self) -> &BatcherOptions {
        &self.shared.options
    }

    /// Stops accepting items, flushes what is buffered and stops the worker.
    ///
    /// Waits at most `shutdown_grace`; after that the final flush is
    /// abandoned and its items are lost. Calling this twice is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::ShutdownTimeout`] if the final flush did not
    /// finish in time.
    pub async fn shutdown(&self) -> Result<(), SinkError> {
        self.shared.close();
        self.cancel.cancel();

        let Some(mut worker) = lock(&self.worker).take() else {
            return Ok(());
        };

        let grace = self.shared.options.shutdown_grace;
        match tokio::time::timeout(grace, &mut worker).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!(error = %e, "Batcher worker ended abnormally");
                Ok(())
            }
            Err(_) => {
                worker.abort();
                Err(SinkError::ShutdownTimeout(grace))
            }
        }
    }
}

impl<T> Drop for PeriodicBatcher<T> {
    fn drop(&mut self) {
        // The worker performs its final flush on its own.
        self.cancel.cancel();
    }
}

async fn run_worker<T, H>(
    shared: Arc<Shared<T>>,
    handler: Arc<H>,
    errors: Arc<dyn ErrorSink>,
    cancel: CancellationToken,
) where
    T: Send + 'static,
    H: BatchHandler<T>,
{
    let period = shared.options.period;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    debug!(
        batch_size_limit = shared.options.batch_size_limit,
        period_ms = period.as_millis(),
        "Batcher worker started"
    );

    loop {
        let drain_all = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => true,
            () = shared.wake.notified() => shared.drain_requested.swap(false, Ordering::AcqRel),
        };

        shared.flush(&handler, errors.as_ref(), drain_all).await;
        ticker.reset();
    }

    shared.close();
    let remaining = lock(&shared.buffer).items.len();
    if remaining > 0 {
        info!(count = remaining, "Flushing remaining items before shutdown");
    }
    shared.flush(&handler, errors.as_ref(), true).await;
    debug!("Batcher worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Recorder {
        batches: Mutex<Vec<Vec<u32>>>,
        delay: Option<Duration>,
        fail: AtomicBool,
        panic_on: Option<u32>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl Recorder {
        fn batches(&self) -> Vec<Vec<u32>> {
            self.batches.lock().unwrap().clone()
        }
    }

    struct Handler(Arc<Recorder>);

    #[async_trait]
    impl BatchHandler<u32> for Handler {
        async fn emit_batch(&self, batch: Vec<u32>) -> Result<(), SinkError> {
            if let Some(item) = self.0.panic_on {
                assert!(!batch.contains(&item), "cannot emit item {item}");
            }
            let now = self.0.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.0.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.0.delay {
                tokio::time::sleep(delay).await;
            }
            self.0.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.0.fail.load(Ordering::SeqCst) {
                return Err(SinkError::config("handler", "rejected batch"));
            }
            self.0.batches.lock().unwrap().push(batch);
            Ok(())
        }
    }

    fn options(batch_size_limit: usize, period: Duration) -> BatcherOptions {
        BatcherOptions {
            batch_size_limit,
            period,
            queue_limit: None,
            shutdown_grace: Duration::from_secs(5),
        }
    }

    fn batcher(opts: BatcherOptions, recorder: &Arc<Recorder>) -> PeriodicBatcher<u32> {
        PeriodicBatcher::new(
            opts,
            Handler(Arc::clone(recorder)),
            Arc::new(crate::error::TracingErrorSink),
        )
        .unwrap()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_below_limit_does_not_flush() {
        let recorder = Arc::new(Recorder::default());
        let b = batcher(options(10, Duration::from_secs(30)), &recorder);

        for i in 0..9 {
            assert_eq!(b.enqueue(i), Enqueue::Accepted);
        }
        settle().await;

        assert!(recorder.batches().is_empty());
        assert_eq!(b.len(), 9);
        assert_eq!(b.state(), BatcherState::Accumulating);
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_limit_triggers_flush_in_order() {
        let recorder = Arc::new(Recorder::default());
        let b = batcher(options(3, Duration::from_secs(30)), &recorder);

        for i in 0..4 {
            b.enqueue(i);
        }
        settle().await;

        assert_eq!(recorder.batches(), vec![vec![0, 1, 2]]);
        assert_eq!(b.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_flush_drains_every_full_batch() {
        let recorder = Arc::new(Recorder::default());
        let b = batcher(options(2, Duration::from_secs(30)), &recorder);

        for i in 0..5 {
            b.enqueue(i);
        }
        settle().await;

        assert_eq!(recorder.batches(), vec![vec![0, 1], vec![2, 3]]);
        assert_eq!(b.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_period_flushes_partial_batch_once() {
        let recorder = Arc::new(Recorder::default());
        let b = batcher(options(100, Duration::from_secs(30)), &recorder);

        for i in 0..3 {
            b.enqueue(i);
        }
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(recorder.batches(), vec![vec![0, 1, 2]]);
        assert_eq!(b.state(), BatcherState::Idle);

        // An empty buffer never produces an empty batch.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(recorder.batches().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_concurrent_flushes() {
        let recorder = Arc::new(Recorder {
            delay: Some(Duration::from_millis(100)),
            ..Recorder::default()
        });
        let b = batcher(options(1, Duration::from_millis(10)), &recorder);

        for i in 0..5 {
            b.enqueue(i);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(recorder.max_in_flight.load(Ordering::SeqCst), 1);
        let flushed: Vec<u32> = recorder.batches().into_iter().flatten().collect();
        assert_eq!(flushed, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_items_enqueued_during_flush_go_to_next_batch() {
        let recorder = Arc::new(Recorder {
            delay: Some(Duration::from_millis(100)),
            ..Recorder::default()
        });
        let b = batcher(options(2, Duration::from_secs(30)), &recorder);

        b.enqueue(1);
        b.enqueue(2);
        settle().await;
        assert_eq!(b.state(), BatcherState::Flushing);

        b.enqueue(3);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(recorder.batches(), vec![vec![1, 2]]);
        assert_eq!(b.len(), 1);
        assert_eq!(b.state(), BatcherState::Accumulating);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_is_dropped_and_counted() {
        let recorder = Arc::new(Recorder::default());
        recorder.fail.store(true, Ordering::SeqCst);
        let b = batcher(options(2, Duration::from_secs(30)), &recorder);

        b.enqueue(1);
        b.enqueue(2);
        settle().await;

        let stats = b.stats();
        assert_eq!(stats.batches_failed, 1);
        assert_eq!(stats.items_failed, 2);
        assert!(b.is_empty());

        recorder.fail.store(false, Ordering::SeqCst);
        b.enqueue(3);
        b.enqueue(4);
        settle().await;

        assert_eq!(recorder.batches(), vec![vec![3, 4]]);
        assert_eq!(b.stats().batches_written, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_limit_drops_newest() {
        let recorder = Arc::new(Recorder::default());
        let mut opts = options(100, Duration::from_secs(30));
        opts.queue_limit = Some(2);
        let b = batcher(opts, &recorder);

        assert_eq!(b.enqueue(1), Enqueue::Accepted);
        assert_eq!(b.enqueue(2), Enqueue::Accepted);
        assert_eq!(b.enqueue(3), Enqueue::Dropped);

        let stats = b.stats();
        assert_eq!(stats.enqueued, 2);
        assert_eq!(stats.dropped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_flush_drains_everything() {
        let recorder = Arc::new(Recorder::default());
        let b = batcher(options(2, Duration::from_secs(30)), &recorder);

        b.enqueue(1);
        b.request_flush();
        settle().await;

        assert_eq!(recorder.batches(), vec![vec![1]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_and_closes() {
        let recorder = Arc::new(Recorder::default());
        let b = batcher(options(10, Duration::from_secs(30)), &recorder);

        b.enqueue(1);
        b.enqueue(2);
        b.shutdown().await.unwrap();

        assert_eq!(recorder.batches(), vec![vec![1, 2]]);
        assert_eq!(b.enqueue(3), Enqueue::Closed);
        // Second call is a no-op.
        b.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_gives_up_after_grace() {
        let recorder = Arc::new(Recorder {
            delay: Some(Duration::from_secs(60)),
            ..Recorder::default()
        });
        let mut opts = options(10, Duration::from_secs(30));
        opts.shutdown_grace = Duration::from_secs(1);
        let b = batcher(opts, &recorder);

        b.enqueue(1);
        let result = b.shutdown().await;

        assert!(matches!(result, Err(SinkError::ShutdownTimeout(_))));
        assert!(recorder.batches().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_handler_loses_only_its_batch() {
        let recorder = Arc::new(Recorder {
            panic_on: Some(1),
            ..Recorder::default()
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let errors: Arc<dyn ErrorSink> =
            Arc::new(move |e: &SinkError| seen_clone.lock().unwrap().push(e.to_string()));
        let b = PeriodicBatcher::new(
            options(2, Duration::from_secs(30)),
            Handler(Arc::clone(&recorder)),
            errors,
        )
        .unwrap();

        b.enqueue(1);
        b.enqueue(2);
        settle().await;

        let stats = b.stats();
        assert_eq!(stats.batches_failed, 1);
        assert_eq!(stats.items_failed, 2);
        {
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 1);
            assert!(seen[0].contains("cannot emit item 1"), "{}", seen[0]);
        }

        // The worker is still alive.
        b.enqueue(3);
        b.enqueue(4);
        settle().await;
        assert_eq!(recorder.batches(), vec![vec![3, 4]]);

        b.enqueue(5);
        b.shutdown().await.unwrap();
        assert_eq!(recorder.batches(), vec![vec![3, 4], vec![5]]);
    }

    #[test]
    fn test_default_options_are_valid() {
        assert!(BatcherOptions::default().validate().is_ok());
        assert!(options(1, Duration::from_nanos(1)).validate().is_ok());
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        let err = options(0, Duration::from_secs(1)).validate().unwrap_err();
        assert!(matches!(err, SinkError::Config { ref field, .. } if field == "batch_size_limit"));

        let err = options(1, Duration::ZERO).validate().unwrap_err();
        assert!(matches!(err, SinkError::Config { ref field, .. } if field == "period"));

        let mut opts = options(1, Duration::from_secs(1));
        opts.queue_limit = Some(0);
        let err = opts.validate().unwrap_err();
        assert!(matches!(err, SinkError::Config { ref field, .. } if field == "queue_limit"));
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_options() {
        let recorder = Arc::new(Recorder::default());
        let result = PeriodicBatcher::<u32>::new(
            options(0, Duration::from_secs(1)),
            Handler(Arc::clone(&recorder)),
            Arc::new(crate::error::TracingErrorSink),
        );
        assert!(result.is_err());

        let result = PeriodicBatcher::<u32>::new(
            options(1, Duration::ZERO),
            Handler(recorder),
            Arc::new(crate::error::TracingErrorSink),
        );
        assert!(result.is_err());
    }
}
