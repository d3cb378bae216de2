//! Sink error types and the diagnostic error channel.
//!
//! Producers never receive write failures. Everything that goes wrong after
//! an event has been accepted is handed to an [`ErrorSink`] instead.

use crate::translate::TranslateError;
use crate::writer::WriterError;
use thiserror::Error;

/// Errors raised by the sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Invalid or missing configuration.
    #[error("Configuration error: {field}: {reason}")]
    Config {
        /// Offending configuration key.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An event could not be turned into a point and was skipped.
    #[error(transparent)]
    Translate(#[from] TranslateError),

    /// A batch write failed; the batch was dropped.
    #[error("Batch write failed ({points} points dropped): {source}")]
    Write {
        /// Number of points in the dropped batch.
        points: usize,
        /// Underlying writer error.
        #[source]
        source: WriterError,
    },

    /// The startup database check failed.
    #[error("Database check for '{database}' failed: {source}")]
    DatabaseCheck {
        /// Database that was being checked.
        database: String,
        /// Underlying writer error.
        #[source]
        source: WriterError,
    },

    /// The final flush did not finish within the shutdown grace period.
    #[error("Shutdown flush abandoned after {0:?}")]
    ShutdownTimeout(std::time::Duration),

    /// The batch handler panicked or was cancelled; the batch was dropped.
    #[error("Batch of {items} items aborted: {reason}")]
    BatchAborted {
        /// Number of items in the dropped batch.
        items: usize,
        /// Panic message or cancellation cause.
        reason: String,
    },
}

impl SinkError {
    /// Shorthand for a configuration error.
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Receives errors that cannot be returned to the caller.
pub trait ErrorSink: Send + Sync {
    /// Reports one error.
    fn report(&self, error: &SinkError);
}

impl<F> ErrorSink for F
where
    F: Fn(&SinkError) + Send + Sync,
{
    fn report(&self, error: &SinkError) {
        self(error);
    }
}

/// Reports errors through `tracing` at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, error: &SinkError) {
        tracing::error!(error = %error, "logflux sink error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_config_error_display() {
        let err = SinkError::config("batch_size_limit", "must be greater than zero");
        let msg = err.to_string();
        assert!(msg.contains("batch_size_limit"));
        assert!(msg.contains("greater than zero"));
    }

    #[test]
    fn test_write_error_display() {
        let err = SinkError::Write {
            points: 7,
            source: WriterError::Rejected("unauthorized".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains('7'));
        assert!(msg.contains("unauthorized"));
    }

    #[test]
    fn test_closure_error_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink = move |e: &SinkError| seen_clone.lock().unwrap().push(e.to_string());

        sink.report(&SinkError::BatchAborted {
            items: 3,
            reason: "boom".to_string(),
        });

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            ["Batch of 3 items aborted: boom"]
        );
    }
}
