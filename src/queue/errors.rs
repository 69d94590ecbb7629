//! Async Update Queue Error Types

use std::fmt;

/// Queue error type.
#[derive(Debug, Clone)]
pub struct QueueError {
    /// Error kind
    pub kind: QueueErrorKind,
    /// Error message
    pub message: String,
}

/// Queue error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueErrorKind {
    /// Bounded-memory ceiling reached. The caller must take policy
    /// action (forced full resync), the queue never grows unbounded.
    Full,

    /// A sequence number moved backward. Unrecoverable internal error.
    SequenceRegression,
}

impl QueueError {
    /// Create a new queue error.
    pub fn new(kind: QueueErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a queue-full error.
    pub fn full(message: impl Into<String>) -> Self {
        Self::new(QueueErrorKind::Full, message)
    }

    /// Create a sequence-regression error.
    pub fn sequence_regression(message: impl Into<String>) -> Self {
        Self::new(QueueErrorKind::SequenceRegression, message)
    }

    /// Whether this error requires a process restart rather than a resync.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, QueueErrorKind::SequenceRegression)
    }
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueueError({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for QueueError {}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;
