//! Error types for kvunit core.

use kvunit_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in recovery unit operations.
///
/// A missing key is not an error; reads return `Ok(None)`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Store error on a read or iterator path.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The store failed to apply a commit batch.
    ///
    /// The store promises all-or-nothing batches, so a failure here means
    /// the engine is in a state this layer cannot reason about. The unit
    /// that hit it is poisoned.
    #[error("commit batch write failed: {source}")]
    CommitFailed {
        /// The store's error.
        source: StorageError,
    },

    /// The unit hit a fatal commit failure earlier and accepts no more work.
    #[error("recovery unit is poisoned by an earlier commit failure")]
    Poisoned,

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true for errors the caller must not retry or recover from.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CommitFailed { .. } | Self::Poisoned)
    }
}
