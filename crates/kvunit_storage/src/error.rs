//! Error types for storage operations.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The namespace has not been created in this store.
    #[error("unknown namespace: {name}")]
    UnknownNamespace {
        /// The namespace that was looked up.
        name: String,
    },

    /// The snapshot was never handed out or has already been released.
    #[error("snapshot {id} is not live")]
    SnapshotNotLive {
        /// The snapshot identifier.
        id: u64,
    },

    /// The store refused to apply a write batch.
    #[error("write rejected: {reason}")]
    WriteRejected {
        /// Why the batch was rejected.
        reason: String,
    },

    /// The store is closed.
    #[error("store is closed")]
    Closed,
}

impl StorageError {
    /// Creates an unknown namespace error.
    pub fn unknown_namespace(name: impl Into<String>) -> Self {
        Self::UnknownNamespace { name: name.into() }
    }

    /// Creates a write rejected error.
    pub fn write_rejected(reason: impl Into<String>) -> Self {
        Self::WriteRejected {
            reason: reason.into(),
        }
    }
}
