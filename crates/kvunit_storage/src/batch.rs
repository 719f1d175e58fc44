//! Atomic write batches.

use crate::namespace::Namespace;

/// A single operation in a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Insert or overwrite a key.
    Put {
        /// Target namespace.
        namespace: Namespace,
        /// Key bytes.
        key: Vec<u8>,
        /// Value bytes.
        value: Vec<u8>,
    },
    /// Remove a key.
    Delete {
        /// Target namespace.
        namespace: Namespace,
        /// Key bytes.
        key: Vec<u8>,
    },
}

impl BatchOp {
    /// Returns the namespace this operation targets.
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        match self {
            Self::Put { namespace, .. } | Self::Delete { namespace, .. } => namespace,
        }
    }

    /// Returns the key this operation targets.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Put { key, .. } | Self::Delete { key, .. } => key,
        }
    }
}

/// An ordered list of mutations applied to a store as one atomic unit.
///
/// Operations are applied in insertion order, so a later operation on the
/// same key wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a put.
    pub fn put(&mut self, namespace: Namespace, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put {
            namespace,
            key,
            value,
        });
    }

    /// Appends a delete.
    pub fn delete(&mut self, namespace: Namespace, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete { namespace, key });
    }

    /// Returns the number of operations in the batch.
    #[must_use]
    pub fn count(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if the batch holds no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Iterates over the operations in application order.
    pub fn iter(&self) -> impl Iterator<Item = &BatchOp> {
        self.ops.iter()
    }
}

/// Options controlling how a batch is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Skip the write-ahead log for this batch.
    pub disable_wal: bool,
}

impl WriteOptions {
    /// Creates default write options (write-ahead logged).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the write-ahead log is skipped.
    #[must_use]
    pub const fn disable_wal(mut self, value: bool) -> Self {
        self.disable_wal = value;
        self
    }
}
