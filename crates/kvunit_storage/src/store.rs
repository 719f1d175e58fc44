//! Ordered store trait definition.

use crate::batch::{WriteBatch, WriteOptions};
use crate::error::StorageResult;
use crate::iterator::StoreIterator;
use crate::namespace::Namespace;

/// A point-in-time read view handed out by [`OrderedStore::get_snapshot`].
///
/// A snapshot is only a token: the store keeps the versions it needs alive
/// until the snapshot is released. Each snapshot must be released exactly
/// once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Snapshot {
    /// Store-assigned identifier, unique for the store's lifetime.
    pub id: u64,
    /// Highest committed sequence visible through this snapshot.
    pub sequence: u64,
}

/// An ordered, multi-version key-value store.
///
/// Keys are ordered bytewise within each [`Namespace`].
///
/// # Invariants
///
/// - `write` applies every operation of a batch or none of them
/// - reads through a snapshot never observe batches written after it
/// - reads without a snapshot observe the latest committed state
/// - stores must be `Send + Sync` for concurrent access
pub trait OrderedStore: Send + Sync {
    /// Point lookup. `Ok(None)` means the key does not exist at the read
    /// point.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace is unknown or the snapshot is not
    /// live.
    fn get(
        &self,
        namespace: &Namespace,
        key: &[u8],
        snapshot: Option<&Snapshot>,
    ) -> StorageResult<Option<Vec<u8>>>;

    /// Atomically applies a batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch could not be applied. In that case no
    /// operation of the batch is visible.
    fn write(&self, batch: &WriteBatch, options: WriteOptions) -> StorageResult<()>;

    /// Creates an iterator over `namespace` at the read point.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace is unknown or the snapshot is not
    /// live.
    fn new_iterator(
        &self,
        namespace: &Namespace,
        snapshot: Option<&Snapshot>,
    ) -> StorageResult<Box<dyn StoreIterator>>;

    /// Captures the current committed state.
    fn get_snapshot(&self) -> Snapshot;

    /// Releases a snapshot obtained from [`OrderedStore::get_snapshot`].
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot is not live.
    fn release_snapshot(&self, snapshot: &Snapshot) -> StorageResult<()>;

    /// Syncs the write-ahead log to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync_wal(&self) -> StorageResult<()>;

    /// Returns the sequence number of the latest applied batch.
    fn latest_sequence(&self) -> u64;
}
