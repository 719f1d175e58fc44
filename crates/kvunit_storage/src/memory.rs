//! In-memory multi-version store.

use crate::batch::{BatchOp, WriteBatch, WriteOptions};
use crate::error::{StorageError, StorageResult};
use crate::iterator::{StoreIterator, VecIterator};
use crate::namespace::Namespace;
use crate::store::{OrderedStore, Snapshot};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// One committed version of a key. `None` marks a deletion.
#[derive(Debug, Clone)]
struct Version {
    sequence: u64,
    value: Option<Vec<u8>>,
}

/// Counters describing what a store has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Batches applied with the write-ahead log enabled.
    pub logged_batches: u64,
    /// Batches applied with the write-ahead log disabled.
    pub unlogged_batches: u64,
    /// Batches the store refused to apply.
    pub rejected_batches: u64,
    /// Calls to `sync_wal`.
    pub wal_syncs: u64,
    /// Snapshots handed out.
    pub snapshots_acquired: u64,
    /// Snapshots released.
    pub snapshots_released: u64,
    /// Versions dropped because no reader could see them any more.
    pub versions_pruned: u64,
}

#[derive(Debug, Default)]
struct Inner {
    namespaces: HashMap<Namespace, BTreeMap<Vec<u8>, Vec<Version>>>,
    sequence: u64,
    next_snapshot_id: u64,
    live_snapshots: HashMap<u64, u64>,
    stats: StoreStats,
    pending_failures: usize,
}

impl Inner {
    fn read_point(&self, snapshot: Option<&Snapshot>) -> StorageResult<u64> {
        match snapshot {
            Some(snapshot) if self.live_snapshots.contains_key(&snapshot.id) => {
                Ok(snapshot.sequence)
            }
            Some(snapshot) => Err(StorageError::SnapshotNotLive { id: snapshot.id }),
            None => Ok(self.sequence),
        }
    }

    /// Oldest sequence any current or future reader can read at.
    fn horizon(&self) -> u64 {
        self.live_snapshots
            .values()
            .copied()
            .min()
            .unwrap_or(self.sequence)
    }

    /// Trims every version chain to `horizon` and drops keys left empty.
    fn prune(&mut self) -> usize {
        let horizon = self.horizon();
        let mut pruned = 0;
        for keyspace in self.namespaces.values_mut() {
            keyspace.retain(|_, versions| {
                pruned += trim_chain(versions, horizon);
                !versions.is_empty()
            });
        }
        pruned
    }

    fn keyspace(&self, namespace: &Namespace) -> StorageResult<&BTreeMap<Vec<u8>, Vec<Version>>> {
        self.namespaces
            .get(namespace)
            .ok_or_else(|| StorageError::unknown_namespace(namespace.name()))
    }
}

/// Returns the newest value visible at `sequence`.
fn visible(versions: &[Version], sequence: u64) -> Option<&Vec<u8>> {
    versions
        .iter()
        .rev()
        .find(|v| v.sequence <= sequence)
        .and_then(|v| v.value.as_ref())
}

/// Drops the versions of one key that no reader at `horizon` or later can
/// see. Returns how many were dropped.
fn trim_chain(versions: &mut Vec<Version>, horizon: u64) -> usize {
    let Some(keep_from) = versions.iter().rposition(|v| v.sequence <= horizon) else {
        return 0;
    };
    versions.drain(..keep_from);

    // A deletion every reader already sees needs no record
    if versions.len() == 1 && versions[0].value.is_none() {
        versions.clear();
        return keep_from + 1;
    }
    keep_from
}

/// A multi-version in-memory store.
///
/// Every applied batch gets the next sequence number and every key keeps
/// the versions any live snapshot can still see. Older versions are pruned
/// as writes land and as snapshots are released. Suitable for:
/// - Unit and integration tests
/// - Benchmarks of the layers above the store
/// - Ephemeral embedded use
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use kvunit_storage::{InMemoryStore, OrderedStore, WriteBatch, WriteOptions};
///
/// let store = InMemoryStore::new();
/// let ns = store.create_namespace("records");
///
/// let before = store.get_snapshot();
/// let mut batch = WriteBatch::new();
/// batch.put(ns.clone(), b"k".to_vec(), b"v".to_vec());
/// store.write(&batch, WriteOptions::default()).unwrap();
///
/// assert_eq!(store.get(&ns, b"k", Some(&before)).unwrap(), None);
/// assert_eq!(store.get(&ns, b"k", None).unwrap(), Some(b"v".to_vec()));
/// store.release_snapshot(&before).unwrap();
/// ```
#[derive(Debug)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates an empty store holding only the default namespace.
    #[must_use]
    pub fn new() -> Self {
        let mut inner = Inner::default();
        inner
            .namespaces
            .insert(Namespace::default_namespace(), BTreeMap::new());
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Creates a namespace if it does not exist yet and returns its handle.
    pub fn create_namespace(&self, name: impl Into<String>) -> Namespace {
        let namespace = Namespace::new(name);
        self.inner
            .write()
            .namespaces
            .entry(namespace.clone())
            .or_default();
        namespace
    }

    /// Returns true if the namespace exists.
    #[must_use]
    pub fn has_namespace(&self, namespace: &Namespace) -> bool {
        self.inner.read().namespaces.contains_key(namespace)
    }

    /// Returns the number of snapshots handed out and not yet released.
    #[must_use]
    pub fn live_snapshot_count(&self) -> usize {
        self.inner.read().live_snapshots.len()
    }

    /// Returns the number of versions held across all keys.
    #[must_use]
    pub fn version_count(&self) -> usize {
        self.inner
            .read()
            .namespaces
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    /// Returns a copy of the store's activity counters.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.inner.read().stats
    }

    /// Makes the next `count` calls to `write` fail without applying
    /// anything.
    ///
    /// Used to exercise failure handling in the layers above.
    pub fn fail_next_writes(&self, count: usize) {
        self.inner.write().pending_failures = count;
    }
}

impl OrderedStore for InMemoryStore {
    fn get(
        &self,
        namespace: &Namespace,
        key: &[u8],
        snapshot: Option<&Snapshot>,
    ) -> StorageResult<Option<Vec<u8>>> {
        let inner = self.inner.read();
        let sequence = inner.read_point(snapshot)?;
        let keyspace = inner.keyspace(namespace)?;

        Ok(keyspace
            .get(key)
            .and_then(|versions| visible(versions, sequence))
            .cloned())
    }

    fn write(&self, batch: &WriteBatch, options: WriteOptions) -> StorageResult<()> {
        let mut inner = self.inner.write();

        if inner.pending_failures > 0 {
            inner.pending_failures -= 1;
            inner.stats.rejected_batches += 1;
            return Err(StorageError::write_rejected("injected write failure"));
        }

        // Validate before applying anything so a bad batch leaves no trace
        for op in batch.iter() {
            if !inner.namespaces.contains_key(op.namespace()) {
                inner.stats.rejected_batches += 1;
                return Err(StorageError::unknown_namespace(op.namespace().name()));
            }
        }

        if batch.is_empty() {
            return Ok(());
        }

        let sequence = inner.sequence + 1;
        let horizon = inner
            .live_snapshots
            .values()
            .copied()
            .min()
            .unwrap_or(sequence);
        let mut pruned = 0;
        for op in batch.iter() {
            let (namespace, key, value) = match op {
                BatchOp::Put {
                    namespace,
                    key,
                    value,
                } => (namespace, key, Some(value.clone())),
                BatchOp::Delete { namespace, key } => (namespace, key, None),
            };

            let Some(keyspace) = inner.namespaces.get_mut(namespace) else {
                continue;
            };
            let versions = keyspace.entry(key.clone()).or_default();
            match versions.last_mut() {
                // Same key written twice in one batch: last write wins
                Some(last) if last.sequence == sequence => last.value = value,
                _ => versions.push(Version { sequence, value }),
            }
            pruned += trim_chain(versions, horizon);
            if versions.is_empty() {
                keyspace.remove(key);
            }
        }
        inner.sequence = sequence;
        inner.stats.versions_pruned += pruned as u64;

        if options.disable_wal {
            inner.stats.unlogged_batches += 1;
        } else {
            inner.stats.logged_batches += 1;
        }

        tracing::trace!(
            sequence,
            ops = batch.count(),
            wal = !options.disable_wal,
            "applied write batch"
        );
        Ok(())
    }

    fn new_iterator(
        &self,
        namespace: &Namespace,
        snapshot: Option<&Snapshot>,
    ) -> StorageResult<Box<dyn StoreIterator>> {
        let inner = self.inner.read();
        let sequence = inner.read_point(snapshot)?;
        let keyspace = inner.keyspace(namespace)?;

        let entries = keyspace
            .iter()
            .filter_map(|(key, versions)| {
                visible(versions, sequence).map(|value| (key.clone(), value.clone()))
            })
            .collect();

        Ok(Box::new(VecIterator::new(entries)))
    }

    fn get_snapshot(&self) -> Snapshot {
        let mut inner = self.inner.write();
        inner.next_snapshot_id += 1;
        let snapshot = Snapshot {
            id: inner.next_snapshot_id,
            sequence: inner.sequence,
        };
        inner.live_snapshots.insert(snapshot.id, snapshot.sequence);
        inner.stats.snapshots_acquired += 1;
        snapshot
    }

    fn release_snapshot(&self, snapshot: &Snapshot) -> StorageResult<()> {
        let mut inner = self.inner.write();
        if inner.live_snapshots.remove(&snapshot.id).is_none() {
            return Err(StorageError::SnapshotNotLive { id: snapshot.id });
        }
        inner.stats.snapshots_released += 1;

        // Only releasing the oldest snapshot frees anything
        if snapshot.sequence < inner.horizon() {
            let pruned = inner.prune();
            inner.stats.versions_pruned += pruned as u64;
        }
        Ok(())
    }

    fn sync_wal(&self) -> StorageResult<()> {
        self.inner.write().stats.wal_syncs += 1;
        Ok(())
    }

    fn latest_sequence(&self) -> u64 {
        self.inner.read().sequence
    }
}
