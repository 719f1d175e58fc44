//! Test fixtures and recovery unit helpers.
//!
//! Provides a ready-wired store and transaction engine, plus change hooks,
//! trackers and stores that log the calls made on them so tests can check
//! ordering.

use kvunit_core::{
    Change, ConflictTracker, EngineTransaction, RecoveryUnit, RecoveryUnitConfig,
    TransactionEngine, TransactionId,
};
use kvunit_storage::{
    InMemoryStore, Namespace, OrderedStore, Snapshot, StorageResult, StoreIterator, WriteBatch,
    WriteOptions,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Name of the data namespace every [`TestEnv`] creates.
pub const DATA_NAMESPACE: &str = "data";

/// A store and transaction engine shared by the recovery units of a test.
pub struct TestEnv {
    /// The store.
    pub store: Arc<InMemoryStore>,
    /// The transaction engine.
    pub engine: Arc<TransactionEngine>,
    /// The data namespace.
    pub ns: Namespace,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    /// Creates an empty environment.
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let ns = store.create_namespace(DATA_NAMESPACE);
        Self {
            store,
            engine: Arc::new(TransactionEngine::new()),
            ns,
        }
    }

    /// Creates a recovery unit with the default configuration.
    pub fn recovery_unit(&self) -> RecoveryUnit {
        self.recovery_unit_with(RecoveryUnitConfig::default())
    }

    /// Creates a recovery unit with `config`.
    pub fn recovery_unit_with(&self, config: RecoveryUnitConfig) -> RecoveryUnit {
        RecoveryUnit::new(self.store.clone(), Box::new(self.engine.begin()), config)
    }

    /// Reads the latest committed value of `key` in the data namespace.
    pub fn committed(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.store
            .get(&self.ns, key, None)
            .expect("Failed to read committed value")
    }

    /// Reads the latest committed value of `key` in the default namespace.
    pub fn committed_internal(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.store
            .get(&Namespace::default_namespace(), key, None)
            .expect("Failed to read committed value")
    }

    /// Returns every committed entry of the data namespace.
    pub fn committed_entries(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.store
            .new_iterator(&self.ns, None)
            .expect("Failed to create iterator")
            .collect_remaining()
    }

    /// Writes `entries` straight to the store as one batch.
    pub fn seed<K: AsRef<[u8]>, V: AsRef<[u8]>>(&self, entries: &[(K, V)]) {
        let mut batch = WriteBatch::new();
        for (key, value) in entries {
            batch.put(
                self.ns.clone(),
                key.as_ref().to_vec(),
                value.as_ref().to_vec(),
            );
        }
        self.store
            .write(&batch, WriteOptions::default())
            .expect("Failed to seed store");
    }
}

/// A shared, ordered log of events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    /// Returns a copy of all events.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Returns the position of the first event equal to `event`.
    pub fn position(&self, event: &str) -> Option<usize> {
        self.events.lock().iter().position(|e| e == event)
    }

    /// Returns how many events equal `event`.
    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    /// Removes all events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

/// A change that logs `commit:<name>` or `rollback:<name>`.
#[derive(Debug)]
pub struct RecordingChange {
    name: String,
    log: EventLog,
}

impl RecordingChange {
    /// Creates a boxed change writing to `log`.
    pub fn boxed(log: &EventLog, name: impl Into<String>) -> Box<dyn Change> {
        Box::new(Self {
            name: name.into(),
            log: log.clone(),
        })
    }
}

impl Change for RecordingChange {
    fn commit(self: Box<Self>) {
        self.log.push(format!("commit:{}", self.name));
    }

    fn rollback(self: Box<Self>) {
        self.log.push(format!("rollback:{}", self.name));
    }
}

/// A conflict tracker that logs every call before delegating to an
/// [`EngineTransaction`].
#[derive(Debug)]
pub struct RecordingTracker {
    inner: EngineTransaction,
    log: EventLog,
}

impl RecordingTracker {
    /// Wraps `inner`, logging to `log`.
    pub fn new(inner: EngineTransaction, log: &EventLog) -> Self {
        Self {
            inner,
            log: log.clone(),
        }
    }
}

impl ConflictTracker for RecordingTracker {
    fn record_version_identity(&mut self) {
        self.log.push("tracker:record");
        self.inner.record_version_identity();
    }

    fn commit(&mut self) {
        self.log.push("tracker:commit");
        self.inner.commit();
    }

    fn abort(&mut self) {
        self.log.push("tracker:abort");
        self.inner.abort();
    }

    fn transaction_id(&self) -> Option<TransactionId> {
        self.inner.transaction_id()
    }
}

/// A store wrapper that logs snapshot and write calls.
#[derive(Debug)]
pub struct RecordingStore {
    inner: Arc<InMemoryStore>,
    log: EventLog,
}

impl RecordingStore {
    /// Wraps `inner`, logging to `log`.
    pub fn new(inner: Arc<InMemoryStore>, log: &EventLog) -> Self {
        Self {
            inner,
            log: log.clone(),
        }
    }
}

impl OrderedStore for RecordingStore {
    fn get(
        &self,
        namespace: &Namespace,
        key: &[u8],
        snapshot: Option<&Snapshot>,
    ) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(namespace, key, snapshot)
    }

    fn write(&self, batch: &WriteBatch, options: WriteOptions) -> StorageResult<()> {
        let result = self.inner.write(batch, options);
        if result.is_ok() {
            self.log.push("store:write");
        }
        result
    }

    fn new_iterator(
        &self,
        namespace: &Namespace,
        snapshot: Option<&Snapshot>,
    ) -> StorageResult<Box<dyn StoreIterator>> {
        self.inner.new_iterator(namespace, snapshot)
    }

    fn get_snapshot(&self) -> Snapshot {
        self.log.push("store:snapshot");
        self.inner.get_snapshot()
    }

    fn release_snapshot(&self, snapshot: &Snapshot) -> StorageResult<()> {
        self.log.push("store:release");
        self.inner.release_snapshot(snapshot)
    }

    fn sync_wal(&self) -> StorageResult<()> {
        self.inner.sync_wal()
    }

    fn latest_sequence(&self) -> u64 {
        self.inner.latest_sequence()
    }
}

/// Creates a recovery unit whose store and tracker calls land in `log`.
pub fn recording_recovery_unit(env: &TestEnv, log: &EventLog) -> RecoveryUnit {
    RecoveryUnit::new(
        Arc::new(RecordingStore::new(env.store.clone(), log)),
        Box::new(RecordingTracker::new(env.engine.begin(), log)),
        RecoveryUnitConfig::default(),
    )
}
