//! Reference conflict tracker.

use crate::transaction::tracker::ConflictTracker;
use crate::types::{SequenceNumber, TransactionId};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared transaction bookkeeping for all recovery units of one store.
///
/// The engine provides:
/// - Monotonic transaction IDs
/// - A committed sequence that advances once per committed write batch
/// - The set of active transactions and the sequence each one pinned
///
/// Hand one [`EngineTransaction`] to each recovery unit via
/// [`TransactionEngine::begin`].
pub struct TransactionEngine {
    /// Next transaction ID.
    next_txid: AtomicU64,
    /// Latest committed sequence.
    committed_seq: AtomicU64,
    /// Active transactions and the committed sequence they pinned.
    active: RwLock<BTreeMap<TransactionId, SequenceNumber>>,
    commits: AtomicU64,
    aborts: AtomicU64,
}

impl Default for TransactionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionEngine {
    /// Creates a new engine.
    #[must_use]
    pub fn new() -> Self {
        Self::with_state(1, 0)
    }

    /// Creates an engine resuming from known counters.
    #[must_use]
    pub fn with_state(next_txid: u64, committed_seq: u64) -> Self {
        Self {
            next_txid: AtomicU64::new(next_txid),
            committed_seq: AtomicU64::new(committed_seq),
            active: RwLock::new(BTreeMap::new()),
            commits: AtomicU64::new(0),
            aborts: AtomicU64::new(0),
        }
    }

    /// Creates a tracker for one recovery unit.
    #[must_use]
    pub fn begin(self: &Arc<Self>) -> EngineTransaction {
        EngineTransaction {
            engine: Arc::clone(self),
            txid: None,
            snapshot_seq: None,
        }
    }

    fn allocate_txid(&self) -> TransactionId {
        TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst))
    }

    fn register(&self, txid: TransactionId) -> SequenceNumber {
        // Read the sequence under the lock so a concurrent commit cannot
        // slip between pinning and registering
        let mut active = self.active.write();
        let seq = self.committed_seq();
        active.insert(txid, seq);
        seq
    }

    fn publish_commit(&self, txid: TransactionId) -> SequenceNumber {
        let mut active = self.active.write();
        let seq = SequenceNumber::new(self.committed_seq.fetch_add(1, Ordering::SeqCst) + 1);
        active.remove(&txid);
        self.commits.fetch_add(1, Ordering::Relaxed);
        seq
    }

    fn deregister(&self, txid: TransactionId) {
        self.active.write().remove(&txid);
        self.aborts.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the latest committed sequence.
    #[must_use]
    pub fn committed_seq(&self) -> SequenceNumber {
        SequenceNumber::new(self.committed_seq.load(Ordering::SeqCst))
    }

    /// Returns the number of transactions that pinned a sequence and have
    /// not finished.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.read().len()
    }

    /// Returns the oldest sequence pinned by an active transaction.
    #[must_use]
    pub fn oldest_active_snapshot(&self) -> Option<SequenceNumber> {
        self.active.read().values().min().copied()
    }

    /// Returns the number of committed transactions.
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    /// Returns the number of aborted transactions.
    #[must_use]
    pub fn abort_count(&self) -> u64 {
        self.aborts.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for TransactionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionEngine")
            .field("committed_seq", &self.committed_seq())
            .field("active_count", &self.active_count())
            .finish_non_exhaustive()
    }
}

/// One recovery unit's view of a [`TransactionEngine`].
///
/// The handle is reusable: after a commit or abort the next
/// `record_version_identity` starts a new transaction.
#[derive(Debug)]
pub struct EngineTransaction {
    engine: Arc<TransactionEngine>,
    txid: Option<TransactionId>,
    snapshot_seq: Option<SequenceNumber>,
}

impl EngineTransaction {
    /// Returns the sequence pinned by `record_version_identity`.
    #[must_use]
    pub fn snapshot_seq(&self) -> Option<SequenceNumber> {
        self.snapshot_seq
    }

    /// Returns the engine this handle reports to.
    #[must_use]
    pub fn engine(&self) -> &Arc<TransactionEngine> {
        &self.engine
    }
}

impl ConflictTracker for EngineTransaction {
    fn record_version_identity(&mut self) {
        if self.snapshot_seq.is_some() {
            return;
        }
        let txid = match self.txid {
            Some(txid) => txid,
            None => {
                let txid = self.engine.allocate_txid();
                self.txid = Some(txid);
                txid
            }
        };
        self.snapshot_seq = Some(self.engine.register(txid));
    }

    fn commit(&mut self) {
        // A blind write never recorded a snapshot but still commits
        let txid = self
            .txid
            .take()
            .unwrap_or_else(|| self.engine.allocate_txid());
        let seq = self.engine.publish_commit(txid);
        self.snapshot_seq = None;
        tracing::trace!(%txid, %seq, "transaction committed");
    }

    fn abort(&mut self) {
        if let Some(txid) = self.txid.take() {
            self.engine.deregister(txid);
            tracing::trace!(%txid, "transaction aborted");
        }
        self.snapshot_seq = None;
    }

    fn transaction_id(&self) -> Option<TransactionId> {
        self.txid
    }
}

impl Drop for EngineTransaction {
    fn drop(&mut self) {
        if let Some(txid) = self.txid.take() {
            self.engine.active.write().remove(&txid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_engine() -> Arc<TransactionEngine> {
        Arc::new(TransactionEngine::new())
    }

    #[test]
    fn record_pins_committed_sequence() {
        let engine = create_engine();
        let mut txn = engine.begin();
        assert_eq!(txn.transaction_id(), None);

        txn.record_version_identity();
        assert_eq!(txn.transaction_id(), Some(TransactionId::new(1)));
        assert_eq!(txn.snapshot_seq(), Some(SequenceNumber::new(0)));
        assert_eq!(engine.active_count(), 1);
    }

    #[test]
    fn record_is_idempotent() {
        let engine = create_engine();
        let mut txn = engine.begin();
        txn.record_version_identity();
        txn.record_version_identity();

        assert_eq!(txn.transaction_id(), Some(TransactionId::new(1)));
        assert_eq!(engine.active_count(), 1);
    }

    #[test]
    fn commit_advances_sequence() {
        let engine = create_engine();
        let mut txn = engine.begin();
        txn.record_version_identity();
        txn.commit();

        assert_eq!(engine.committed_seq().as_u64(), 1);
        assert_eq!(engine.active_count(), 0);
        assert_eq!(engine.commit_count(), 1);
        assert_eq!(txn.transaction_id(), None);
    }

    #[test]
    fn blind_commit_gets_an_id() {
        let engine = create_engine();
        let mut txn = engine.begin();
        txn.commit();

        assert_eq!(engine.committed_seq().as_u64(), 1);
        assert_eq!(engine.commit_count(), 1);
    }

    #[test]
    fn abort_is_idempotent() {
        let engine = create_engine();
        let mut txn = engine.begin();
        txn.record_version_identity();

        txn.abort();
        txn.abort();
        assert_eq!(engine.abort_count(), 1);
        assert_eq!(engine.active_count(), 0);
        assert_eq!(engine.committed_seq().as_u64(), 0);
    }

    #[test]
    fn abort_after_commit_is_noop() {
        let engine = create_engine();
        let mut txn = engine.begin();
        txn.record_version_identity();
        txn.commit();
        txn.abort();

        assert_eq!(engine.commit_count(), 1);
        assert_eq!(engine.abort_count(), 0);
    }

    #[test]
    fn handle_is_reusable() {
        let engine = create_engine();
        let mut txn = engine.begin();
        txn.record_version_identity();
        txn.commit();

        txn.record_version_identity();
        assert_eq!(txn.transaction_id(), Some(TransactionId::new(2)));
        assert_eq!(txn.snapshot_seq(), Some(SequenceNumber::new(1)));
    }

    #[test]
    fn later_reader_pins_later_sequence() {
        let engine = create_engine();
        let mut reader = engine.begin();
        reader.record_version_identity();

        let mut writer = engine.begin();
        writer.record_version_identity();
        writer.commit();

        let mut late = engine.begin();
        late.record_version_identity();

        assert_eq!(reader.snapshot_seq(), Some(SequenceNumber::new(0)));
        assert_eq!(late.snapshot_seq(), Some(SequenceNumber::new(1)));
        assert_eq!(engine.oldest_active_snapshot(), Some(SequenceNumber::new(0)));
    }

    #[test]
    fn drop_deregisters() {
        let engine = create_engine();
        {
            let mut txn = engine.begin();
            txn.record_version_identity();
            assert_eq!(engine.active_count(), 1);
        }
        assert_eq!(engine.active_count(), 0);
    }
}
