//! The recovery unit.

use crate::change::{Change, ChangeList};
use crate::config::RecoveryUnitConfig;
use crate::counter::{CounterCell, CounterDeltaTable};
use crate::error::{CoreError, CoreResult};
use crate::overlay::OverlayIterator;
use crate::snapshot::SnapshotHandle;
use crate::transaction::ConflictTracker;
use crate::types::RecordId;
use crate::write_buffer::{BufferedWrite, WriteBuffer};
use kvunit_storage::{Namespace, OrderedStore, Snapshot, StoreIterator, WriteOptions};
use std::sync::Arc;

/// Transaction-scoped view of a store for one logical operation.
///
/// A recovery unit gives its operation:
/// - Snapshot-isolated reads, pinned to a snapshot taken lazily on first use
/// - Read-your-own-writes through a buffer of pending mutations
/// - Nested units of work, of which only the outermost commits
/// - Counter deltas folded into the same atomic batch as the data writes
///
/// ## Lifecycle
///
/// ```text
/// begin_unit_of_work()      depth += 1
///   put / delete / read / increment_counter / register_change
/// commit_unit_of_work()     no-op unless outermost: write batch, commit hooks
/// end_unit_of_work()        depth -= 1; at depth 0 discard whatever is left
/// ```
///
/// Ending the outermost unit always runs the abort path. After a commit
/// there is nothing left to discard, so it only clears empty state.
///
/// A recovery unit is driven by one operation at a time and takes no locks
/// of its own. Dropping it aborts any unfinished work.
pub struct RecoveryUnit {
    store: Arc<dyn OrderedStore>,
    tracker: Box<dyn ConflictTracker>,
    config: RecoveryUnitConfig,
    depth: usize,
    write_buffer: Option<WriteBuffer>,
    snapshot: Option<SnapshotHandle>,
    changes: ChangeList,
    counters: CounterDeltaTable,
    oplog_read_till: Option<RecordId>,
    poisoned: bool,
}

impl RecoveryUnit {
    /// Creates a recovery unit over `store`, reporting to `tracker`.
    pub fn new(
        store: Arc<dyn OrderedStore>,
        tracker: Box<dyn ConflictTracker>,
        config: RecoveryUnitConfig,
    ) -> Self {
        Self {
            store,
            tracker,
            config,
            depth: 0,
            write_buffer: None,
            snapshot: None,
            changes: ChangeList::new(),
            counters: CounterDeltaTable::new(),
            oplog_read_till: None,
            poisoned: false,
        }
    }

    // === Unit-of-work lifecycle ===

    /// Opens a (possibly nested) unit of work.
    pub fn begin_unit_of_work(&mut self) {
        self.depth += 1;
    }

    /// Commits the outermost unit of work.
    ///
    /// Inside a nested unit this does nothing: the enclosing unit decides.
    /// Otherwise pending counter deltas and writes are applied to the store
    /// as one atomic batch, commit hooks fire in registration order, and
    /// the snapshot is released.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CommitFailed`] if the store rejects the batch.
    /// That failure is fatal: the unit is poisoned, no commit hook fires,
    /// and the caller must not retry. Returns [`CoreError::Poisoned`] on a
    /// unit that already failed.
    pub fn commit_unit_of_work(&mut self) -> CoreResult<()> {
        if self.depth > 1 {
            return Ok(());
        }
        self.ensure_usable()?;

        if self.write_buffer.is_some() {
            self.commit_writes()?;
        }

        self.changes.commit_all();
        self.snapshot = None;
        Ok(())
    }

    /// Closes a unit of work. Closing the outermost one discards anything
    /// not committed.
    pub fn end_unit_of_work(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 {
            self.abort();
        }
    }

    /// Commits outside of any unit of work and starts afresh.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if a unit of work is open,
    /// and otherwise the errors of [`RecoveryUnit::commit_unit_of_work`].
    pub fn commit_and_restart(&mut self) -> CoreResult<()> {
        if self.depth != 0 {
            return Err(CoreError::invalid_operation(format!(
                "commit_and_restart inside a unit of work (depth {})",
                self.depth
            )));
        }
        self.commit_unit_of_work()
    }

    /// Waits until previously committed work is durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot sync its write-ahead log.
    pub fn await_commit(&self) -> CoreResult<bool> {
        if self.config.durable && self.config.sync_on_await_commit {
            self.store.sync_wal()?;
        }
        Ok(true)
    }

    /// Registers hooks to run when the current unit of work finishes.
    ///
    /// Commit hooks run only after the unit's writes are in the store.
    pub fn register_change(&mut self, change: Box<dyn Change>) {
        self.changes.register(change);
    }

    // === Writes ===

    /// Buffers a put.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Poisoned`] on a unit that hit a fatal failure.
    pub fn put(&mut self, namespace: &Namespace, key: &[u8], value: &[u8]) -> CoreResult<()> {
        self.ensure_usable()?;
        self.write_buffer()
            .put(namespace.clone(), key.to_vec(), value.to_vec());
        Ok(())
    }

    /// Buffers a delete.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Poisoned`] on a unit that hit a fatal failure.
    pub fn delete(&mut self, namespace: &Namespace, key: &[u8]) -> CoreResult<()> {
        self.ensure_usable()?;
        self.write_buffer().delete(namespace.clone(), key.to_vec());
        Ok(())
    }

    // Most units only read, so the buffer is created on first write
    fn write_buffer(&mut self) -> &mut WriteBuffer {
        self.write_buffer.get_or_insert_with(|| {
            tracing::trace!("write buffer created");
            WriteBuffer::new()
        })
    }

    // === Reads ===

    /// Reads a key, seeing this unit's own pending writes first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lookup fails.
    pub fn read(&mut self, namespace: &Namespace, key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        self.ensure_usable()?;

        if let Some(buffer) = self.write_buffer.as_ref().filter(|b| !b.is_empty()) {
            match buffer.lookup(namespace, key) {
                Some(BufferedWrite::Tombstone) => return Ok(None),
                Some(BufferedWrite::Put(value)) => return Ok(Some(value.clone())),
                None => {}
            }
        }

        let snapshot = self.snapshot();
        Ok(self.store.get(namespace, key, Some(&snapshot))?)
    }

    /// Creates an iterator over `namespace` at this unit's snapshot, with
    /// pending writes merged in.
    ///
    /// # Panics
    ///
    /// Panics if `namespace` is the default namespace. Only internal
    /// bookkeeping lives there; scanning it is a caller bug.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot create the iterator.
    pub fn new_iterator(&mut self, namespace: &Namespace) -> CoreResult<Box<dyn StoreIterator>> {
        assert!(
            !namespace.is_default(),
            "iterating the default namespace is not allowed"
        );
        self.ensure_usable()?;

        let snapshot = self.snapshot();
        let base = self.store.new_iterator(namespace, Some(&snapshot))?;

        match self.write_buffer.as_ref().filter(|b| !b.is_empty()) {
            Some(buffer) => Ok(Box::new(OverlayIterator::new(
                base,
                buffer.entries_in(namespace),
            ))),
            None => Ok(base),
        }
    }

    /// Returns this unit's snapshot, acquiring it on first use.
    ///
    /// The tracker records the transaction's version identity before the
    /// snapshot is taken, never after.
    pub fn snapshot(&mut self) -> Snapshot {
        if let Some(handle) = &self.snapshot {
            return *handle.snapshot();
        }

        self.tracker.record_version_identity();
        let handle = SnapshotHandle::acquire(Arc::clone(&self.store));
        let snapshot = *handle.snapshot();
        self.snapshot = Some(handle);
        snapshot
    }

    // === Counters ===

    /// Adds `delta` to the counter stored under `key` when the unit commits.
    ///
    /// `cell` is the live counter shared with other units; it is only
    /// touched at commit. Repeated increments of one key accumulate.
    pub fn increment_counter(&mut self, key: &[u8], cell: &CounterCell, delta: i64) {
        if delta == 0 {
            return;
        }
        self.counters.increment(key, cell, delta);
        // Counter totals are written through the buffer at commit
        self.write_buffer();
    }

    /// Returns the pending delta for `key` in this unit of work.
    #[must_use]
    pub fn delta_counter(&self, key: &[u8]) -> i64 {
        self.counters.delta(key)
    }

    // === Bookkeeping ===

    /// Records the highest log position this operation has processed.
    pub fn set_oplog_read_till(&mut self, record: RecordId) {
        self.oplog_read_till = Some(record);
    }

    /// Returns the position set by [`RecoveryUnit::set_oplog_read_till`].
    #[must_use]
    pub fn oplog_read_till(&self) -> Option<RecordId> {
        self.oplog_read_till
    }

    /// Returns the unit-of-work nesting depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns true if writes or counter deltas are pending.
    #[must_use]
    pub fn has_pending_writes(&self) -> bool {
        self.write_buffer.as_ref().is_some_and(|b| !b.is_empty()) || !self.counters.is_empty()
    }

    /// Returns true if the unit holds no buffer, snapshot, change or delta.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.write_buffer.is_none()
            && self.snapshot.is_none()
            && self.changes.is_empty()
            && self.counters.is_empty()
    }

    /// Returns true if a fatal commit failure halted this unit.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Returns the unit's configuration.
    #[must_use]
    pub fn config(&self) -> &RecoveryUnitConfig {
        &self.config
    }

    // === Commit and abort protocols ===

    fn ensure_usable(&self) -> CoreResult<()> {
        if self.poisoned {
            return Err(CoreError::Poisoned);
        }
        Ok(())
    }

    fn commit_writes(&mut self) -> CoreResult<()> {
        let Some(buffer) = self.write_buffer.as_mut() else {
            return Ok(());
        };
        let counters = self.counters.flush_into(buffer);

        if buffer.op_count() > 0 {
            let batch = buffer.to_batch();
            let options = WriteOptions::new().disable_wal(!self.config.durable);

            if let Err(source) = self.store.write(&batch, options) {
                // The totals never landed, so the shared cells must not keep them
                counters.revert();
                tracing::error!(
                    error = %source,
                    ops = batch.count(),
                    "commit batch rejected by store; recovery unit halted"
                );
                self.poisoned = true;
                return Err(CoreError::CommitFailed { source });
            }

            // Only after the batch is in the store
            self.tracker.commit();
            tracing::debug!(
                ops = batch.count(),
                counters = counters.len(),
                durable = self.config.durable,
                "unit of work committed"
            );
        }

        self.counters.clear();
        self.write_buffer = None;
        Ok(())
    }

    // Every step is a no-op on a clean unit
    fn abort(&mut self) {
        let rolled_back = self.changes.rollback_all();
        self.tracker.abort();
        self.counters.clear();
        let discarded = self.write_buffer.take().map_or(0, |b| b.op_count());
        self.snapshot = None;

        if rolled_back > 0 || discarded > 0 {
            tracing::debug!(rolled_back, discarded, "unit of work aborted");
        }
    }
}

impl Drop for RecoveryUnit {
    fn drop(&mut self) {
        self.abort();
    }
}

impl std::fmt::Debug for RecoveryUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryUnit")
            .field("depth", &self.depth)
            .field("transaction_id", &self.tracker.transaction_id())
            .field("write_buffer", &self.write_buffer.as_ref().map(WriteBuffer::op_count))
            .field("snapshot", &self.snapshot)
            .field("changes", &self.changes)
            .field("counters", &self.counters.len())
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}
