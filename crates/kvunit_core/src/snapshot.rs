//! Owned snapshot handles.

use kvunit_storage::{OrderedStore, Snapshot};
use std::sync::Arc;

/// A snapshot acquired from a store and released when the handle drops.
///
/// Holding the snapshot in an owned value ties the release to the handle's
/// lifetime, so it happens exactly once on every exit path.
pub struct SnapshotHandle {
    store: Arc<dyn OrderedStore>,
    snapshot: Snapshot,
}

impl SnapshotHandle {
    /// Captures the store's current committed state.
    pub fn acquire(store: Arc<dyn OrderedStore>) -> Self {
        let snapshot = store.get_snapshot();
        tracing::trace!(
            snapshot = snapshot.id,
            sequence = snapshot.sequence,
            "snapshot acquired"
        );
        Self { store, snapshot }
    }

    /// Returns the snapshot token.
    #[must_use]
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

impl Drop for SnapshotHandle {
    fn drop(&mut self) {
        match self.store.release_snapshot(&self.snapshot) {
            Ok(()) => tracing::trace!(snapshot = self.snapshot.id, "snapshot released"),
            Err(e) => tracing::warn!(
                snapshot = self.snapshot.id,
                error = %e,
                "store refused snapshot release"
            ),
        }
    }
}

impl std::fmt::Debug for SnapshotHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotHandle")
            .field("snapshot", &self.snapshot)
            .finish_non_exhaustive()
    }
}
