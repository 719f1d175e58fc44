//! Conflict tracker interface.

use crate::types::TransactionId;

/// Per-transaction handle on the component that orders transactions.
///
/// The recovery unit guarantees two orderings:
///
/// - `record_version_identity` happens before the unit's snapshot is
///   captured, so the tracker never believes less has committed than the
///   snapshot can see
/// - `commit` happens after the unit's batch has been applied to the store
///
/// `abort` is called at every teardown, including after a successful commit
/// and on units that never recorded anything, and must be a no-op when
/// there is nothing to abort.
pub trait ConflictTracker: Send {
    /// Records the transaction's version identity.
    fn record_version_identity(&mut self);

    /// Marks the transaction as committed.
    fn commit(&mut self);

    /// Marks the transaction as aborted.
    fn abort(&mut self);

    /// Returns the current transaction ID, if one has been assigned.
    fn transaction_id(&self) -> Option<TransactionId>;
}
