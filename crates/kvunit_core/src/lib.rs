//! # kvunit Core
//!
//! Transaction-scoped recovery units over an ordered key-value store.
//!
//! A [`RecoveryUnit`] gives one logical operation a consistent view of a
//! shared [`kvunit_storage::OrderedStore`]:
//! - Snapshot-isolated reads, with the snapshot taken lazily
//! - Read-your-own-writes through a [`WriteBuffer`] overlay
//! - Nested units of work; only the outermost commits
//! - Commit and rollback hooks ([`Change`]) fired at the boundaries
//! - Shared counters updated once per unit through [`CounterDeltaTable`]
//!
//! Transaction ordering is delegated to a [`ConflictTracker`];
//! [`TransactionEngine`] is the bundled implementation.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod config;
mod context;
mod counter;
mod error;
mod overlay;
mod recovery_unit;
mod snapshot;
mod transaction;
mod types;
mod write_buffer;

pub use change::{Change, ChangeList, FnChange};
pub use config::RecoveryUnitConfig;
pub use context::{OperationContext, UnitOfWork};
pub use counter::{
    decode_counter_value, encode_counter_value, AppliedDeltas, CounterCell, CounterDeltaTable,
    COUNTER_VALUE_LEN,
};
pub use error::{CoreError, CoreResult};
pub use overlay::OverlayIterator;
pub use recovery_unit::RecoveryUnit;
pub use snapshot::SnapshotHandle;
pub use transaction::{ConflictTracker, EngineTransaction, TransactionEngine};
pub use types::{RecordId, SequenceNumber, TransactionId};
pub use write_buffer::{BufferedWrite, WriteBuffer};
