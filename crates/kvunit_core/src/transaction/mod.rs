//! Transaction ordering for conflict detection.
//!
//! The recovery unit does not decide conflicts. It reports three events to
//! a [`ConflictTracker`]: the moment its read view is fixed, a successful
//! commit, and an abort. [`TransactionEngine`] is the tracker shipped with
//! kvunit; embedders with their own versioning implement the trait.

mod engine;
mod tracker;

pub use engine::{EngineTransaction, TransactionEngine};
pub use tracker::ConflictTracker;
