//! Aggregated deltas for shared counters.
//!
//! Counters such as record counts and data sizes are shared by every
//! recovery unit working on the same collection. Each unit collapses its
//! increments into one delta per counter and applies it once, at commit.

use crate::write_buffer::WriteBuffer;
use kvunit_storage::Namespace;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Width in bytes of a persisted counter value.
pub const COUNTER_VALUE_LEN: usize = 8;

/// Encodes a counter total as 8-byte little-endian two's complement.
#[must_use]
pub fn encode_counter_value(value: i64) -> [u8; COUNTER_VALUE_LEN] {
    value.to_le_bytes()
}

/// Decodes a persisted counter total. Returns `None` if the width is wrong.
#[must_use]
pub fn decode_counter_value(bytes: &[u8]) -> Option<i64> {
    <[u8; COUNTER_VALUE_LEN]>::try_from(bytes)
        .ok()
        .map(i64::from_le_bytes)
}

/// A live counter shared between recovery units.
///
/// Clones share the same cell. All access is atomic with relaxed ordering:
/// the value is a statistic and never orders other memory operations.
#[derive(Debug, Clone, Default)]
pub struct CounterCell(Arc<AtomicI64>);

impl CounterCell {
    /// Creates a cell holding `initial`.
    #[must_use]
    pub fn new(initial: i64) -> Self {
        Self(Arc::new(AtomicI64::new(initial)))
    }

    /// Adds `delta` and returns the total read back afterwards.
    ///
    /// Another unit may add between the two steps; the returned total then
    /// includes its delta as well.
    pub fn add(&self, delta: i64) -> i64 {
        self.0.fetch_add(delta, Ordering::Relaxed);
        self.0.load(Ordering::Relaxed)
    }

    /// Takes back a `delta` previously applied with [`CounterCell::add`].
    pub fn revert(&self, delta: i64) {
        self.0.fetch_sub(delta, Ordering::Relaxed);
    }

    /// Returns the current total.
    #[must_use]
    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Returns true if both handles refer to the same cell.
    #[must_use]
    pub fn same_cell(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug)]
struct CounterDelta {
    cell: CounterCell,
    delta: i64,
}

/// Deltas a flush applied to shared cells, kept so a failed write can take
/// them back.
#[derive(Debug, Default)]
#[must_use]
pub struct AppliedDeltas(Vec<(CounterCell, i64)>);

impl AppliedDeltas {
    /// Returns the number of counters flushed.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing was flushed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reverts every applied delta on its cell.
    pub fn revert(self) {
        for (cell, delta) in self.0 {
            cell.revert(delta);
        }
    }
}

/// Pending counter deltas of the active unit of work, keyed by counter key.
#[derive(Debug, Default)]
pub struct CounterDeltaTable {
    entries: BTreeMap<Vec<u8>, CounterDelta>,
}

impl CounterDeltaTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulates `delta` for `key`. A zero delta is ignored.
    ///
    /// The first increment for a key binds it to `cell`; later increments
    /// only add to the delta.
    pub fn increment(&mut self, key: &[u8], cell: &CounterCell, delta: i64) {
        if delta == 0 {
            return;
        }
        match self.entries.get_mut(key) {
            // Wraps like the cell itself
            Some(entry) => entry.delta = entry.delta.wrapping_add(delta),
            None => {
                self.entries.insert(
                    key.to_vec(),
                    CounterDelta {
                        cell: cell.clone(),
                        delta,
                    },
                );
            }
        }
    }

    /// Returns the accumulated delta for `key`, or zero.
    #[must_use]
    pub fn delta(&self, key: &[u8]) -> i64 {
        self.entries.get(key).map_or(0, |entry| entry.delta)
    }

    /// Returns the number of counters touched.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no counter was touched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Discards every pending delta.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Applies every delta to its shared cell and buffers the resulting
    /// totals as puts in the default namespace. Empties the table.
    ///
    /// If the buffer never reaches the store, the caller must
    /// [`revert`](AppliedDeltas::revert) the returned deltas.
    pub fn flush_into(&mut self, buffer: &mut WriteBuffer) -> AppliedDeltas {
        let mut applied = Vec::with_capacity(self.entries.len());
        for (key, entry) in std::mem::take(&mut self.entries) {
            let total = entry.cell.add(entry.delta);
            buffer.put(
                Namespace::default_namespace(),
                key,
                encode_counter_value(total).to_vec(),
            );
            applied.push((entry.cell, entry.delta));
        }
        AppliedDeltas(applied)
    }
}
