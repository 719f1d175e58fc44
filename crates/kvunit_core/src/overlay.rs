//! Merged iteration of buffered writes over a store iterator.

use crate::write_buffer::BufferedWrite;
use kvunit_storage::StoreIterator;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Base,
    Delta,
}

/// Iterator that overlays a unit of work's pending writes on a snapshot
/// iterator.
///
/// At equal keys the buffered entry wins. A buffered tombstone hides the
/// base entry and is never yielded itself. The buffered entries are copied
/// at construction, so later writes in the unit of work are not seen by an
/// existing iterator.
pub struct OverlayIterator {
    base: Box<dyn StoreIterator>,
    delta: Vec<(Vec<u8>, BufferedWrite)>,
    delta_pos: usize,
    current: Option<Side>,
}

impl OverlayIterator {
    /// Creates a merged iterator positioned on the first visible entry.
    ///
    /// `delta` must be sorted by key.
    #[must_use]
    pub fn new(base: Box<dyn StoreIterator>, delta: Vec<(Vec<u8>, BufferedWrite)>) -> Self {
        let mut iter = Self {
            base,
            delta,
            delta_pos: 0,
            current: None,
        };
        iter.seek_to_first();
        iter
    }

    /// Moves both cursors until they point at the next visible entry.
    fn settle(&mut self) {
        loop {
            let delta = self.delta.get(self.delta_pos);
            let order = match (self.base.key(), delta) {
                (None, None) => {
                    self.current = None;
                    return;
                }
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (Some(base_key), Some((delta_key, _))) => delta_key.as_slice().cmp(base_key),
            };
            let tombstone = delta.is_some_and(|(_, write)| write.is_tombstone());

            match order {
                Ordering::Greater => {
                    self.current = Some(Side::Base);
                    return;
                }
                Ordering::Equal => {
                    // Shadowed by the buffer
                    self.base.next();
                }
                Ordering::Less if tombstone => self.delta_pos += 1,
                Ordering::Less => {
                    self.current = Some(Side::Delta);
                    return;
                }
            }
        }
    }
}

impl StoreIterator for OverlayIterator {
    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn key(&self) -> Option<&[u8]> {
        match self.current? {
            Side::Base => self.base.key(),
            Side::Delta => self.delta.get(self.delta_pos).map(|(k, _)| k.as_slice()),
        }
    }

    fn value(&self) -> Option<&[u8]> {
        match self.current? {
            Side::Base => self.base.value(),
            Side::Delta => match self.delta.get(self.delta_pos)? {
                (_, BufferedWrite::Put(value)) => Some(value.as_slice()),
                (_, BufferedWrite::Tombstone) => None,
            },
        }
    }

    fn next(&mut self) {
        match self.current {
            Some(Side::Base) => self.base.next(),
            Some(Side::Delta) => self.delta_pos += 1,
            None => return,
        }
        self.settle();
    }

    fn seek(&mut self, target: &[u8]) {
        self.base.seek(target);
        self.delta_pos = self
            .delta
            .partition_point(|(key, _)| key.as_slice() < target);
        self.settle();
    }

    fn seek_to_first(&mut self) {
        self.base.seek_to_first();
        self.delta_pos = 0;
        self.settle();
    }
}

impl std::fmt::Debug for OverlayIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayIterator")
            .field("delta_len", &self.delta.len())
            .field("delta_pos", &self.delta_pos)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}
