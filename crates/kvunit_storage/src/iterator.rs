//! Ordered iteration over a namespace.

/// A positionable cursor over key/value pairs in ascending key order.
///
/// Iterators are finite. A freshly created iterator is positioned on its
/// first entry; `seek` and `seek_to_first` reposition it, so one iterator
/// can be restarted any number of times.
pub trait StoreIterator: Send {
    /// Returns true while the iterator is positioned on an entry.
    fn valid(&self) -> bool;

    /// Returns the key at the current position.
    fn key(&self) -> Option<&[u8]>;

    /// Returns the value at the current position.
    fn value(&self) -> Option<&[u8]>;

    /// Advances to the next entry. No-op once exhausted.
    fn next(&mut self);

    /// Positions the iterator on the first key `>= target`.
    fn seek(&mut self, target: &[u8]);

    /// Positions the iterator on the first key.
    fn seek_to_first(&mut self);

    /// Drains the entries from the current position to the end.
    fn collect_remaining(&mut self) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut out = Vec::new();
        while self.valid() {
            if let (Some(key), Some(value)) = (self.key(), self.value()) {
                out.push((key.to_vec(), value.to_vec()));
            }
            self.next();
        }
        out
    }
}

/// An iterator over an owned, pre-sorted list of entries.
///
/// Stores use it to hand out iterators whose contents are fixed at the
/// snapshot they were created for.
#[derive(Debug, Clone, Default)]
pub struct VecIterator {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    pos: usize,
}

impl VecIterator {
    /// Creates an iterator over `entries`, which must be sorted by key
    /// with no duplicates.
    #[must_use]
    pub fn new(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        debug_assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
        Self { entries, pos: 0 }
    }

    /// Returns the total number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StoreIterator for VecIterator {
    fn valid(&self) -> bool {
        self.pos < self.entries.len()
    }

    fn key(&self) -> Option<&[u8]> {
        self.entries.get(self.pos).map(|(k, _)| k.as_slice())
    }

    fn value(&self) -> Option<&[u8]> {
        self.entries.get(self.pos).map(|(_, v)| v.as_slice())
    }

    fn next(&mut self) {
        if self.pos < self.entries.len() {
            self.pos += 1;
        }
    }

    fn seek(&mut self, target: &[u8]) {
        self.pos = self
            .entries
            .partition_point(|(key, _)| key.as_slice() < target);
    }

    fn seek_to_first(&mut self) {
        self.pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VecIterator {
        VecIterator::new(vec![
            (b"a".to_vec(), b"1".to_vec()),
            (b"c".to_vec(), b"3".to_vec()),
            (b"e".to_vec(), b"5".to_vec()),
        ])
    }

    #[test]
    fn starts_on_first_entry() {
        let iter = sample();
        assert!(iter.valid());
        assert_eq!(iter.key(), Some(&b"a"[..]));
        assert_eq!(iter.value(), Some(&b"1"[..]));
    }

    #[test]
    fn seek_lands_on_next_greater_key() {
        let mut iter = sample();
        iter.seek(b"b");
        assert_eq!(iter.key(), Some(&b"c"[..]));

        iter.seek(b"e");
        assert_eq!(iter.key(), Some(&b"e"[..]));

        iter.seek(b"f");
        assert!(!iter.valid());
        assert_eq!(iter.key(), None);
    }

    #[test]
    fn collect_and_restart() {
        let mut iter = sample();
        assert_eq!(iter.collect_remaining().len(), 3);
        assert!(!iter.valid());

        iter.next();
        assert!(!iter.valid());

        iter.seek_to_first();
        let keys: Vec<_> = iter.collect_remaining().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"c".to_vec(), b"e".to_vec()]);
    }

    #[test]
    fn empty_iterator_is_invalid() {
        let iter = VecIterator::default();
        assert!(iter.is_empty());
        assert!(!iter.valid());
    }
}
