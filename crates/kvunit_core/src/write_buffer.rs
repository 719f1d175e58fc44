//! Pending mutations of the active unit of work.

use kvunit_storage::{Namespace, WriteBatch};
use std::collections::BTreeMap;

/// A buffered mutation for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferedWrite {
    /// The key will hold this value.
    Put(Vec<u8>),
    /// The key will be deleted.
    Tombstone,
}

impl BufferedWrite {
    /// Returns true for a deletion.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        matches!(self, Self::Tombstone)
    }
}

/// An ordered, indexed overlay of pending puts and deletes.
///
/// Keys are ordered bytewise within each namespace, the same order the
/// store uses, so the buffer can be merged with a store iterator. Only the
/// latest mutation per key is kept, but every recorded operation counts
/// towards [`WriteBuffer::op_count`].
#[derive(Debug, Clone, Default)]
pub struct WriteBuffer {
    entries: BTreeMap<Namespace, BTreeMap<Vec<u8>, BufferedWrite>>,
    op_count: usize,
}

impl WriteBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a put.
    pub fn put(&mut self, namespace: Namespace, key: Vec<u8>, value: Vec<u8>) {
        self.record(namespace, key, BufferedWrite::Put(value));
    }

    /// Records a delete.
    pub fn delete(&mut self, namespace: Namespace, key: Vec<u8>) {
        self.record(namespace, key, BufferedWrite::Tombstone);
    }

    fn record(&mut self, namespace: Namespace, key: Vec<u8>, write: BufferedWrite) {
        self.entries.entry(namespace).or_default().insert(key, write);
        self.op_count += 1;
    }

    /// Looks up the pending mutation for a key.
    #[must_use]
    pub fn lookup(&self, namespace: &Namespace, key: &[u8]) -> Option<&BufferedWrite> {
        self.entries.get(namespace)?.get(key)
    }

    /// Returns the number of recorded operations, including overwritten ones.
    #[must_use]
    pub fn op_count(&self) -> usize {
        self.op_count
    }

    /// Returns true if no operation has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.op_count == 0
    }

    /// Returns the number of distinct keys with a pending mutation.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Returns the pending mutations of one namespace in key order.
    #[must_use]
    pub fn entries_in(&self, namespace: &Namespace) -> Vec<(Vec<u8>, BufferedWrite)> {
        self.entries
            .get(namespace)
            .map(|keys| {
                keys.iter()
                    .map(|(key, write)| (key.clone(), write.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Builds the store batch that applies every pending mutation.
    #[must_use]
    pub fn to_batch(&self) -> WriteBatch {
        let mut batch = WriteBatch::new();
        for (namespace, keys) in &self.entries {
            for (key, write) in keys {
                match write {
                    BufferedWrite::Put(value) => {
                        batch.put(namespace.clone(), key.clone(), value.clone());
                    }
                    BufferedWrite::Tombstone => batch.delete(namespace.clone(), key.clone()),
                }
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvunit_storage::BatchOp;

    fn ns() -> Namespace {
        Namespace::new("data")
    }

    #[test]
    fn new_buffer_is_empty() {
        let buffer = WriteBuffer::new();
        assert!(buffer.is_empty());
        assert_eq!(buffer.key_count(), 0);
        assert!(buffer.to_batch().is_empty());
    }

    #[test]
    fn lookup_sees_latest_write() {
        let mut buffer = WriteBuffer::new();
        buffer.put(ns(), b"k".to_vec(), b"1".to_vec());
        assert_eq!(
            buffer.lookup(&ns(), b"k"),
            Some(&BufferedWrite::Put(b"1".to_vec()))
        );

        buffer.delete(ns(), b"k".to_vec());
        assert!(buffer.lookup(&ns(), b"k").unwrap().is_tombstone());
        assert_eq!(buffer.lookup(&Namespace::new("other"), b"k"), None);
    }

    #[test]
    fn op_count_counts_overwrites() {
        let mut buffer = WriteBuffer::new();
        buffer.put(ns(), b"k".to_vec(), b"1".to_vec());
        buffer.delete(ns(), b"k".to_vec());

        assert_eq!(buffer.op_count(), 2);
        assert_eq!(buffer.key_count(), 1);
        assert_eq!(buffer.to_batch().count(), 1);
    }

    #[test]
    fn entries_in_are_ordered() {
        let mut buffer = WriteBuffer::new();
        buffer.put(ns(), b"c".to_vec(), b"3".to_vec());
        buffer.put(ns(), b"a".to_vec(), b"1".to_vec());
        buffer.delete(ns(), b"b".to_vec());
        buffer.put(Namespace::new("other"), b"z".to_vec(), b"9".to_vec());

        let keys: Vec<_> = buffer.entries_in(&ns()).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert!(buffer.entries_in(&Namespace::new("none")).is_empty());
    }

    #[test]
    fn batch_carries_deletes() {
        let mut buffer = WriteBuffer::new();
        buffer.put(ns(), b"a".to_vec(), b"1".to_vec());
        buffer.delete(ns(), b"b".to_vec());

        let batch = buffer.to_batch();
        let ops: Vec<_> = batch.iter().cloned().collect();
        assert_eq!(
            ops,
            vec![
                BatchOp::Put {
                    namespace: ns(),
                    key: b"a".to_vec(),
                    value: b"1".to_vec(),
                },
                BatchOp::Delete {
                    namespace: ns(),
                    key: b"b".to_vec(),
                },
            ]
        );
    }
}
