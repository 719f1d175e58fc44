//! Benchmark utilities.

use kvunit_core::{RecoveryUnit, RecoveryUnitConfig, TransactionEngine};
use kvunit_storage::{InMemoryStore, Namespace, OrderedStore, WriteBatch, WriteOptions};
use std::sync::Arc;

/// Generate deterministic data of the given size.
pub fn sample_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// Generate the key for record `i`. Keys sort in numeric order.
pub fn record_key(i: usize) -> Vec<u8> {
    format!("record-{i:08}").into_bytes()
}

/// A store preloaded with records, plus an engine to run units against it.
pub struct BenchEnv {
    /// The store.
    pub store: Arc<InMemoryStore>,
    /// The transaction engine.
    pub engine: Arc<TransactionEngine>,
    /// The data namespace.
    pub ns: Namespace,
}

impl BenchEnv {
    /// Creates a store holding `records` values of `value_size` bytes.
    pub fn with_records(records: usize, value_size: usize) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let ns = store.create_namespace("bench");
        let value = sample_data(value_size);

        let mut batch = WriteBatch::new();
        for i in 0..records {
            batch.put(ns.clone(), record_key(i), value.clone());
        }
        if !batch.is_empty() {
            store
                .write(&batch, WriteOptions::default())
                .expect("Failed to preload store");
        }

        Self {
            store,
            engine: Arc::new(TransactionEngine::new()),
            ns,
        }
    }

    /// Creates a recovery unit over the store.
    pub fn recovery_unit(&self) -> RecoveryUnit {
        RecoveryUnit::new(
            self.store.clone(),
            Box::new(self.engine.begin()),
            RecoveryUnitConfig::default(),
        )
    }
}
