//! # kvunit Storage
//!
//! Ordered key-value store interface and implementations for kvunit.
//!
//! This crate provides the store abstraction the recovery unit is written
//! against. A store keeps keys in bytewise order inside named
//! [`Namespace`]s, applies [`WriteBatch`]es atomically, and hands out
//! point-in-time [`Snapshot`]s that reads and iterators can be pinned to.
//!
//! ## Design Principles
//!
//! - Stores do not interpret keys or values
//! - A batch is applied all-or-nothing
//! - Readers pinned to a snapshot never observe later batches
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - Multi-version in-memory store for testing and embedding
//!
//! ## Example
//!
//! ```rust
//! use kvunit_storage::{InMemoryStore, Namespace, OrderedStore, WriteBatch, WriteOptions};
//!
//! let store = InMemoryStore::new();
//! let ns = Namespace::default_namespace();
//!
//! let mut batch = WriteBatch::new();
//! batch.put(ns.clone(), b"hello".to_vec(), b"world".to_vec());
//! store.write(&batch, WriteOptions::default()).unwrap();
//!
//! assert_eq!(store.get(&ns, b"hello", None).unwrap(), Some(b"world".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod error;
mod iterator;
mod memory;
mod namespace;
mod store;

pub use batch::{BatchOp, WriteBatch, WriteOptions};
pub use error::{StorageError, StorageResult};
pub use iterator::{StoreIterator, VecIterator};
pub use memory::{InMemoryStore, StoreStats};
pub use namespace::Namespace;
pub use store::{OrderedStore, Snapshot};
