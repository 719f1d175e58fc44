//! # kvunit Testkit
//!
//! Test utilities for kvunit.
//!
//! This crate provides:
//! - Test environments wiring a store, a transaction engine and recovery units
//! - Change hooks and store/tracker wrappers that record what happened
//! - Property-based test generators using proptest
//! - A model-checking harness and reusable scenario checks
//! - Concurrency stress helpers
//!
//! ## Usage
//!
//! ```rust
//! use kvunit_testkit::prelude::*;
//!
//! let env = TestEnv::new();
//! let mut ru = env.recovery_unit();
//! ru.begin_unit_of_work();
//! ru.put(&env.ns, b"k", b"v").unwrap();
//! ru.commit_unit_of_work().unwrap();
//! ru.end_unit_of_work();
//! assert_eq!(env.committed(b"k"), Some(b"v".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_test_tracing;
    pub use crate::integration::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;

/// Installs a `tracing` subscriber for tests, filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
