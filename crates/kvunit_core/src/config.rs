//! Recovery unit configuration.

/// Configuration for a recovery unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryUnitConfig {
    /// Whether commit batches go through the write-ahead log.
    pub durable: bool,

    /// Whether `await_commit` syncs the write-ahead log (only when durable).
    pub sync_on_await_commit: bool,
}

impl Default for RecoveryUnitConfig {
    fn default() -> Self {
        Self {
            durable: true,
            sync_on_await_commit: true,
        }
    }
}

impl RecoveryUnitConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether commits are write-ahead logged.
    #[must_use]
    pub const fn durable(mut self, value: bool) -> Self {
        self.durable = value;
        self
    }

    /// Sets whether `await_commit` syncs the write-ahead log.
    #[must_use]
    pub const fn sync_on_await_commit(mut self, value: bool) -> Self {
        self.sync_on_await_commit = value;
        self
    }
}
