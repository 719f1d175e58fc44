//! Named key spaces.

use std::fmt;

const DEFAULT_NAME: &str = "default";

/// A named key space inside a store (a column family).
///
/// Every store has the reserved default namespace. It holds internal
/// bookkeeping records such as persisted counters and is not meant to be
/// scanned by generic callers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Namespace(String);

impl Namespace {
    /// Creates a namespace handle with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the reserved default namespace.
    #[must_use]
    pub fn default_namespace() -> Self {
        Self(DEFAULT_NAME.to_string())
    }

    /// Returns true for the reserved default namespace.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_NAME
    }

    /// Returns the namespace name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ns:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_namespace_is_default() {
        assert!(Namespace::default_namespace().is_default());
        assert!(Namespace::new("default").is_default());
        assert!(!Namespace::new("records").is_default());
    }

    #[test]
    fn namespace_display() {
        assert_eq!(format!("{}", Namespace::new("index")), "ns:index");
    }
}
