//! Commit and rollback hooks registered by higher layers.

/// A caller-supplied pair of hooks fired at a transaction boundary.
///
/// Exactly one of the two methods is called, once. `commit` runs after
/// the unit of work's writes have been applied to the store. `rollback`
/// must not fail; a hook that cannot undo its work has broken the
/// contract and should abort the process itself.
pub trait Change: Send {
    /// Called after the enclosing unit of work committed.
    fn commit(self: Box<Self>);

    /// Called when the enclosing unit of work is discarded.
    fn rollback(self: Box<Self>);
}

/// A [`Change`] built from two closures.
pub struct FnChange<C, R>
where
    C: FnOnce() + Send,
    R: FnOnce() + Send,
{
    on_commit: C,
    on_rollback: R,
}

impl<C, R> FnChange<C, R>
where
    C: FnOnce() + Send,
    R: FnOnce() + Send,
{
    /// Creates a change from a commit and a rollback closure.
    pub fn new(on_commit: C, on_rollback: R) -> Self {
        Self {
            on_commit,
            on_rollback,
        }
    }
}

impl<C, R> Change for FnChange<C, R>
where
    C: FnOnce() + Send,
    R: FnOnce() + Send,
{
    fn commit(self: Box<Self>) {
        (self.on_commit)();
    }

    fn rollback(self: Box<Self>) {
        (self.on_rollback)();
    }
}

/// Registered changes of the active unit of work, in registration order.
#[derive(Default)]
pub struct ChangeList {
    changes: Vec<Box<dyn Change>>,
}

impl ChangeList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a change.
    pub fn register(&mut self, change: Box<dyn Change>) {
        self.changes.push(change);
    }

    /// Returns the number of registered changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns true if no change is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Fires every commit hook in registration order and empties the list.
    ///
    /// Returns the number of hooks fired.
    pub fn commit_all(&mut self) -> usize {
        let count = self.changes.len();
        for change in self.changes.drain(..) {
            change.commit();
        }
        count
    }

    /// Fires every rollback hook, newest first, and empties the list.
    ///
    /// Later changes usually depend on earlier ones, so they undo first.
    /// Returns the number of hooks fired.
    pub fn rollback_all(&mut self) -> usize {
        let count = self.changes.len();
        for change in self.changes.drain(..).rev() {
            change.rollback();
        }
        count
    }
}

impl std::fmt::Debug for ChangeList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeList")
            .field("len", &self.changes.len())
            .finish()
    }
}
