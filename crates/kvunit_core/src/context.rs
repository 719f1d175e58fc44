//! Operation contexts and scoped units of work.

use crate::error::{CoreError, CoreResult};
use crate::recovery_unit::RecoveryUnit;
use std::ops::{Deref, DerefMut};

/// Per-operation state that owns the operation's recovery unit.
///
/// The recovery unit is a typed field, so callers reach it directly
/// instead of recovering it from a type-erased handle.
#[derive(Debug)]
pub struct OperationContext {
    op_id: u64,
    recovery_unit: RecoveryUnit,
}

impl OperationContext {
    /// Creates a context for operation `op_id`.
    pub fn new(op_id: u64, recovery_unit: RecoveryUnit) -> Self {
        Self {
            op_id,
            recovery_unit,
        }
    }

    /// Returns the operation ID.
    #[must_use]
    pub fn op_id(&self) -> u64 {
        self.op_id
    }

    /// Returns the recovery unit.
    #[must_use]
    pub fn recovery_unit(&self) -> &RecoveryUnit {
        &self.recovery_unit
    }

    /// Returns the recovery unit mutably.
    pub fn recovery_unit_mut(&mut self) -> &mut RecoveryUnit {
        &mut self.recovery_unit
    }

    /// Installs a new recovery unit and returns the previous one.
    pub fn replace_recovery_unit(&mut self, recovery_unit: RecoveryUnit) -> RecoveryUnit {
        std::mem::replace(&mut self.recovery_unit, recovery_unit)
    }

    /// Opens a unit of work on this context's recovery unit.
    pub fn unit_of_work(&mut self) -> UnitOfWork<'_> {
        UnitOfWork::begin(&mut self.recovery_unit)
    }
}

/// A unit of work bound to a scope.
///
/// Creating the guard begins a unit of work and dropping it ends one, so a
/// unit that is not explicitly committed is rolled back on every exit path,
/// including `?` and panics. The guard dereferences to the recovery unit;
/// a nested guard is opened with `UnitOfWork::begin(&mut outer)`.
///
/// # Example
///
/// ```rust
/// use kvunit_core::{RecoveryUnit, RecoveryUnitConfig, TransactionEngine, UnitOfWork};
/// use kvunit_storage::{InMemoryStore, OrderedStore};
/// use std::sync::Arc;
///
/// let store = Arc::new(InMemoryStore::new());
/// let ns = store.create_namespace("records");
/// let engine = Arc::new(TransactionEngine::new());
/// let mut ru = RecoveryUnit::new(store.clone(), Box::new(engine.begin()), RecoveryUnitConfig::default());
///
/// {
///     let mut wuow = UnitOfWork::begin(&mut ru);
///     wuow.put(&ns, b"k", b"v").unwrap();
///     wuow.commit().unwrap();
/// }
///
/// assert_eq!(store.get(&ns, b"k", None).unwrap(), Some(b"v".to_vec()));
/// ```
#[derive(Debug)]
pub struct UnitOfWork<'a> {
    recovery_unit: &'a mut RecoveryUnit,
    committed: bool,
}

impl<'a> UnitOfWork<'a> {
    /// Begins a unit of work on `recovery_unit`.
    pub fn begin(recovery_unit: &'a mut RecoveryUnit) -> Self {
        recovery_unit.begin_unit_of_work();
        Self {
            recovery_unit,
            committed: false,
        }
    }

    /// Commits the unit of work. Nested units defer to the outermost one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if this guard already
    /// committed, and otherwise the errors of
    /// [`RecoveryUnit::commit_unit_of_work`].
    pub fn commit(&mut self) -> CoreResult<()> {
        if self.committed {
            return Err(CoreError::invalid_operation("unit of work already committed"));
        }
        self.recovery_unit.commit_unit_of_work()?;
        self.committed = true;
        Ok(())
    }

    /// Returns true once [`UnitOfWork::commit`] succeeded.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.committed
    }
}

impl Deref for UnitOfWork<'_> {
    type Target = RecoveryUnit;

    fn deref(&self) -> &Self::Target {
        self.recovery_unit
    }
}

impl DerefMut for UnitOfWork<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.recovery_unit
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        self.recovery_unit.end_unit_of_work();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecoveryUnitConfig;
    use crate::transaction::TransactionEngine;
    use kvunit_storage::{InMemoryStore, Namespace, OrderedStore};
    use std::sync::Arc;

    fn setup() -> (Arc<InMemoryStore>, Namespace, OperationContext) {
        let store = Arc::new(InMemoryStore::new());
        let ns = store.create_namespace("data");
        let engine = Arc::new(TransactionEngine::new());
        let ru = RecoveryUnit::new(
            store.clone(),
            Box::new(engine.begin()),
            RecoveryUnitConfig::default(),
        );
        (store, ns, OperationContext::new(7, ru))
    }

    #[test]
    fn context_exposes_its_unit() {
        let (_, _, mut ctx) = setup();
        assert_eq!(ctx.op_id(), 7);
        assert_eq!(ctx.recovery_unit().depth(), 0);
        ctx.recovery_unit_mut().begin_unit_of_work();
        assert_eq!(ctx.recovery_unit().depth(), 1);
    }

    #[test]
    fn replace_returns_previous_unit() {
        let (store, ns, mut ctx) = setup();
        ctx.recovery_unit_mut().put(&ns, b"k", b"v").unwrap();

        let engine = Arc::new(TransactionEngine::new());
        let fresh = RecoveryUnit::new(
            store.clone(),
            Box::new(engine.begin()),
            RecoveryUnitConfig::default(),
        );
        let old = ctx.replace_recovery_unit(fresh);
        assert!(old.has_pending_writes());
        assert!(ctx.recovery_unit().is_clean());
    }

    #[test]
    fn guard_commits() {
        let (store, ns, mut ctx) = setup();
        {
            let mut wuow = ctx.unit_of_work();
            wuow.put(&ns, b"k", b"v").unwrap();
            wuow.commit().unwrap();
            assert!(wuow.is_committed());
        }
        assert_eq!(store.get(&ns, b"k", None).unwrap(), Some(b"v".to_vec()));
        assert_eq!(ctx.recovery_unit().depth(), 0);
    }

    #[test]
    fn guard_rolls_back_on_drop() {
        let (store, ns, mut ctx) = setup();
        {
            let mut wuow = ctx.unit_of_work();
            wuow.put(&ns, b"k", b"v").unwrap();
        }
        assert_eq!(store.get(&ns, b"k", None).unwrap(), None);
        assert!(ctx.recovery_unit().is_clean());
    }

    #[test]
    fn guard_rolls_back_on_early_return() {
        fn failing(ru: &mut RecoveryUnit, ns: &Namespace) -> CoreResult<()> {
            let mut wuow = UnitOfWork::begin(ru);
            wuow.put(ns, b"k", b"v")?;
            Err(CoreError::invalid_operation("bail out"))
        }

        let (store, ns, mut ctx) = setup();
        assert!(failing(ctx.recovery_unit_mut(), &ns).is_err());
        assert_eq!(store.get(&ns, b"k", None).unwrap(), None);
        assert_eq!(ctx.recovery_unit().depth(), 0);
    }

    #[test]
    fn nested_guards_commit_with_outermost() {
        let (store, ns, mut ctx) = setup();
        {
            let mut outer = ctx.unit_of_work();
            {
                let mut inner = UnitOfWork::begin(&mut outer);
                inner.put(&ns, b"k", b"v").unwrap();
                inner.commit().unwrap();
            }
            assert_eq!(store.get(&ns, b"k", None).unwrap(), None);
            outer.commit().unwrap();
        }
        assert_eq!(store.get(&ns, b"k", None).unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn double_commit_is_rejected() {
        let (_, _, mut ctx) = setup();
        let mut wuow = ctx.unit_of_work();
        wuow.commit().unwrap();
        assert!(matches!(
            wuow.commit(),
            Err(CoreError::InvalidOperation { .. })
        ));
    }
}
