//! Property-based test generators using proptest.
//!
//! Keys come from a small alphabet so generated operations collide often
//! with each other and with seeded store contents.

use kvunit_core::{CoreResult, RecoveryUnit};
use kvunit_storage::Namespace;
use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;
use std::collections::BTreeMap;

/// A write issued through a recovery unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOp {
    /// Put `value` under `key`.
    Put(Vec<u8>, Vec<u8>),
    /// Delete `key`.
    Delete(Vec<u8>),
}

impl UnitOp {
    /// Issues the operation through `ru`.
    pub fn apply(&self, ru: &mut RecoveryUnit, ns: &Namespace) -> CoreResult<()> {
        match self {
            Self::Put(key, value) => ru.put(ns, key, value),
            Self::Delete(key) => ru.delete(ns, key),
        }
    }

    /// Applies the operation to a plain ordered map.
    pub fn apply_to_model(&self, model: &mut BTreeMap<Vec<u8>, Vec<u8>>) {
        match self {
            Self::Put(key, value) => {
                model.insert(key.clone(), value.clone());
            }
            Self::Delete(key) => {
                model.remove(key);
            }
        }
    }

    /// Returns the key the operation targets.
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Put(key, _) | Self::Delete(key) => key,
        }
    }
}

/// Strategy for generating keys.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(b'a'..=b'e', 1..3)
}

/// Strategy for generating values.
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..16)
}

/// Strategy for generating a single write.
pub fn unit_op_strategy() -> impl Strategy<Value = UnitOp> {
    prop_oneof![
        3 => (key_strategy(), value_strategy()).prop_map(|(k, v)| UnitOp::Put(k, v)),
        1 => key_strategy().prop_map(UnitOp::Delete),
    ]
}

/// Strategy for generating the writes of one unit of work.
pub fn unit_ops_strategy(max_ops: usize) -> impl Strategy<Value = Vec<UnitOp>> {
    prop::collection::vec(unit_op_strategy(), 0..max_ops)
}

/// Strategy for generating committed store contents.
pub fn seed_strategy() -> impl Strategy<Value = BTreeMap<Vec<u8>, Vec<u8>>> {
    prop::collection::btree_map(key_strategy(), value_strategy(), 0..8)
}

/// Strategy for generating counter increments.
pub fn counter_deltas_strategy() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(-1_000i64..1_000, 0..20)
}

/// Test configuration for property-based tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn keys_are_short_and_in_alphabet() {
        let mut runner = TestRunner::default();
        for _ in 0..50 {
            let key = key_strategy().new_tree(&mut runner).unwrap().current();
            assert!(!key.is_empty() && key.len() < 3);
            assert!(key.iter().all(|b| (b'a'..=b'e').contains(b)));
        }
    }

    #[test]
    fn model_application() {
        let mut model = BTreeMap::new();
        UnitOp::Put(b"a".to_vec(), b"1".to_vec()).apply_to_model(&mut model);
        UnitOp::Put(b"b".to_vec(), b"2".to_vec()).apply_to_model(&mut model);
        UnitOp::Delete(b"a".to_vec()).apply_to_model(&mut model);

        assert_eq!(model.len(), 1);
        assert_eq!(model.get(&b"b".to_vec()), Some(&b"2".to_vec()));
        assert_eq!(UnitOp::Delete(b"z".to_vec()).key(), b"z");
    }

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn unit_ops_respect_bound(ops in unit_ops_strategy(10)) {
            prop_assert!(ops.len() < 10);
        }

        #[test]
        fn counter_deltas_stay_small(deltas in counter_deltas_strategy()) {
            prop_assert!(deltas.iter().all(|d| d.abs() < 1_000));
        }
    }
}
