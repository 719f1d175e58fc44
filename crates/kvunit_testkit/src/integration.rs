//! Cross-crate integration test helpers.
//!
//! Provides a model-checking harness and reusable scenario checks that drive
//! recovery units against a real store and transaction engine.

use crate::fixtures::{recording_recovery_unit, EventLog, RecordingChange, TestEnv};
use crate::generators::UnitOp;
use kvunit_core::CoreResult;
use kvunit_storage::StoreIterator;
use std::collections::BTreeMap;

/// A test harness that mirrors committed state in an ordered map.
pub struct ModelHarness {
    /// The environment under test.
    pub env: TestEnv,
    /// What the data namespace should contain.
    model: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl ModelHarness {
    /// Creates a harness over an empty environment.
    pub fn new() -> Self {
        Self {
            env: TestEnv::new(),
            model: BTreeMap::new(),
        }
    }

    /// Seeds the store and the model with `entries`.
    pub fn seed(&mut self, entries: &BTreeMap<Vec<u8>, Vec<u8>>) {
        let pairs: Vec<(&[u8], &[u8])> = entries
            .iter()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
            .collect();
        self.env.seed(&pairs);
        self.model
            .extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Runs `ops` in one unit of work, committing it if `commit` is set.
    ///
    /// The model only changes when the unit commits.
    pub fn run_unit(&mut self, ops: &[UnitOp], commit: bool) -> CoreResult<()> {
        let mut ru = self.env.recovery_unit();
        ru.begin_unit_of_work();
        for op in ops {
            op.apply(&mut ru, &self.env.ns)?;
        }
        if commit {
            ru.commit_unit_of_work()?;
            for op in ops {
                op.apply_to_model(&mut self.model);
            }
        }
        ru.end_unit_of_work();
        Ok(())
    }

    /// Returns the model with `ops` applied on top, without changing it.
    pub fn view_with(&self, ops: &[UnitOp]) -> BTreeMap<Vec<u8>, Vec<u8>> {
        let mut view = self.model.clone();
        for op in ops {
            op.apply_to_model(&mut view);
        }
        view
    }

    /// Returns the model.
    pub fn model(&self) -> &BTreeMap<Vec<u8>, Vec<u8>> {
        &self.model
    }

    /// Verifies the store holds exactly the model.
    pub fn verify_all(&self) {
        let expected: Vec<_> = self
            .model
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        assert_eq!(
            self.env.committed_entries(),
            expected,
            "Committed state diverged from model"
        );
    }
}

impl Default for ModelHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Isolation scenarios.
pub mod isolation {
    use super::*;

    /// A unit whose snapshot predates a commit sees none of its writes; a
    /// unit started afterwards sees all of them.
    pub fn check_commit_atomicity(env: &TestEnv) {
        let mut reader = env.recovery_unit();
        reader.begin_unit_of_work();
        assert_eq!(reader.read(&env.ns, b"k1").expect("read"), None);

        let mut writer = env.recovery_unit();
        writer.begin_unit_of_work();
        writer.put(&env.ns, b"k1", b"v1").expect("put");
        writer.put(&env.ns, b"k2", b"v2").expect("put");
        writer.commit_unit_of_work().expect("commit");
        writer.end_unit_of_work();

        assert_eq!(reader.read(&env.ns, b"k1").expect("read"), None);
        assert_eq!(reader.read(&env.ns, b"k2").expect("read"), None);
        reader.end_unit_of_work();

        let mut fresh = env.recovery_unit();
        fresh.begin_unit_of_work();
        assert_eq!(fresh.read(&env.ns, b"k1").expect("read"), Some(b"v1".to_vec()));
        assert_eq!(fresh.read(&env.ns, b"k2").expect("read"), Some(b"v2".to_vec()));
        fresh.end_unit_of_work();
    }
}

/// Ordering scenarios checked through recording wrappers.
pub mod ordering {
    use super::*;

    /// The tracker records the version identity before the snapshot exists.
    pub fn check_tracker_before_snapshot(env: &TestEnv) {
        let log = EventLog::new();
        let mut ru = recording_recovery_unit(env, &log);
        ru.begin_unit_of_work();
        ru.read(&env.ns, b"k").expect("read");

        let record = log.position("tracker:record").expect("tracker recorded");
        let snapshot = log.position("store:snapshot").expect("snapshot taken");
        assert!(record < snapshot, "events: {:?}", log.events());
        ru.end_unit_of_work();
    }

    /// The tracker hears about a commit only after the store applied it, and
    /// commit hooks run after both.
    pub fn check_write_before_tracker_commit(env: &TestEnv) {
        let log = EventLog::new();
        let mut ru = recording_recovery_unit(env, &log);
        ru.begin_unit_of_work();
        ru.put(&env.ns, b"k", b"v").expect("put");
        ru.register_change(RecordingChange::boxed(&log, "hook"));
        ru.commit_unit_of_work().expect("commit");

        let write = log.position("store:write").expect("batch written");
        let commit = log.position("tracker:commit").expect("tracker committed");
        let hook = log.position("commit:hook").expect("hook fired");
        assert!(write < commit && commit < hook, "events: {:?}", log.events());
        ru.end_unit_of_work();
    }
}

/// Teardown scenarios.
pub mod teardown {
    use super::*;

    /// Ending at depth zero twice releases the snapshot once and rolls back
    /// each hook once.
    pub fn check_idempotent_teardown(env: &TestEnv) {
        let log = EventLog::new();
        let mut ru = recording_recovery_unit(env, &log);
        ru.begin_unit_of_work();
        ru.read(&env.ns, b"k").expect("read");
        ru.register_change(RecordingChange::boxed(&log, "a"));
        ru.register_change(RecordingChange::boxed(&log, "b"));

        ru.end_unit_of_work();
        ru.end_unit_of_work();

        assert_eq!(log.count("store:release"), 1);
        assert_eq!(log.count("rollback:a"), 1);
        assert_eq!(log.count("rollback:b"), 1);
        assert!(log.position("rollback:b") < log.position("rollback:a"));
        assert!(ru.is_clean());
        assert_eq!(env.store.live_snapshot_count(), 0);
    }
}

/// Collects what an iterator yields from its first entry.
pub fn scan(mut iter: Box<dyn StoreIterator>) -> Vec<(Vec<u8>, Vec<u8>)> {
    iter.seek_to_first();
    iter.collect_remaining()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::{
        counter_deltas_strategy, seed_strategy, unit_ops_strategy, PropTestConfig,
    };
    use kvunit_core::{decode_counter_value, CounterCell, OperationContext, RecordId};
    use proptest::prelude::*;

    #[test]
    fn test_commit_atomicity() {
        crate::init_test_tracing();
        isolation::check_commit_atomicity(&TestEnv::new());
    }

    #[test]
    fn test_tracker_before_snapshot() {
        ordering::check_tracker_before_snapshot(&TestEnv::new());
    }

    #[test]
    fn test_write_before_tracker_commit() {
        ordering::check_write_before_tracker_commit(&TestEnv::new());
    }

    #[test]
    fn test_idempotent_teardown() {
        teardown::check_idempotent_teardown(&TestEnv::new());
    }

    #[test]
    fn test_read_your_writes_leaves_store_untouched() {
        let env = TestEnv::new();
        env.seed(&[(b"k", b"old")]);

        let mut ru = env.recovery_unit();
        ru.begin_unit_of_work();
        ru.put(&env.ns, b"k", b"new").unwrap();
        assert_eq!(ru.read(&env.ns, b"k").unwrap(), Some(b"new".to_vec()));
        assert_eq!(env.committed(b"k"), Some(b"old".to_vec()));

        ru.delete(&env.ns, b"k").unwrap();
        assert_eq!(ru.read(&env.ns, b"k").unwrap(), None);
        ru.end_unit_of_work();

        assert_eq!(env.committed(b"k"), Some(b"old".to_vec()));
    }

    #[test]
    fn test_nesting_transparency() {
        let flat = TestEnv::new();
        let mut ru = flat.recovery_unit();
        ru.begin_unit_of_work();
        ru.put(&flat.ns, b"k", b"v").unwrap();
        ru.commit_unit_of_work().unwrap();
        ru.end_unit_of_work();

        let nested = TestEnv::new();
        let log = EventLog::new();
        let mut ru = recording_recovery_unit(&nested, &log);
        ru.begin_unit_of_work();
        ru.begin_unit_of_work();
        ru.put(&nested.ns, b"k", b"v").unwrap();
        ru.commit_unit_of_work().unwrap();
        assert_eq!(log.count("store:write"), 0);
        ru.end_unit_of_work();
        assert!(ru.has_pending_writes());
        ru.commit_unit_of_work().unwrap();
        ru.end_unit_of_work();

        assert_eq!(flat.committed_entries(), nested.committed_entries());
        assert_eq!(log.count("store:write"), 1);
    }

    #[test]
    fn test_abort_discards_in_reverse() {
        let env = TestEnv::new();
        let log = EventLog::new();
        let mut ru = env.recovery_unit();
        ru.begin_unit_of_work();
        ru.put(&env.ns, b"k", b"v").unwrap();
        ru.register_change(RecordingChange::boxed(&log, "first"));
        ru.register_change(RecordingChange::boxed(&log, "second"));
        ru.end_unit_of_work();

        assert_eq!(env.committed(b"k"), None);
        assert_eq!(log.events(), vec!["rollback:second", "rollback:first"]);
    }

    #[test]
    fn test_counter_aggregation() {
        let env = TestEnv::new();
        let cell = CounterCell::new(40);
        let mut ru = env.recovery_unit();
        ru.begin_unit_of_work();
        ru.increment_counter(b"numRecords", &cell, 3);
        ru.increment_counter(b"numRecords", &cell, -1);
        assert_eq!(ru.delta_counter(b"numRecords"), 2);
        assert_eq!(cell.get(), 40);

        ru.commit_unit_of_work().unwrap();
        ru.end_unit_of_work();

        assert_eq!(cell.get(), 42);
        let stored = env.committed_internal(b"numRecords").unwrap();
        assert_eq!(decode_counter_value(&stored), Some(42));
    }

    #[test]
    fn test_failed_commit_keeps_store_and_rolls_back() {
        let env = TestEnv::new();
        let log = EventLog::new();
        let mut ru = env.recovery_unit();
        env.store.fail_next_writes(1);

        ru.begin_unit_of_work();
        ru.put(&env.ns, b"k", b"v").unwrap();
        ru.register_change(RecordingChange::boxed(&log, "hook"));
        let err = ru.commit_unit_of_work().unwrap_err();
        assert!(err.is_fatal());
        ru.end_unit_of_work();

        assert_eq!(env.committed(b"k"), None);
        assert_eq!(log.events(), vec!["rollback:hook"]);
        assert!(ru.is_poisoned());
        assert_eq!(env.store.live_snapshot_count(), 0);
    }

    #[test]
    fn test_operation_context_drives_unit_of_work() {
        let env = TestEnv::new();
        let mut ctx = OperationContext::new(7, env.recovery_unit());
        {
            let mut uow = ctx.unit_of_work();
            uow.put(&env.ns, b"k", b"v").unwrap();
            uow.set_oplog_read_till(RecordId(12));
            uow.commit().unwrap();
        }
        assert_eq!(ctx.recovery_unit().depth(), 0);
        assert_eq!(ctx.recovery_unit().oplog_read_till(), Some(RecordId(12)));
        assert_eq!(env.committed(b"k"), Some(b"v".to_vec()));
    }

    #[test]
    fn test_harness_tracks_commits_only() {
        let mut harness = ModelHarness::new();
        let ops = vec![
            UnitOp::Put(b"a".to_vec(), b"1".to_vec()),
            UnitOp::Put(b"b".to_vec(), b"2".to_vec()),
        ];
        harness.run_unit(&ops, true).unwrap();
        harness
            .run_unit(&[UnitOp::Delete(b"a".to_vec())], false)
            .unwrap();

        assert_eq!(harness.model().len(), 2);
        harness.verify_all();
    }

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn committed_units_match_model(
            seed in seed_strategy(),
            units in prop::collection::vec((unit_ops_strategy(8), any::<bool>()), 1..6),
        ) {
            let mut harness = ModelHarness::new();
            harness.seed(&seed);
            for (ops, commit) in &units {
                harness.run_unit(ops, *commit).unwrap();
            }
            harness.verify_all();
            prop_assert_eq!(harness.env.engine.active_count(), 0);
            prop_assert_eq!(harness.env.store.live_snapshot_count(), 0);
        }

        #[test]
        fn overlay_scan_matches_model(seed in seed_strategy(), ops in unit_ops_strategy(12)) {
            let mut harness = ModelHarness::new();
            harness.seed(&seed);
            let expected: Vec<_> = harness.view_with(&ops).into_iter().collect();

            let env = &harness.env;
            let mut ru = env.recovery_unit();
            ru.begin_unit_of_work();
            for op in &ops {
                op.apply(&mut ru, &env.ns).unwrap();
            }
            let scanned = scan(ru.new_iterator(&env.ns).unwrap());
            prop_assert_eq!(scanned, expected.clone());

            for (key, value) in &expected {
                prop_assert_eq!(ru.read(&env.ns, key).unwrap(), Some(value.clone()));
            }
            ru.end_unit_of_work();
            harness.verify_all();
        }

        #[test]
        fn counter_deltas_sum(deltas in counter_deltas_strategy()) {
            let env = TestEnv::new();
            let cell = CounterCell::new(0);
            let mut ru = env.recovery_unit();
            ru.begin_unit_of_work();
            for delta in &deltas {
                ru.increment_counter(b"c", &cell, *delta);
            }
            let total: i64 = deltas.iter().sum();
            prop_assert_eq!(ru.delta_counter(b"c"), total);
            ru.commit_unit_of_work().unwrap();
            ru.end_unit_of_work();

            prop_assert_eq!(cell.get(), total);
            let stored = env.committed_internal(b"c").and_then(|v| decode_counter_value(&v));
            if deltas.iter().any(|d| *d != 0) {
                prop_assert_eq!(stored, Some(total));
            } else {
                prop_assert_eq!(stored, None);
            }
        }
    }
}
