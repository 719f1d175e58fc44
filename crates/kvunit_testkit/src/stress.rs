//! Concurrency stress helpers.
//!
//! Each helper runs many recovery units on several threads against one
//! [`TestEnv`] and reports what happened.

use crate::fixtures::TestEnv;
use kvunit_core::{CoreResult, CounterCell, RecoveryUnit};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total units of work attempted.
    pub total_units: usize,
    /// Units that committed.
    pub committed_units: usize,
    /// Units whose commit failed.
    pub failed_units: usize,
    /// Total duration.
    pub duration: Duration,
    /// Committed units per second.
    pub units_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(committed: usize, failed: usize, duration: Duration) -> Self {
        let units_per_second = if duration.as_secs_f64() > 0.0 {
            committed as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_units: committed + failed,
            committed_units: committed,
            failed_units: failed,
            duration,
            units_per_second,
        }
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Units of work: {}", self.total_units);
        println!("Committed: {}", self.committed_units);
        println!("Failed: {}", self.failed_units);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} units/sec", self.units_per_second);
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent threads.
    pub threads: usize,
    /// Units of work per thread.
    pub units_per_thread: usize,
    /// Counter increments issued inside each unit of work.
    pub increments_per_unit: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            units_per_thread: 250,
            increments_per_unit: 3,
        }
    }
}

fn run_threads<F>(env: &TestEnv, config: &StressConfig, unit: F) -> StressTestResult
where
    F: Fn(&mut RecoveryUnit, usize, usize) -> CoreResult<()> + Sync,
{
    let committed = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let start = Instant::now();

    thread::scope(|scope| {
        for thread_id in 0..config.threads {
            let (committed, failed, unit) = (&committed, &failed, &unit);
            scope.spawn(move || {
                let mut ru = env.recovery_unit();
                for i in 0..config.units_per_thread {
                    if ru.is_poisoned() {
                        ru = env.recovery_unit();
                    }
                    ru.begin_unit_of_work();
                    let outcome = unit(&mut ru, thread_id, i).and_then(|()| ru.commit_unit_of_work());
                    ru.end_unit_of_work();
                    match outcome {
                        Ok(()) => committed.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            });
        }
    });

    let result = StressTestResult::new(
        committed.into_inner(),
        failed.into_inner(),
        start.elapsed(),
    );
    tracing::debug!(
        threads = config.threads,
        committed = result.committed_units,
        failed = result.failed_units,
        "stress run finished"
    );
    result
}

/// Every unit increments one shared counter `increments_per_unit` times by
/// one and writes a marker key.
///
/// With no failures the cell and the persisted counter end at
/// `initial + threads * units_per_thread * increments_per_unit`.
pub fn stress_counter_increments(
    env: &TestEnv,
    cell: &CounterCell,
    counter_key: &[u8],
    config: &StressConfig,
) -> StressTestResult {
    let ns = env.ns.clone();
    run_threads(env, config, |ru, thread_id, i| {
        for _ in 0..config.increments_per_unit {
            ru.increment_counter(counter_key, cell, 1);
        }
        ru.put(&ns, format!("marker-{thread_id}").as_bytes(), &(i as u64).to_be_bytes())
    })
}

/// Every unit writes one key no other unit touches.
pub fn stress_disjoint_writers(env: &TestEnv, config: &StressConfig) -> StressTestResult {
    let ns = env.ns.clone();
    run_threads(env, config, |ru, thread_id, i| {
        let key = format!("t{thread_id:02}-{i:06}");
        ru.put(&ns, key.as_bytes(), key.as_bytes())?;
        // The previous key is not buffered, so this takes a snapshot
        let previous = format!("t{thread_id:02}-{:06}", i.wrapping_sub(1));
        ru.read(&ns, previous.as_bytes()).map(|_| ())
    })
}
