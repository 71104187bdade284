// src/engine/progress.rs

//! Live counters of the current run, readable while it executes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Serialize, Serializer};
use tokio::time::Instant;

use crate::types::RunState;

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Point-in-time view of a run, from [`Scheduler::progress`](super::Scheduler::progress).
///
/// `completed` counts successes and `failed` counts final failures, so
/// `completed + failed + running + pending == total`. After a halted run
/// `pending` holds the specs that were never dispatched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunProgress {
    pub state: RunState,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub running: usize,
    pub pending: usize,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

impl RunProgress {
    /// Share of tasks that reached a final outcome, 0 to 100.
    pub fn percent_done(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.completed + self.failed) as f64 / self.total as f64 * 100.0
    }

    /// Share of finished tasks that succeeded, 0 to 100.
    pub fn success_rate(&self) -> f64 {
        let finished = self.completed + self.failed;
        if finished == 0 {
            return 0.0;
        }
        self.completed as f64 / finished as f64 * 100.0
    }
}

#[derive(Default)]
struct Clock {
    started: Option<Instant>,
    frozen: Option<Duration>,
}

/// Counters updated by the dispatcher and the workers.
#[derive(Default)]
pub(crate) struct ProgressTracker {
    total: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    running: AtomicUsize,
    clock: Mutex<Clock>,
}

impl ProgressTracker {
    pub fn begin(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
        self.failed.store(0, Ordering::SeqCst);
        self.running.store(0, Ordering::SeqCst);
        *self.clock.lock().unwrap_or_else(PoisonError::into_inner) = Clock {
            started: Some(Instant::now()),
            frozen: None,
        };
    }

    pub fn task_started(&self) {
        self.running.fetch_add(1, Ordering::SeqCst);
    }

    /// A dispatched task reached its final outcome.
    pub fn task_finished(&self, success: bool) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.record(success);
    }

    /// A task reached a final outcome without being dispatched.
    pub fn record(&self, success: bool) {
        let counter = if success { &self.completed } else { &self.failed };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Stop the elapsed clock.
    pub fn finish(&self) {
        let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        if clock.frozen.is_none() {
            clock.frozen = Some(clock.started.map(|s| s.elapsed()).unwrap_or_default());
        }
    }

    pub fn clear(&self) {
        self.total.store(0, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
        self.failed.store(0, Ordering::SeqCst);
        self.running.store(0, Ordering::SeqCst);
        *self.clock.lock().unwrap_or_else(PoisonError::into_inner) = Clock::default();
    }

    pub fn snapshot(&self, state: RunState) -> RunProgress {
        let total = self.total.load(Ordering::SeqCst);
        let completed = self.completed.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        let running = self.running.load(Ordering::SeqCst);
        let elapsed = {
            let clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
            match (clock.frozen, clock.started) {
                (Some(frozen), _) => frozen,
                (None, Some(started)) => started.elapsed(),
                (None, None) => Duration::ZERO,
            }
        };
        RunProgress {
            state,
            total,
            completed,
            failed,
            running,
            pending: total.saturating_sub(completed + failed + running),
            elapsed,
        }
    }
}
