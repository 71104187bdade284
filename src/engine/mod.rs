// src/engine/mod.rs

//! Run orchestration.
//!
//! - [`scheduler`] owns the run state machine, validates and dispatches specs
//!   in list order and assembles the [`RunSummary`].
//! - [`worker`] runs one dispatched task: attempts on their own Tokio tasks,
//!   per-attempt timeout, retry with backoff, lifecycle events.
//! - [`retry`] holds the backoff policy.
//! - [`progress`] holds the live counters behind [`Scheduler::progress`].
//! - [`summary`] holds the immutable run and per-task reports.
//!
//! Concurrency is bounded by a semaphore sized to
//! [`EngineOptions::concurrency`]. Only tasks that do not need the browser
//! session actually overlap; session-bound tasks queue on the session lock
//! in submission order.

pub mod progress;
pub mod retry;
pub mod scheduler;
pub mod summary;
pub(crate) mod worker;

use std::time::Duration;

pub use progress::RunProgress;
pub use retry::RetryPolicy;
pub use scheduler::Scheduler;
pub use summary::{RunStatus, RunSummary, TaskOutcome, TaskReport};

/// Tuning knobs of the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    /// Upper bound on tasks in flight; at least 1.
    pub concurrency: usize,
    /// Budget of a single attempt.
    pub task_timeout: Duration,
    /// Pause before dispatching each task after the first.
    pub inter_task_delay: Duration,
    pub retry: RetryPolicy,
}

impl EngineOptions {
    /// Largest accepted `concurrency`. Every session-bound task shares one
    /// browser, so more workers than this only queue.
    pub const MAX_CONCURRENCY: usize = 64;
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            task_timeout: Duration::from_secs(600),
            inter_task_delay: Duration::ZERO,
            retry: RetryPolicy::default(),
        }
    }
}
