// src/engine/summary.rs

//! Immutable record of a finished run.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::task::{TaskResult, TaskSpec};
use crate::types::{ErrorKind, TaskKind};

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum TaskOutcome {
    /// The task was instantiated and ran (or failed to instantiate).
    Completed(TaskResult),
    /// The task never ran.
    Skipped { reason: String },
}

/// What happened to one spec of the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskReport {
    index: usize,
    kind: TaskKind,
    name: String,
    attempts: u32,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    elapsed: Duration,
    #[serde(flatten)]
    outcome: TaskOutcome,
}

impl TaskReport {
    pub(crate) fn completed(
        index: usize,
        spec: &TaskSpec,
        attempts: u32,
        elapsed: Duration,
        result: TaskResult,
    ) -> Self {
        Self {
            index,
            kind: spec.kind.clone(),
            name: spec.display_name().to_string(),
            attempts,
            elapsed,
            outcome: TaskOutcome::Completed(result),
        }
    }

    pub(crate) fn skipped(index: usize, spec: &TaskSpec, reason: impl Into<String>) -> Self {
        Self {
            index,
            kind: spec.kind.clone(),
            name: spec.display_name().to_string(),
            attempts: 0,
            elapsed: Duration::ZERO,
            outcome: TaskOutcome::Skipped {
                reason: reason.into(),
            },
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn outcome(&self) -> &TaskOutcome {
        &self.outcome
    }

    pub fn result(&self) -> Option<&TaskResult> {
        match &self.outcome {
            TaskOutcome::Completed(result) => Some(result),
            TaskOutcome::Skipped { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result().is_some_and(TaskResult::is_success)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Skipped { .. })
    }

    /// Error kind of a failed task; `None` on success or skip.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.result().and_then(TaskResult::error_kind)
    }
}

/// Outcome of a whole run, one report per submitted spec in submission order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    run_id: String,
    status: RunStatus,
    reports: Vec<TaskReport>,
    succeeded: usize,
    failed: usize,
    skipped: usize,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    elapsed: Duration,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub(crate) fn new(
        run_id: String,
        status: RunStatus,
        reports: Vec<TaskReport>,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        let succeeded = reports.iter().filter(|r| r.is_success()).count();
        let skipped = reports.iter().filter(|r| r.is_skipped()).count();
        let failed = reports.len() - succeeded - skipped;
        Self {
            run_id,
            status,
            reports,
            succeeded,
            failed,
            skipped,
            elapsed,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn reports(&self) -> &[TaskReport] {
        &self.reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }
}
