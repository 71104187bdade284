// src/engine/scheduler.rs

//! The run state machine and the dispatch loop.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::{
    ContextLease, ContextProvider, HardwareFingerprint, LicenseVerifier, RunContext,
};
use crate::errors::{BlogpilotError, Result};
use crate::events::{EventBus, RunEvent};
use crate::task::{Task, TaskFactory, TaskResult, TaskSpec};
use crate::types::{ErrorKind, RunState};

use super::EngineOptions;
use super::progress::{ProgressTracker, RunProgress};
use super::summary::{RunStatus, RunSummary, TaskReport};
use super::worker::{RunShared, WorkItem, run_item};

/// Runs an ordered list of task specs against one [`RunContext`].
///
/// ```text
///                 pause / resume
///                  +----------+
///                  v          |
/// Idle --start--> Running <-> Paused --> Completed | Cancelled | Failed
///   ^                                                |
///   +-------------------- reset ---------------------+
/// ```
///
/// Unknown task kinds fail the run before anything executes; a failed
/// license check leaves the scheduler `Idle`. A paused run dispatches
/// nothing new while tasks already in flight run to completion.
pub struct Scheduler {
    factory: Arc<TaskFactory>,
    provider: Arc<dyn ContextProvider>,
    options: EngineOptions,
    bus: Arc<EventBus>,
    license: Option<(Arc<dyn LicenseVerifier>, HardwareFingerprint)>,
    state: Mutex<RunState>,
    cancel: Mutex<CancellationToken>,
    launching: AtomicBool,
    paused: watch::Sender<bool>,
    progress: Arc<ProgressTracker>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state())
            .field("options", &self.options)
            .field("factory", &self.factory)
            .field("license_check", &self.license.is_some())
            .finish_non_exhaustive()
    }
}

struct LaunchGuard<'a>(&'a AtomicBool);

impl Drop for LaunchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Moves a run whose future was dropped out of `Running`/`Paused`, so the
/// scheduler can be reset.
struct ActiveRunGuard<'a>(&'a Scheduler);

impl Drop for ActiveRunGuard<'_> {
    fn drop(&mut self) {
        let scheduler = self.0;
        {
            let mut state = scheduler.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.is_active() {
                warn!(from = %*state, "run abandoned before it finished; marking it cancelled");
                *state = RunState::Cancelled;
                scheduler.cancellation_token().cancel();
            }
        }
        scheduler.paused.send_replace(false);
        scheduler.progress.finish();
    }
}

impl Scheduler {
    pub fn new(
        factory: Arc<TaskFactory>,
        provider: Arc<dyn ContextProvider>,
        options: EngineOptions,
    ) -> Self {
        Self {
            factory,
            provider,
            options,
            bus: Arc::new(EventBus::new()),
            license: None,
            state: Mutex::new(RunState::Idle),
            cancel: Mutex::new(CancellationToken::new()),
            launching: AtomicBool::new(false),
            paused: watch::channel(false).0,
            progress: Arc::new(ProgressTracker::default()),
        }
    }

    /// Publish to an existing bus instead of a private one.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = bus;
        self
    }

    /// Check the license once at the start of every run.
    pub fn with_license(
        mut self,
        verifier: Arc<dyn LicenseVerifier>,
        fingerprint: HardwareFingerprint,
    ) -> Self {
        self.license = Some((verifier, fingerprint));
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Token of the current (or next) run. Cancelling it stops the run:
    /// running tasks are signalled and undispatched ones are skipped.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Works while paused too: undispatched specs are skipped.
    pub fn cancel(&self) {
        self.cancellation_token().cancel();
    }

    /// Stop dispatching new tasks. Tasks in flight, including their retries,
    /// keep running.
    pub fn pause(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != RunState::Running {
            return Err(BlogpilotError::InvalidState {
                expected: RunState::Running,
                actual: *state,
            });
        }
        *state = RunState::Paused;
        self.paused.send_replace(true);
        info!("run paused");
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != RunState::Paused {
            return Err(BlogpilotError::InvalidState {
                expected: RunState::Paused,
                actual: *state,
            });
        }
        *state = RunState::Running;
        self.paused.send_replace(false);
        info!("run resumed");
        Ok(())
    }

    /// Counters of the current run, or of the last one until [`reset`](Self::reset).
    pub fn progress(&self) -> RunProgress {
        self.progress.snapshot(self.state())
    }

    /// Return a finished scheduler to `Idle` with a fresh cancellation token.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.is_active() || self.launching.load(Ordering::SeqCst) {
            return Err(BlogpilotError::InvalidState {
                expected: RunState::Completed,
                actual: *state,
            });
        }
        *state = RunState::Idle;
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = CancellationToken::new();
        self.paused.send_replace(false);
        self.progress.clear();
        debug!("scheduler reset");
        Ok(())
    }

    fn set_state(&self, next: RunState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(from = %*state, to = %next, "scheduler state change");
        *state = next;
    }

    /// Execute `specs` in list order and return the run summary.
    ///
    /// Task failures never surface as `Err`; they are in the summary. `Err`
    /// is reserved for runs that could not start: wrong state, unknown task
    /// kind, license rejection or a context that could not be built.
    pub async fn start(&self, mut specs: Vec<TaskSpec>) -> Result<RunSummary> {
        if self.launching.swap(true, Ordering::SeqCst) {
            return Err(BlogpilotError::InvalidState {
                expected: RunState::Idle,
                actual: RunState::Running,
            });
        }
        let _launch = LaunchGuard(&self.launching);
        let current = self.state();
        if current != RunState::Idle {
            return Err(BlogpilotError::InvalidState {
                expected: RunState::Idle,
                actual: current,
            });
        }

        for (index, spec) in specs.iter_mut().enumerate() {
            spec.order = index;
        }

        if let Err(err) = self.factory.validate(&specs) {
            error!(error = %err, "run rejected");
            self.set_state(RunState::Failed);
            return Err(err);
        }

        if let Some((verifier, fingerprint)) = &self.license {
            let status = verifier.check_valid(fingerprint).await?;
            status.ensure_usable_at(Utc::now())?;
            debug!(expires_at = ?status.expires_at, "license accepted");
        }

        let context = match self.provider.acquire().await {
            Ok(context) => context,
            Err(err) => {
                error!(error = %err, "could not build run context");
                self.set_state(RunState::Failed);
                return Err(match err {
                    BlogpilotError::Context(_) => err,
                    other => BlogpilotError::Context(other.to_string()),
                });
            }
        };
        let lease = ContextLease::new(context);

        let run_token = self.cancellation_token();
        let run_id = new_run_id();
        let started_at = Utc::now();
        let clock = Instant::now();
        self.paused.send_replace(false);
        self.progress.begin(specs.len());
        self.set_state(RunState::Running);
        let _active = ActiveRunGuard(self);

        info!(run_id = %run_id, task_count = specs.len(), "run started");
        self.bus.publish(&RunEvent::RunStarted {
            run_id: run_id.clone(),
            task_count: specs.len(),
        });

        let (slots, fatal) = self.drive(&specs, lease.context(), &run_token).await;
        lease.release().await;

        let cancelled = !fatal
            && run_token.is_cancelled()
            && slots.iter().any(|slot| match slot {
                None => true,
                Some(report) => report.error_kind() == Some(ErrorKind::Cancelled),
            });
        let status = if fatal {
            RunStatus::Failed
        } else if cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };

        let skip_reason = match status {
            RunStatus::Failed => "skipped after a fatal error",
            RunStatus::Cancelled => "skipped because the run was cancelled",
            RunStatus::Completed => "not dispatched",
        };
        let reports: Vec<TaskReport> = slots
            .into_iter()
            .zip(&specs)
            .enumerate()
            .map(|(index, (slot, spec))| {
                slot.unwrap_or_else(|| TaskReport::skipped(index, spec, skip_reason))
            })
            .collect();

        let summary = RunSummary::new(run_id.clone(), status, reports, started_at, clock.elapsed());
        info!(
            run_id = %run_id,
            status = ?status,
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            skipped = summary.skipped(),
            elapsed_ms = summary.elapsed().as_millis() as u64,
            "run finished"
        );

        if status == RunStatus::Cancelled {
            self.bus.publish(&RunEvent::RunCancelled {
                run_id,
                completed_count: summary.len() - summary.skipped(),
            });
        }
        self.set_state(match status {
            RunStatus::Completed => RunState::Completed,
            RunStatus::Cancelled => RunState::Cancelled,
            RunStatus::Failed => RunState::Failed,
        });
        self.bus.publish(&RunEvent::RunFinished {
            summary: Box::new(summary.clone()),
        });

        Ok(summary)
    }

    /// Dispatch specs in order under the concurrency bound and collect
    /// reports by index. Returns the slots and whether a fatal failure
    /// halted the run.
    async fn drive(
        &self,
        specs: &[TaskSpec],
        context: &Arc<RunContext>,
        run_token: &CancellationToken,
    ) -> (Vec<Option<TaskReport>>, bool) {
        let halt = run_token.child_token();
        // Stop stray workers if this future is dropped mid-run.
        let _halt_on_drop = halt.clone().drop_guard();

        let shared = Arc::new(RunShared {
            context: Arc::clone(context),
            halt: halt.clone(),
            bus: Arc::clone(&self.bus),
            retry: self.options.retry.clone(),
            task_timeout: self.options.task_timeout,
            fatal: AtomicBool::new(false),
            progress: Arc::clone(&self.progress),
        });
        let semaphore = Arc::new(Semaphore::new(
            self.options.concurrency.clamp(1, Semaphore::MAX_PERMITS),
        ));
        let mut paused = self.paused.subscribe();
        let (tx, mut rx) = mpsc::channel::<TaskReport>(specs.len().max(1));
        let mut slots: Vec<Option<TaskReport>> = vec![None; specs.len()];

        for (index, spec) in specs.iter().enumerate() {
            if index > 0 && !self.options.inter_task_delay.is_zero() {
                tokio::select! {
                    _ = halt.cancelled() => break,
                    _ = tokio::time::sleep(self.options.inter_task_delay) => {}
                }
            }

            let permit = tokio::select! {
                _ = halt.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            if halt.is_cancelled() || !wait_while_paused(&mut paused, &halt).await {
                break;
            }

            let task: Arc<dyn Task> = match self.factory.create(spec, context) {
                Ok(task) => Arc::from(task),
                Err(err) => {
                    warn!(index, task = %spec.kind, error = %err, "task could not be instantiated");
                    self.bus.publish(&RunEvent::TaskFailed {
                        index,
                        kind: spec.kind.clone(),
                        attempt: 0,
                        error_kind: err.kind(),
                        message: err.message().to_string(),
                        final_attempt: true,
                    });
                    if err.kind().is_fatal() {
                        shared.raise_fatal();
                    }
                    self.progress.record(false);
                    slots[index] = Some(TaskReport::completed(
                        index,
                        spec,
                        0,
                        Duration::ZERO,
                        TaskResult::from_error(err),
                    ));
                    continue;
                }
            };

            // Claimed here, in queue order, so session-bound tasks start in
            // submission order and never overlap.
            let session = if task.needs_session() {
                tokio::select! {
                    _ = halt.cancelled() => break,
                    guard = context.session().acquire() => Some(guard),
                }
            } else {
                None
            };

            debug!(index, task = %spec.kind, session = session.is_some(), "dispatching task");
            let item = WorkItem {
                index,
                spec: spec.clone(),
                task,
                session,
            };
            let tx = tx.clone();
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                let report = run_item(item, shared).await;
                let _ = tx.send(report).await;
                drop(permit);
            });
        }
        drop(tx);

        while let Some(report) = rx.recv().await {
            let index = report.index();
            slots[index] = Some(report);
        }

        (slots, shared.is_fatal())
    }
}

/// Block while the run is paused. Returns `false` if the run was halted
/// meanwhile.
async fn wait_while_paused(paused: &mut watch::Receiver<bool>, halt: &CancellationToken) -> bool {
    loop {
        if !*paused.borrow_and_update() {
            return true;
        }
        debug!("dispatch held while paused");
        tokio::select! {
            _ = halt.cancelled() => return false,
            changed = paused.changed() => {
                if changed.is_err() {
                    return true;
                }
            }
        }
    }
}

fn new_run_id() -> String {
    format!(
        "run-{}-{:04x}",
        Utc::now().format("%Y%m%dT%H%M%S"),
        rand::random::<u16>()
    )
}
