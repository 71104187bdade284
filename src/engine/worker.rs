// src/engine/worker.rs

//! Execution of one dispatched task: attempts, timeout, retry and events.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::{RunContext, SessionGuard};
use crate::events::{EventBus, RunEvent};
use crate::task::{Task, TaskEnv, TaskResult, TaskSpec};
use crate::types::ErrorKind;

use super::progress::ProgressTracker;
use super::retry::RetryPolicy;
use super::summary::TaskReport;

/// State shared by every worker of one run.
pub(crate) struct RunShared {
    pub context: Arc<RunContext>,
    pub halt: CancellationToken,
    pub bus: Arc<EventBus>,
    pub retry: RetryPolicy,
    pub task_timeout: Duration,
    pub fatal: AtomicBool,
    pub progress: Arc<ProgressTracker>,
}

impl RunShared {
    /// Stop dispatching and signal every running task.
    pub fn raise_fatal(&self) {
        self.fatal.store(true, Ordering::SeqCst);
        self.halt.cancel();
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::SeqCst)
    }
}

/// A task ready to run, holding the session if it needs one.
pub(crate) struct WorkItem {
    pub index: usize,
    pub spec: TaskSpec,
    pub task: Arc<dyn Task>,
    pub session: Option<SessionGuard>,
}

/// Run all attempts of `item` and produce its report.
///
/// The session guard (if any) is held for the whole retry sequence and
/// released when the item is dropped at the end of this function.
pub(crate) async fn run_item(item: WorkItem, shared: Arc<RunShared>) -> TaskReport {
    shared.progress.task_started();
    let report = run_attempts(item, &shared).await;
    shared.progress.task_finished(report.is_success());
    report
}

async fn run_attempts(item: WorkItem, shared: &RunShared) -> TaskReport {
    let started = Instant::now();
    let kind = item.spec.kind.clone();
    let browser = item.session.as_ref().map(SessionGuard::browser);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        info!(index = item.index, task = %kind, attempt, "task attempt started");
        shared.bus.publish(&RunEvent::TaskStarted {
            index: item.index,
            kind: kind.clone(),
            attempt,
        });

        let env = TaskEnv::new(
            Arc::clone(&shared.context),
            shared.halt.clone(),
            item.index,
            attempt,
        );
        let env = match &browser {
            Some(b) => env.with_browser(Arc::clone(b)),
            None => env,
        };
        let result = run_attempt(Arc::clone(&item.task), env, shared.task_timeout).await;

        if result.is_success() {
            info!(index = item.index, task = %kind, attempt, "task succeeded");
            shared.bus.publish(&RunEvent::TaskFinished {
                index: item.index,
                kind: kind.clone(),
                attempts: attempt,
                result: result.clone(),
            });
            return TaskReport::completed(item.index, &item.spec, attempt, started.elapsed(), result);
        }

        let error_kind = result.error_kind().unwrap_or(ErrorKind::Permanent);
        let retry = shared.retry.should_retry(error_kind, attempt) && !shared.halt.is_cancelled();
        warn!(
            index = item.index,
            task = %kind,
            attempt,
            error_kind = %error_kind,
            message = result.message(),
            will_retry = retry,
            "task attempt failed"
        );
        shared.bus.publish(&RunEvent::TaskFailed {
            index: item.index,
            kind: kind.clone(),
            attempt,
            error_kind,
            message: result.message().to_string(),
            final_attempt: !retry,
        });

        if error_kind.is_fatal() {
            error!(index = item.index, task = %kind, "fatal failure; halting run");
            shared.raise_fatal();
        }
        if !retry {
            return TaskReport::completed(item.index, &item.spec, attempt, started.elapsed(), result);
        }

        let delay = shared.retry.delay_after(attempt);
        debug!(index = item.index, ?delay, "backing off before retry");
        tokio::select! {
            _ = shared.halt.cancelled() => {
                let cancelled = TaskResult::failed(ErrorKind::Cancelled, "cancelled while waiting to retry");
                shared.bus.publish(&RunEvent::TaskFailed {
                    index: item.index,
                    kind: kind.clone(),
                    attempt,
                    error_kind: ErrorKind::Cancelled,
                    message: cancelled.message().to_string(),
                    final_attempt: true,
                });
                return TaskReport::completed(item.index, &item.spec, attempt, started.elapsed(), cancelled);
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// One attempt on its own Tokio task, so a panic surfaces as a `JoinError`
/// and a timed-out attempt can be aborted before the session is released.
async fn run_attempt(task: Arc<dyn Task>, env: TaskEnv, limit: Duration) -> TaskResult {
    let mut handle = tokio::spawn(async move { task.execute(&env).await });

    match tokio::time::timeout(limit, &mut handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) if join_err.is_panic() => {
            let reason = panic_message(join_err.into_panic());
            TaskResult::failed(ErrorKind::Permanent, format!("task panicked: {reason}"))
        }
        Ok(Err(_)) => TaskResult::failed(ErrorKind::Cancelled, "task was aborted"),
        Err(_) => {
            handle.abort();
            // Wait until the aborted attempt is really gone.
            let _ = handle.await;
            TaskResult::failed(
                ErrorKind::Timeout,
                format!("attempt exceeded {}s", limit.as_secs_f64()),
            )
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
