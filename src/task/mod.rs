// src/task/mod.rs

//! Task abstraction.
//!
//! A [`Task`] is one unit of automation work built from a [`TaskSpec`] by the
//! [`TaskFactory`]. Tasks know nothing about each other or about the
//! scheduler: they get a [`TaskEnv`] for the duration of one attempt and hand
//! back a [`TaskResult`].
//!
//! - [`spec`] holds the submitted description and typed parameter access.
//! - [`result`] holds [`TaskResult`] and the internal [`TaskError`].
//! - [`factory`] maps task kinds to constructors.

pub mod factory;
pub mod result;
pub mod spec;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::context::{BrowserProvider, RunContext};
use crate::types::TaskKind;

pub use factory::{CompositeConstructor, TaskConstructor, TaskFactory};
pub use result::{TaskError, TaskResult};
pub use spec::{NESTED_TASKS_KEY, Params, TaskSpec};

/// Boxed future returned by [`Task::execute`].
pub type TaskFuture<'a> = Pin<Box<dyn Future<Output = TaskResult> + Send + 'a>>;

/// A unit of automation work.
///
/// `execute` never fails with an error type: every failure is reported
/// through [`TaskResult::failed`] with a classified [`ErrorKind`](crate::types::ErrorKind).
/// Implementations must observe [`TaskEnv::cancel_token`] at each suspension
/// point and return a `Cancelled` result instead of hanging.
pub trait Task: Send + Sync {
    fn kind(&self) -> &TaskKind;

    /// Whether the task drives the shared browser. Session-bound tasks never
    /// overlap each other.
    fn needs_session(&self) -> bool;

    fn execute<'a>(&'a self, env: &'a TaskEnv) -> TaskFuture<'a>;
}

/// Everything a task may touch during one attempt.
///
/// Built by the scheduler; tasks cannot close or replace the run context
/// they borrow from it.
pub struct TaskEnv {
    context: Arc<RunContext>,
    cancel: CancellationToken,
    index: usize,
    attempt: u32,
    browser: Option<Arc<dyn BrowserProvider>>,
}

impl TaskEnv {
    pub(crate) fn new(
        context: Arc<RunContext>,
        cancel: CancellationToken,
        index: usize,
        attempt: u32,
    ) -> Self {
        Self {
            context,
            cancel,
            index,
            attempt,
            browser: None,
        }
    }

    /// Grant browser access. Only called while the caller holds the session guard.
    pub(crate) fn with_browser(mut self, browser: Arc<dyn BrowserProvider>) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Position of the task in the run queue.
    pub fn index(&self) -> usize {
        self.index
    }

    /// 1-based attempt number.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The browser, if this task claimed the session.
    ///
    /// A task that declared `needs_session() == false` and still asks for the
    /// browser gets a fatal error: the exclusivity contract is broken.
    pub fn browser(&self) -> Result<Arc<dyn BrowserProvider>, TaskError> {
        self.browser.clone().ok_or_else(|| {
            TaskError::fatal("browser requested by a task that did not claim the session")
        })
    }

    pub fn ensure_active(&self) -> Result<(), TaskError> {
        if self.cancel.is_cancelled() {
            Err(TaskError::cancelled())
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration`, waking early with `Cancelled` on cancellation.
    pub async fn pause(&self, duration: Duration) -> Result<(), TaskError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(TaskError::cancelled()),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Await a collaborator call, abandoning it on cancellation.
    pub async fn guard<T, E, F>(&self, fut: F) -> Result<T, TaskError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<TaskError>,
    {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(TaskError::cancelled()),
            res = fut => res.map_err(Into::into),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::env_with;
    use super::*;
    use crate::context::DetachedBrowser;
    use crate::types::ErrorKind;

    #[tokio::test]
    async fn browser_requires_a_session_claim() {
        let env = env_with(None);
        let err = env.browser().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Fatal);

        let env = env_with(Some(Arc::new(DetachedBrowser)));
        assert!(env.browser().is_ok());
    }

    #[tokio::test]
    async fn pause_wakes_on_cancel() {
        let env = env_with(None);
        env.cancel_token().cancel();
        let res = tokio::time::timeout(Duration::from_secs(1), env.pause(Duration::from_secs(60)))
            .await
            .expect("pause should not hang after cancel");
        assert_eq!(res.unwrap_err().kind(), ErrorKind::Cancelled);
        assert!(env.ensure_active().is_err());
    }

    #[tokio::test]
    async fn guard_maps_collaborator_errors() {
        let env = env_with(Some(Arc::new(DetachedBrowser)));
        let browser = env.browser().unwrap();
        let err = env.guard(browser.navigate("https://example.com")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }
}
