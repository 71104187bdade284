use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a task kind as it appears in a run plan (`kind = "like"`).
///
/// Kinds are plain identifiers rather than a closed enum so that new kinds can
/// be registered with the [`TaskFactory`](crate::task::TaskFactory) without
/// touching the engine. The built-in kinds are exposed as constants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskKind(String);

impl TaskKind {
    pub const WAIT: &'static str = "wait";
    pub const GOTO_URL: &'static str = "goto-url";
    pub const SCROLL_READ: &'static str = "scroll-read";
    pub const LIKE: &'static str = "like";
    pub const VISIT_NEIGHBORS: &'static str = "visit-neighbors";
    pub const COMMENT: &'static str = "comment";
    pub const LOGIN: &'static str = "login";
    pub const LOOP: &'static str = "loop";

    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskKind {
    fn from(s: &str) -> Self {
        TaskKind::new(s)
    }
}

impl From<String> for TaskKind {
    fn from(s: String) -> Self {
        TaskKind::new(s)
    }
}

/// Failure taxonomy shared by tasks, the retry policy and the event stream.
///
/// - `Transient`: expected to clear up on retry (rate limits, network blips).
/// - `Permanent`: will fail the same way again (bad parameters, missing element).
/// - `Fatal`: invalidates the rest of the run (license revoked, browser gone).
/// - `Timeout`: the attempt exceeded its time budget; retried like `Transient`.
/// - `Cancelled`: the task observed a cancellation request.
/// - `UnknownTaskKind`: the factory had no constructor for the requested kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Transient,
    Permanent,
    Fatal,
    Timeout,
    Cancelled,
    UnknownTaskKind,
}

impl ErrorKind {
    /// Whether the scheduler may run another attempt after this failure.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::Timeout)
    }

    pub fn is_fatal(self) -> bool {
        self == ErrorKind::Fatal
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Permanent => "permanent",
            ErrorKind::Fatal => "fatal",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::UnknownTaskKind => "unknown-task-kind",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "transient" => Ok(ErrorKind::Transient),
            "permanent" => Ok(ErrorKind::Permanent),
            "fatal" => Ok(ErrorKind::Fatal),
            "timeout" => Ok(ErrorKind::Timeout),
            "cancelled" | "canceled" => Ok(ErrorKind::Cancelled),
            "unknown-task-kind" => Ok(ErrorKind::UnknownTaskKind),
            other => Err(format!("invalid error kind: {other}")),
        }
    }
}

/// Lifecycle of a [`Scheduler`](crate::engine::Scheduler).
///
/// `Idle` is initial; `Completed`, `Cancelled` and `Failed` are terminal for a
/// run and require [`Scheduler::reset`](crate::engine::Scheduler::reset)
/// before the next one. `Paused` is a running run that dispatches nothing
/// new until resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl RunState {
    /// A run is in progress, paused or not.
    pub fn is_active(self) -> bool {
        matches!(self, RunState::Running | RunState::Paused)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Cancelled | RunState::Failed
        )
    }
}

impl Default for RunState {
    fn default() -> Self {
        RunState::Idle
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::Completed => "completed",
            RunState::Cancelled => "cancelled",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}
