// src/task/result.rs

//! Task outcomes and the error type tasks use internally.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::context::{AiError, BrowserError};
use crate::types::ErrorKind;

/// A classified task failure.
///
/// Tasks build these with `?` from collaborator errors and the engine turns
/// them into a failed [`TaskResult`]; they never escape `execute`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct TaskError {
    kind: ErrorKind,
    message: String,
}

impl TaskError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permanent, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "cancellation requested")
    }

    pub fn invalid_parameter(key: &str, reason: impl AsRef<str>) -> Self {
        Self::permanent(format!("invalid parameter '{key}': {}", reason.as_ref()))
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<BrowserError> for TaskError {
    fn from(err: BrowserError) -> Self {
        TaskError::new(err.kind(), err.to_string())
    }
}

impl From<AiError> for TaskError {
    fn from(err: AiError) -> Self {
        TaskError::new(err.kind(), err.to_string())
    }
}

/// Outcome of one task execution.
///
/// `success == true` exactly when `error_kind` is `None`; the constructors are
/// the only way to build one, so the pair can never disagree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
}

impl TaskResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            error_kind: None,
        }
    }

    pub fn ok_with(message: impl Into<String>, data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::ok(message)
        }
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error_kind: Some(kind),
        }
    }

    pub fn from_error(err: TaskError) -> Self {
        Self::failed(err.kind, err.message)
    }

    /// Attach a payload (e.g. partial counts on a failed run).
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }
}

impl From<Result<TaskResult, TaskError>> for TaskResult {
    fn from(outcome: Result<TaskResult, TaskError>) -> Self {
        outcome.unwrap_or_else(TaskResult::from_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_never_carries_an_error_kind() {
        let ok = TaskResult::ok_with("done", json!({ "visited": 3 }));
        assert!(ok.is_success());
        assert_eq!(ok.error_kind(), None);
        assert_eq!(ok.data(), Some(&json!({ "visited": 3 })));

        let failed = TaskResult::failed(ErrorKind::Permanent, "nope");
        assert!(!failed.is_success());
        assert_eq!(failed.error_kind(), Some(ErrorKind::Permanent));
    }

    #[test]
    fn collaborator_errors_keep_their_classification() {
        let err: TaskError = BrowserError::Disconnected("crashed".into()).into();
        assert_eq!(err.kind(), ErrorKind::Fatal);

        let result: TaskResult = Err::<TaskResult, _>(TaskError::from(AiError::RateLimited(
            "slow down".into(),
        )))
        .into();
        assert_eq!(result.error_kind(), Some(ErrorKind::Transient));
        assert!(result.message().contains("slow down"));
    }

    #[test]
    fn serialised_form_omits_empty_fields() {
        let value = serde_json::to_value(TaskResult::ok("fine")).unwrap();
        assert_eq!(value, json!({ "success": true, "message": "fine" }));
    }
}
