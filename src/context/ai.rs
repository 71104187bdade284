// src/context/ai.rs

//! AI comment-generation seam.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ErrorKind;

/// What the generator gets to look at when writing a comment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRequest {
    pub post_url: String,
    pub post_title: String,
    pub post_excerpt: String,
    /// Optional style hint ("friendly", "short", ...).
    pub tone: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AiError {
    #[error("comment generator is rate limited: {0}")]
    RateLimited(String),

    #[error("comment generator quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("comment generation failed: {0}")]
    Other(String),
}

impl AiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AiError::RateLimited(_) => ErrorKind::Transient,
            AiError::QuotaExceeded(_) => ErrorKind::Fatal,
            AiError::Other(_) => ErrorKind::Permanent,
        }
    }
}

pub trait CommentGenerator: Send + Sync {
    fn generate_comment<'a>(
        &'a self,
        request: &'a CommentRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, AiError>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_retry_and_quota_is_fatal() {
        assert_eq!(AiError::RateLimited("429".into()).kind(), ErrorKind::Transient);
        assert_eq!(AiError::QuotaExceeded("monthly".into()).kind(), ErrorKind::Fatal);
        assert_eq!(AiError::Other("bad json".into()).kind(), ErrorKind::Permanent);
    }
}
