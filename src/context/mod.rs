// src/context/mod.rs

//! Per-run resource context.
//!
//! A [`RunContext`] bundles the long-lived handles every task may need:
//! - the shared [`BrowserSession`] (exclusive, see [`browser`])
//! - the read-only [`ConfigStore`]
//! - the [`SecurityContext`]
//! - an optional [`CommentGenerator`]
//!
//! It is built by a [`ContextProvider`] right before the first task, owned by
//! the scheduler for the run's duration, lent to tasks by reference, and torn
//! down after the last task through a [`ContextLease`].

pub mod ai;
pub mod browser;
pub mod config_store;
pub mod license;
pub mod security;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::Result;

pub use ai::{AiError, CommentGenerator, CommentRequest};
pub use browser::{
    BrowserError, BrowserFuture, BrowserProvider, BrowserSession, DetachedBrowser, Element,
    SessionGuard,
};
pub use config_store::{ConfigStore, MapConfigStore};
pub use license::{HardwareFingerprint, LicenseError, LicenseStatus, LicenseVerifier};
pub use security::SecurityContext;

pub struct RunContext {
    session: BrowserSession,
    config: Arc<dyn ConfigStore>,
    security: SecurityContext,
    comments: Option<Arc<dyn CommentGenerator>>,
}

impl RunContext {
    pub fn new(
        browser: Arc<dyn BrowserProvider>,
        config: Arc<dyn ConfigStore>,
        security: SecurityContext,
    ) -> Self {
        Self {
            session: BrowserSession::new(browser),
            config,
            security,
            comments: None,
        }
    }

    pub fn with_comment_generator(mut self, generator: Arc<dyn CommentGenerator>) -> Self {
        self.comments = Some(generator);
        self
    }

    pub fn session(&self) -> &BrowserSession {
        &self.session
    }

    pub fn config(&self) -> &dyn ConfigStore {
        self.config.as_ref()
    }

    pub fn security(&self) -> &SecurityContext {
        &self.security
    }

    pub fn comment_generator(&self) -> Option<Arc<dyn CommentGenerator>> {
        self.comments.clone()
    }

    /// Release the resources held by this context. Safe to call repeatedly.
    pub async fn release(&self) {
        self.session.close().await;
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("session", &self.session)
            .field("fingerprint", self.security.fingerprint())
            .field("has_comment_generator", &self.comments.is_some())
            .finish_non_exhaustive()
    }
}

/// Builds a fresh [`RunContext`] at the start of every run.
pub trait ContextProvider: Send + Sync {
    fn acquire(&self) -> Pin<Box<dyn Future<Output = Result<RunContext>> + Send + '_>>;
}

/// Provider that assembles each context from the same set of collaborators.
#[derive(Clone)]
pub struct StaticContextProvider {
    browser: Arc<dyn BrowserProvider>,
    config: Arc<dyn ConfigStore>,
    security: SecurityContext,
    comments: Option<Arc<dyn CommentGenerator>>,
}

impl StaticContextProvider {
    pub fn new(
        browser: Arc<dyn BrowserProvider>,
        config: Arc<dyn ConfigStore>,
        security: SecurityContext,
    ) -> Self {
        Self {
            browser,
            config,
            security,
            comments: None,
        }
    }

    pub fn with_comment_generator(mut self, generator: Arc<dyn CommentGenerator>) -> Self {
        self.comments = Some(generator);
        self
    }
}

impl ContextProvider for StaticContextProvider {
    fn acquire(&self) -> Pin<Box<dyn Future<Output = Result<RunContext>> + Send + '_>> {
        Box::pin(async move {
            let mut ctx = RunContext::new(
                Arc::clone(&self.browser),
                Arc::clone(&self.config),
                self.security.clone(),
            );
            if let Some(generator) = &self.comments {
                ctx = ctx.with_comment_generator(Arc::clone(generator));
            }
            Ok(ctx)
        })
    }
}

/// Scoped ownership of a run's context.
///
/// The scheduler calls [`ContextLease::release`] on every normal exit path.
/// If the run future is dropped before that (the caller aborted it), `Drop`
/// hands the teardown to the Tokio runtime so the browser is still closed.
pub struct ContextLease {
    context: Arc<RunContext>,
    released: bool,
}

impl ContextLease {
    pub fn new(context: RunContext) -> Self {
        Self {
            context: Arc::new(context),
            released: false,
        }
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.context
    }

    pub async fn release(mut self) {
        self.context.release().await;
        self.released = true;
        debug!("run context released");
    }
}

impl Drop for ContextLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let context = Arc::clone(&self.context);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    context.release().await;
                });
            }
            Err(_) => warn!("run context dropped outside a runtime; browser may stay open"),
        }
    }
}
