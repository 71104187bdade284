// src/context/browser.rs

//! Browser automation seam.
//!
//! The engine never drives a browser itself. It talks to a
//! [`BrowserProvider`] (implemented outside this crate) and wraps it in a
//! [`BrowserSession`], which enforces that at most one task controls the
//! browser at any time.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::types::ErrorKind;

/// Boxed future returned by every [`BrowserProvider`] operation.
pub type BrowserFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BrowserError>> + Send + 'a>>;

/// A DOM element handle as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    /// Provider-specific handle used for `click` / `fill`.
    pub id: String,
    /// Visible text content.
    pub text: String,
    /// `href` attribute, if the element is a link.
    pub href: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrowserError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("no element matches selector '{0}'")]
    ElementNotFound(String),

    #[error("browser action timed out: {0}")]
    Timeout(String),

    #[error("browser session disconnected: {0}")]
    Disconnected(String),
}

impl BrowserError {
    /// Map a provider failure onto the engine's error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BrowserError::Navigation { .. } | BrowserError::Timeout(_) => ErrorKind::Transient,
            BrowserError::ElementNotFound(_) => ErrorKind::Permanent,
            BrowserError::Disconnected(_) => ErrorKind::Fatal,
        }
    }
}

/// Narrow interface over the concrete browser-automation routines.
///
/// Implementations use interior mutability; the engine guarantees that only
/// one task at a time holds the session that exposes a provider.
pub trait BrowserProvider: Send + Sync {
    fn navigate<'a>(&'a self, url: &'a str) -> BrowserFuture<'a, ()>;

    fn find_elements<'a>(&'a self, selector: &'a str) -> BrowserFuture<'a, Vec<Element>>;

    /// Scroll the current page by `distance` pixels (negative scrolls up).
    fn scroll(&self, distance: i32) -> BrowserFuture<'_, ()>;

    fn click<'a>(&'a self, element: &'a Element) -> BrowserFuture<'a, ()>;

    /// Type `text` into an input-like element.
    fn fill<'a>(&'a self, element: &'a Element, text: &'a str) -> BrowserFuture<'a, ()>;

    fn current_url(&self) -> BrowserFuture<'_, String>;

    /// Release the underlying browser. Called once when the run context is torn down.
    fn close(&self) -> BrowserFuture<'_, ()>;
}

/// Provider used when no real browser is attached: every call fails with
/// [`BrowserError::Disconnected`], which is fatal for the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedBrowser;

impl DetachedBrowser {
    fn detached<T: Send + 'static>() -> BrowserFuture<'static, T> {
        Box::pin(async {
            Err(BrowserError::Disconnected(
                "no browser provider is attached".to_string(),
            ))
        })
    }
}

impl BrowserProvider for DetachedBrowser {
    fn navigate<'a>(&'a self, _url: &'a str) -> BrowserFuture<'a, ()> {
        Self::detached()
    }

    fn find_elements<'a>(&'a self, _selector: &'a str) -> BrowserFuture<'a, Vec<Element>> {
        Self::detached()
    }

    fn scroll(&self, _distance: i32) -> BrowserFuture<'_, ()> {
        Self::detached()
    }

    fn click<'a>(&'a self, _element: &'a Element) -> BrowserFuture<'a, ()> {
        Self::detached()
    }

    fn fill<'a>(&'a self, _element: &'a Element, _text: &'a str) -> BrowserFuture<'a, ()> {
        Self::detached()
    }

    fn current_url(&self) -> BrowserFuture<'_, String> {
        Self::detached()
    }

    fn close(&self) -> BrowserFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

/// The single shared browser of a run.
///
/// Holding a [`SessionGuard`] is the only way to reach the provider from a
/// task. Guards are handed out in FIFO order.
pub struct BrowserSession {
    provider: Arc<dyn BrowserProvider>,
    lock: Arc<Mutex<()>>,
    closed: AtomicBool,
}

impl BrowserSession {
    pub fn new(provider: Arc<dyn BrowserProvider>) -> Self {
        Self {
            provider,
            lock: Arc::new(Mutex::new(())),
            closed: AtomicBool::new(false),
        }
    }

    /// Wait for exclusive control of the session.
    pub async fn acquire(&self) -> SessionGuard {
        let guard = Arc::clone(&self.lock).lock_owned().await;
        SessionGuard {
            _guard: guard,
            provider: Arc::clone(&self.provider),
        }
    }

    /// Whether some task currently holds the session.
    pub fn is_held(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the provider. Idempotent: only the first call reaches the provider.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.provider.close().await {
            Ok(()) => debug!("browser session closed"),
            Err(e) => warn!(error = %e, "browser session did not close cleanly"),
        }
    }

    pub(crate) fn provider(&self) -> Arc<dyn BrowserProvider> {
        Arc::clone(&self.provider)
    }
}

impl std::fmt::Debug for BrowserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserSession")
            .field("held", &self.is_held())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Exclusive claim on the browser session. Dropping it releases the session.
pub struct SessionGuard {
    _guard: OwnedMutexGuard<()>,
    provider: Arc<dyn BrowserProvider>,
}

impl SessionGuard {
    pub fn browser(&self) -> Arc<dyn BrowserProvider> {
        Arc::clone(&self.provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_errors_are_classified() {
        let nav = BrowserError::Navigation {
            url: "https://example.com".into(),
            reason: "dns".into(),
        };
        assert_eq!(nav.kind(), ErrorKind::Transient);
        assert_eq!(BrowserError::Timeout("click".into()).kind(), ErrorKind::Transient);
        assert_eq!(BrowserError::ElementNotFound("a".into()).kind(), ErrorKind::Permanent);
        assert_eq!(BrowserError::Disconnected("gone".into()).kind(), ErrorKind::Fatal);
    }

    #[tokio::test]
    async fn session_is_exclusive_and_released_on_drop() {
        let session = BrowserSession::new(Arc::new(DetachedBrowser));
        assert!(!session.is_held());

        let guard = session.acquire().await;
        assert!(session.is_held());
        drop(guard);
        assert!(!session.is_held());
    }

    #[tokio::test]
    async fn detached_browser_fails_fatally() {
        let session = BrowserSession::new(Arc::new(DetachedBrowser));
        let guard = session.acquire().await;
        let err = guard.browser().navigate("https://example.com").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fatal);

        session.close().await;
        session.close().await;
        assert!(session.is_closed());
    }
}
