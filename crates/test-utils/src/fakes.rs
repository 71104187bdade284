//! Fake collaborators and a scriptable task kind for engine tests.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;

use blogpilot::context::{
    AiError, BrowserError, BrowserFuture, BrowserProvider, CommentGenerator, CommentRequest,
    ContextProvider, Element, HardwareFingerprint, LicenseError, LicenseStatus, LicenseVerifier,
    RunContext,
};
use blogpilot::errors::{BlogpilotError, Result};
use blogpilot::events::{EventBus, EventName, RunEvent};
use blogpilot::task::{Task, TaskEnv, TaskError, TaskFactory, TaskFuture, TaskResult, TaskSpec};
use blogpilot::types::{ErrorKind, TaskKind};

// ---------------------------------------------------------------------------
// Scripted task
// ---------------------------------------------------------------------------

pub const SCRIPTED_KIND: &str = "scripted";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallyEntry {
    pub index: usize,
    pub attempt: u32,
    pub phase: Phase,
}

/// Shared recorder of what scripted tasks did and how much they overlapped.
#[derive(Debug, Default)]
pub struct Tally {
    entries: Mutex<Vec<TallyEntry>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    session_in_flight: AtomicUsize,
    max_session_in_flight: AtomicUsize,
}

impl Tally {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<TallyEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Indices in the order their first attempt started.
    pub fn start_order(&self) -> Vec<usize> {
        let mut seen = Vec::new();
        for e in self.entries() {
            if e.phase == Phase::Start && !seen.contains(&e.index) {
                seen.push(e.index);
            }
        }
        seen
    }

    pub fn attempts_of(&self, index: usize) -> usize {
        self.entries()
            .iter()
            .filter(|e| e.index == index && e.phase == Phase::Start)
            .count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn max_session_in_flight(&self) -> usize {
        self.max_session_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self, env: &TaskEnv, session: bool) -> InFlight<'_> {
        self.entries.lock().unwrap().push(TallyEntry {
            index: env.index(),
            attempt: env.attempt(),
            phase: Phase::Start,
        });
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if session {
            let now = self.session_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_session_in_flight.fetch_max(now, Ordering::SeqCst);
        }
        InFlight {
            tally: self,
            index: env.index(),
            attempt: env.attempt(),
            session,
        }
    }
}

/// Leaves the tally on drop, so aborted attempts are accounted for too.
struct InFlight<'a> {
    tally: &'a Tally,
    index: usize,
    attempt: u32,
    session: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.tally.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.session {
            self.tally.session_in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        self.tally.entries.lock().unwrap().push(TallyEntry {
            index: self.index,
            attempt: self.attempt,
            phase: Phase::End,
        });
    }
}

/// A task whose behaviour per attempt is given by its parameters.
///
/// - `outcomes`: one of `ok`, `transient`, `permanent`, `fatal`, `panic`,
///   `hang` (ignores cancellation) per attempt; the last entry repeats.
/// - `delay_ms`: cancellable work time before the outcome (default 0).
/// - `session`: claim the browser session and navigate once per attempt.
pub struct ScriptedTask {
    kind: TaskKind,
    outcomes: Vec<String>,
    delay: Duration,
    session: bool,
    tally: Arc<Tally>,
}

impl ScriptedTask {
    pub fn register(factory: &mut TaskFactory, tally: Arc<Tally>) {
        factory.register(SCRIPTED_KIND, move |spec: &TaskSpec, _ctx: &RunContext| {
            let task = ScriptedTask::from_spec(spec, Arc::clone(&tally))?;
            Ok(Box::new(task) as Box<dyn Task>)
        });
    }

    fn from_spec(spec: &TaskSpec, tally: Arc<Tally>) -> std::result::Result<Self, TaskError> {
        let mut outcomes = spec.parameters.str_list("outcomes")?;
        if outcomes.is_empty() {
            outcomes.push("ok".to_string());
        }
        Ok(Self {
            kind: spec.kind.clone(),
            outcomes,
            delay: Duration::from_millis(spec.parameters.u64_or("delay_ms", 0)?),
            session: spec.parameters.bool_or("session", false)?,
            tally,
        })
    }

    async fn run(&self, env: &TaskEnv) -> std::result::Result<TaskResult, TaskError> {
        let _in_flight = self.tally.enter(env, self.session);
        if self.session {
            let browser = env.browser()?;
            let url = format!("https://scripted.test/{}", env.index());
            env.guard(browser.navigate(&url)).await?;
        }
        if !self.delay.is_zero() {
            env.pause(self.delay).await?;
        }

        let slot = (env.attempt() as usize - 1).min(self.outcomes.len() - 1);
        match self.outcomes[slot].as_str() {
            "ok" => Ok(TaskResult::ok_with(
                format!("task {} ok", env.index()),
                json!({ "index": env.index(), "attempt": env.attempt() }),
            )),
            "transient" => Err(TaskError::transient("scripted transient failure")),
            "permanent" => Err(TaskError::permanent("scripted permanent failure")),
            "fatal" => Err(TaskError::fatal("scripted fatal failure")),
            "panic" => panic!("scripted panic"),
            "hang" => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            other => Err(TaskError::permanent(format!("unknown script step '{other}'"))),
        }
    }
}

impl Task for ScriptedTask {
    fn kind(&self) -> &TaskKind {
        &self.kind
    }

    fn needs_session(&self) -> bool {
        self.session
    }

    fn execute<'a>(&'a self, env: &'a TaskEnv) -> TaskFuture<'a> {
        Box::pin(async move { TaskResult::from(self.run(env).await) })
    }
}

/// Built-ins plus the `scripted` kind wired to `tally`.
pub fn factory_with_tally(tally: Arc<Tally>) -> Arc<TaskFactory> {
    let mut factory = TaskFactory::with_builtins();
    ScriptedTask::register(&mut factory, tally);
    Arc::new(factory)
}

// ---------------------------------------------------------------------------
// Browser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserCall {
    Navigate(String),
    FindElements(String),
    Scroll(i32),
    Click(String),
    Fill(String, String),
    Close,
}

/// In-memory browser that records every call.
///
/// `find_elements` answers from a selector → elements table (empty for
/// unknown selectors). Clicking an element can move the current URL, the
/// way a submit button does. Navigation can be made to fail a number of
/// times with a transient error, or permanently with `Disconnected`.
#[derive(Debug, Default)]
pub struct RecordingBrowser {
    calls: Mutex<Vec<BrowserCall>>,
    elements: Mutex<HashMap<String, Vec<Element>>>,
    current: Mutex<String>,
    click_redirects: Mutex<HashMap<String, String>>,
    navigation_failures: AtomicUsize,
    disconnected: Mutex<bool>,
}

impl RecordingBrowser {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_elements(self: Arc<Self>, selector: &str, elements: Vec<Element>) -> Arc<Self> {
        self.elements
            .lock()
            .unwrap()
            .insert(selector.to_string(), elements);
        self
    }

    /// Clicking the element with id `element_id` lands on `url`.
    pub fn redirect_on_click(self: Arc<Self>, element_id: &str, url: &str) -> Arc<Self> {
        self.click_redirects
            .lock()
            .unwrap()
            .insert(element_id.to_string(), url.to_string());
        self
    }

    pub fn fail_navigations(&self, times: usize) {
        self.navigation_failures.store(times, Ordering::SeqCst);
    }

    pub fn disconnect(&self) {
        *self.disconnected.lock().unwrap() = true;
    }

    pub fn calls(&self) -> Vec<BrowserCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BrowserCall::Navigate(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == BrowserCall::Close)
            .count()
    }

    fn record(&self, call: BrowserCall) -> std::result::Result<(), BrowserError> {
        self.calls.lock().unwrap().push(call);
        if *self.disconnected.lock().unwrap() {
            return Err(BrowserError::Disconnected("recording browser closed".into()));
        }
        Ok(())
    }
}

/// Shorthand for a link element.
pub fn link(id: &str, href: &str) -> Element {
    Element {
        id: id.to_string(),
        text: id.to_string(),
        href: Some(href.to_string()),
    }
}

/// Shorthand for a plain element with text.
pub fn element(id: &str, text: &str) -> Element {
    Element {
        id: id.to_string(),
        text: text.to_string(),
        href: None,
    }
}

impl BrowserProvider for RecordingBrowser {
    fn navigate<'a>(&'a self, url: &'a str) -> BrowserFuture<'a, ()> {
        Box::pin(async move {
            self.record(BrowserCall::Navigate(url.to_string()))?;
            let remaining = self.navigation_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.navigation_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(BrowserError::Navigation {
                    url: url.to_string(),
                    reason: "connection reset".into(),
                });
            }
            *self.current.lock().unwrap() = url.to_string();
            Ok(())
        })
    }

    fn find_elements<'a>(&'a self, selector: &'a str) -> BrowserFuture<'a, Vec<Element>> {
        Box::pin(async move {
            self.record(BrowserCall::FindElements(selector.to_string()))?;
            Ok(self
                .elements
                .lock()
                .unwrap()
                .get(selector)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn scroll(&self, distance: i32) -> BrowserFuture<'_, ()> {
        Box::pin(async move { self.record(BrowserCall::Scroll(distance)) })
    }

    fn click<'a>(&'a self, element: &'a Element) -> BrowserFuture<'a, ()> {
        Box::pin(async move {
            self.record(BrowserCall::Click(element.id.clone()))?;
            if let Some(url) = self.click_redirects.lock().unwrap().get(&element.id) {
                *self.current.lock().unwrap() = url.clone();
            }
            Ok(())
        })
    }

    fn fill<'a>(&'a self, element: &'a Element, text: &'a str) -> BrowserFuture<'a, ()> {
        Box::pin(async move {
            self.record(BrowserCall::Fill(element.id.clone(), text.to_string()))
        })
    }

    fn current_url(&self) -> BrowserFuture<'_, String> {
        Box::pin(async move { Ok(self.current.lock().unwrap().clone()) })
    }

    fn close(&self) -> BrowserFuture<'_, ()> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(BrowserCall::Close);
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Collects every event published on a bus.
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Mutex<Vec<RunEvent>>,
}

impl EventRecorder {
    pub fn attach(bus: &EventBus) -> Arc<Self> {
        let recorder = Arc::new(Self::default());
        let sink = Arc::clone(&recorder);
        bus.subscribe_all(move |event| {
            sink.events.lock().unwrap().push(event.clone());
            Ok(())
        });
        recorder
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<EventName> {
        self.events().iter().map(RunEvent::name).collect()
    }

    pub fn count(&self, name: EventName) -> usize {
        self.names().iter().filter(|n| **n == name).count()
    }

    /// Task-level events of one task, in publish order.
    pub fn for_task(&self, index: usize) -> Vec<RunEvent> {
        self.events()
            .into_iter()
            .filter(|e| match e {
                RunEvent::TaskStarted { index: i, .. }
                | RunEvent::TaskFinished { index: i, .. }
                | RunEvent::TaskFailed { index: i, .. } => *i == index,
                _ => false,
            })
            .collect()
    }

    /// `(error_kind, final)` of every `task-failed` event.
    pub fn failures(&self) -> Vec<(usize, ErrorKind, bool)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RunEvent::TaskFailed {
                    index,
                    error_kind,
                    final_attempt,
                    ..
                } => Some((index, error_kind, final_attempt)),
                _ => None,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// License, context, comments
// ---------------------------------------------------------------------------

/// License verifier with a fixed answer.
pub struct StaticLicense {
    answer: std::result::Result<LicenseStatus, LicenseError>,
    checks: AtomicUsize,
}

impl StaticLicense {
    pub fn valid() -> Arc<Self> {
        Self::answering(Ok(LicenseStatus {
            valid: true,
            expires_at: None,
        }))
    }

    pub fn expired_at(at: DateTime<Utc>) -> Arc<Self> {
        Self::answering(Ok(LicenseStatus {
            valid: true,
            expires_at: Some(at),
        }))
    }

    pub fn rejected() -> Arc<Self> {
        Self::answering(Ok(LicenseStatus {
            valid: false,
            expires_at: None,
        }))
    }

    pub fn unreachable() -> Arc<Self> {
        Self::answering(Err(LicenseError::Backend("license server unreachable".into())))
    }

    fn answering(answer: std::result::Result<LicenseStatus, LicenseError>) -> Arc<Self> {
        Arc::new(Self {
            answer,
            checks: AtomicUsize::new(0),
        })
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

impl LicenseVerifier for StaticLicense {
    fn check_valid<'a>(
        &'a self,
        _fingerprint: &'a HardwareFingerprint,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<LicenseStatus, LicenseError>> + Send + 'a>>
    {
        Box::pin(async move {
            self.checks.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        })
    }
}

/// Context provider that always fails.
pub struct FailingContextProvider;

impl ContextProvider for FailingContextProvider {
    fn acquire(&self) -> Pin<Box<dyn Future<Output = Result<RunContext>> + Send + '_>> {
        Box::pin(async { Err(BlogpilotError::Context("browser failed to launch".into())) })
    }
}

/// Comment generator returning canned text, or a canned error.
pub struct CannedComments {
    answer: std::result::Result<String, AiError>,
    requests: Mutex<Vec<CommentRequest>>,
}

impl CannedComments {
    pub fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(text.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(err: AiError) -> Arc<Self> {
        Arc::new(Self {
            answer: Err(err),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<CommentRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl CommentGenerator for CannedComments {
    fn generate_comment<'a>(
        &'a self,
        request: &'a CommentRequest,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<String, AiError>> + Send + 'a>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request.clone());
            self.answer.clone()
        })
    }
}
