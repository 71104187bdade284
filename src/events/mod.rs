// src/events/mod.rs

//! In-process lifecycle events.
//!
//! The scheduler publishes a [`RunEvent`] at every state transition; GUIs,
//! run logs and statistics subscribe through the [`EventBus`] without the
//! scheduler knowing about them.
//!
//! Delivery is synchronous, on the publishing task, in subscription order.
//! With `concurrency > 1` events of different tasks interleave in the order
//! their transitions happened; per task the order is always
//! `task-started` → (`task-failed` → `task-started`)* → `task-finished` or a
//! final `task-failed`.

pub mod sink;

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tracing::{trace, warn};

use crate::engine::RunSummary;
use crate::task::TaskResult;
use crate::types::{ErrorKind, TaskKind};

pub use sink::{JsonLinesLog, RunStatistics, StatisticsSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        task_count: usize,
    },
    TaskStarted {
        index: usize,
        kind: TaskKind,
        attempt: u32,
    },
    TaskFinished {
        index: usize,
        kind: TaskKind,
        attempts: u32,
        result: TaskResult,
    },
    TaskFailed {
        index: usize,
        kind: TaskKind,
        attempt: u32,
        error_kind: ErrorKind,
        message: String,
        /// No further attempt follows.
        #[serde(rename = "final")]
        final_attempt: bool,
    },
    RunFinished {
        summary: Box<RunSummary>,
    },
    RunCancelled {
        run_id: String,
        completed_count: usize,
    },
}

impl RunEvent {
    pub fn name(&self) -> EventName {
        match self {
            RunEvent::RunStarted { .. } => EventName::RunStarted,
            RunEvent::TaskStarted { .. } => EventName::TaskStarted,
            RunEvent::TaskFinished { .. } => EventName::TaskFinished,
            RunEvent::TaskFailed { .. } => EventName::TaskFailed,
            RunEvent::RunFinished { .. } => EventName::RunFinished,
            RunEvent::RunCancelled { .. } => EventName::RunCancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventName {
    RunStarted,
    TaskStarted,
    TaskFinished,
    TaskFailed,
    RunFinished,
    RunCancelled,
}

impl EventName {
    pub fn as_str(self) -> &'static str {
        match self {
            EventName::RunStarted => "run-started",
            EventName::TaskStarted => "task-started",
            EventName::TaskFinished => "task-finished",
            EventName::TaskFailed => "task-failed",
            EventName::RunFinished => "run-finished",
            EventName::RunCancelled => "run-cancelled",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type EventHandler = Arc<dyn Fn(&RunEvent) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    filter: Option<EventName>,
    handler: EventHandler,
}

/// Synchronous publish/subscribe hub.
///
/// A failing or panicking handler is logged and skipped; it never stops
/// delivery to the others and never reaches the publisher.
#[derive(Default)]
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `handler` for every event named `name`.
    pub fn subscribe<F>(&self, name: EventName, handler: F) -> SubscriptionId
    where
        F: Fn(&RunEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add(Some(name), Arc::new(handler))
    }

    /// Call `handler` for every event.
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&RunEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add(None, Arc::new(handler))
    }

    /// Returns `false` if the id was not (or no longer) subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn publish(&self, event: &RunEvent) {
        let name = event.name();
        // Snapshot so handlers may (un)subscribe while we deliver.
        let targets: Vec<(SubscriptionId, EventHandler)> = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.filter.is_none_or(|f| f == name))
            .map(|s| (s.id, Arc::clone(&s.handler)))
            .collect();

        trace!(event = %name, subscribers = targets.len(), "publishing");

        for (id, handler) in targets {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(event = %name, subscription = id.0, error = %err, "event handler failed");
                }
                Err(_) => {
                    warn!(event = %name, subscription = id.0, "event handler panicked");
                }
            }
        }
    }

    fn add(&self, filter: Option<EventName>, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription {
                id,
                filter,
                handler,
            });
        id
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn started(index: usize) -> RunEvent {
        RunEvent::TaskStarted {
            index,
            kind: TaskKind::new("wait"),
            attempt: 1,
        }
    }

    #[test]
    fn delivers_in_subscription_order_with_filters() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = Arc::clone(&seen);
        bus.subscribe(EventName::TaskStarted, move |_| {
            s.lock().unwrap().push("first");
            Ok(())
        });
        let s = Arc::clone(&seen);
        bus.subscribe(EventName::RunStarted, move |_| {
            s.lock().unwrap().push("never");
            Ok(())
        });
        let s = Arc::clone(&seen);
        bus.subscribe_all(move |_| {
            s.lock().unwrap().push("all");
            Ok(())
        });

        bus.publish(&started(0));
        assert_eq!(*seen.lock().unwrap(), vec!["first", "all"]);
    }

    #[test]
    fn failing_and_panicking_handlers_are_isolated() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));

        bus.subscribe_all(|_| anyhow::bail!("sink offline"));
        bus.subscribe_all(|_| panic!("bad handler"));
        let c = Arc::clone(&count);
        bus.subscribe_all(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish(&started(0));
        bus.publish(&started(1));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn handlers_may_unsubscribe_during_publish() {
        let bus = Arc::new(EventBus::new());
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let b = Arc::clone(&bus);
        let sl = Arc::clone(&slot);
        let id = bus.subscribe_all(move |_| {
            if let Some(id) = *sl.lock().unwrap() {
                b.unsubscribe(id);
            }
            Ok(())
        });
        *slot.lock().unwrap() = Some(id);

        bus.publish(&started(0));
        assert_eq!(bus.subscriber_count(), 0);
        assert!(!bus.unsubscribe(id));
    }

    #[test]
    fn events_serialise_with_kebab_tags() {
        let event = RunEvent::TaskFailed {
            index: 2,
            kind: TaskKind::new("like"),
            attempt: 1,
            error_kind: ErrorKind::Transient,
            message: "timeout".into(),
            final_attempt: false,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "task-failed");
        assert_eq!(value["error_kind"], "transient");
        assert_eq!(value["final"], false);
        assert_eq!(event.name().to_string(), "task-failed");
    }
}
