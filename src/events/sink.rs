// src/events/sink.rs

//! Ready-made event subscribers: a JSON-lines run log and activity counters.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::{EventBus, RunEvent, SubscriptionId};
use crate::errors::Result;

#[derive(Serialize)]
struct LogLine<'a> {
    at: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a RunEvent,
}

/// Appends every event as one JSON object per line.
pub struct JsonLinesLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesLog {
    /// Open (or create) `path` for appending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(path = %path.display(), "run log opened");
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, event: &RunEvent) -> anyhow::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let line = LogLine {
            at: Utc::now(),
            event,
        };
        serde_json::to_writer(&mut *writer, &line).context("serialising run event")?;
        writer.write_all(b"\n")?;
        writer
            .flush()
            .with_context(|| format!("writing run log {}", self.path.display()))?;
        Ok(())
    }

    pub fn attach(self: &Arc<Self>, bus: &EventBus) -> SubscriptionId {
        let log = Arc::clone(self);
        bus.subscribe_all(move |event| log.record(event))
    }
}

/// Point-in-time copy of [`RunStatistics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatisticsSnapshot {
    pub runs_started: u64,
    pub runs_finished: u64,
    pub runs_cancelled: u64,
    pub attempts: u64,
    pub retries: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub succeeded_by_kind: BTreeMap<String, u64>,
}

/// Activity counters fed from the bus, shareable across threads.
#[derive(Debug, Default)]
pub struct RunStatistics {
    runs_started: AtomicU64,
    runs_finished: AtomicU64,
    runs_cancelled: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    tasks_succeeded: AtomicU64,
    tasks_failed: AtomicU64,
    succeeded_by_kind: Mutex<BTreeMap<String, u64>>,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: &RunEvent) {
        let bump = |c: &AtomicU64| {
            c.fetch_add(1, Ordering::Relaxed);
        };
        match event {
            RunEvent::RunStarted { .. } => bump(&self.runs_started),
            RunEvent::RunFinished { .. } => bump(&self.runs_finished),
            RunEvent::RunCancelled { .. } => bump(&self.runs_cancelled),
            RunEvent::TaskStarted { .. } => bump(&self.attempts),
            RunEvent::TaskFailed { final_attempt, .. } => {
                if *final_attempt {
                    bump(&self.tasks_failed);
                } else {
                    bump(&self.retries);
                }
            }
            RunEvent::TaskFinished { kind, .. } => {
                bump(&self.tasks_succeeded);
                *self
                    .succeeded_by_kind
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry(kind.to_string())
                    .or_default() += 1;
            }
        }
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatisticsSnapshot {
            runs_started: load(&self.runs_started),
            runs_finished: load(&self.runs_finished),
            runs_cancelled: load(&self.runs_cancelled),
            attempts: load(&self.attempts),
            retries: load(&self.retries),
            tasks_succeeded: load(&self.tasks_succeeded),
            tasks_failed: load(&self.tasks_failed),
            succeeded_by_kind: self
                .succeeded_by_kind
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    pub fn attach(self: &Arc<Self>, bus: &EventBus) -> SubscriptionId {
        let stats = Arc::clone(self);
        bus.subscribe_all(move |event| {
            stats.record(event);
            Ok(())
        })
    }
}
