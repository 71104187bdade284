// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::context::MapConfigStore;
use crate::engine::{EngineOptions, RetryPolicy};
use crate::task::{Params, TaskSpec};

/// A run plan exactly as read from TOML, before validation.
///
/// ```toml
/// [engine]
/// concurrency = 1
/// task_timeout_secs = 600
/// inter_task_delay_ms = 500
///
/// [engine.retry]
/// max_attempts = 3
/// initial_delay_ms = 1000
/// backoff_multiplier = 2.0
/// max_delay_ms = 60000
///
/// [settings]
/// neighbor_list_url = "https://blog.example.com/feed"
///
/// [[task]]
/// kind = "visit-neighbors"
/// name = "morning round"
/// params = { count = 10 }
/// ```
///
/// Every section except `[[task]]` is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPlanFile {
    #[serde(default)]
    pub engine: EngineSection,

    /// Read-only key/value settings handed to tasks. Scalars of any type are
    /// accepted and stored as strings.
    #[serde(default)]
    pub settings: BTreeMap<String, toml::Value>,

    /// `[[task]]` entries, in run order.
    #[serde(default, rename = "task")]
    pub tasks: Vec<TaskEntry>,
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,

    /// Human-like pause between consecutive dispatches.
    #[serde(default = "default_inter_task_delay_ms")]
    pub inter_task_delay_ms: u64,

    #[serde(default)]
    pub retry: RetrySection,
}

fn default_concurrency() -> usize {
    1
}

fn default_task_timeout_secs() -> u64 {
    600
}

fn default_inter_task_delay_ms() -> u64 {
    500
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            task_timeout_secs: default_task_timeout_secs(),
            inter_task_delay_ms: default_inter_task_delay_ms(),
            retry: RetrySection::default(),
        }
    }
}

/// `[engine.retry]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    60_000
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// One `[[task]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskEntry {
    pub kind: String,

    #[serde(default)]
    pub name: Option<String>,

    /// Kind-specific parameters, checked when the task is instantiated.
    #[serde(default)]
    pub params: Params,
}

/// A validated run plan.
///
/// Only obtainable through `TryFrom<RawPlanFile>` (see `validate.rs`), so
/// every instance satisfies the plan invariants.
#[derive(Debug, Clone)]
pub struct PlanFile {
    engine: EngineSection,
    settings: BTreeMap<String, String>,
    tasks: Vec<TaskEntry>,
}

impl PlanFile {
    pub(crate) fn new_unchecked(
        engine: EngineSection,
        settings: BTreeMap<String, String>,
        tasks: Vec<TaskEntry>,
    ) -> Self {
        Self {
            engine,
            settings,
            tasks,
        }
    }

    pub fn engine(&self) -> &EngineSection {
        &self.engine
    }

    pub fn settings(&self) -> &BTreeMap<String, String> {
        &self.settings
    }

    pub fn tasks(&self) -> &[TaskEntry] {
        &self.tasks
    }

    /// Override `[engine].concurrency` (e.g. from the command line).
    /// Values below 1 are ignored; values above
    /// [`EngineOptions::MAX_CONCURRENCY`] are capped.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        if concurrency >= 1 {
            self.engine.concurrency = concurrency.min(EngineOptions::MAX_CONCURRENCY);
        }
        self
    }

    pub fn engine_options(&self) -> EngineOptions {
        let retry = &self.engine.retry;
        EngineOptions {
            concurrency: self.engine.concurrency,
            task_timeout: Duration::from_secs(self.engine.task_timeout_secs),
            inter_task_delay: Duration::from_millis(self.engine.inter_task_delay_ms),
            retry: RetryPolicy::new(
                retry.max_attempts,
                Duration::from_millis(retry.initial_delay_ms),
                retry.backoff_multiplier,
                Duration::from_millis(retry.max_delay_ms),
            ),
        }
    }

    /// Task specs in plan order.
    pub fn specs(&self) -> Vec<TaskSpec> {
        self.tasks
            .iter()
            .enumerate()
            .map(|(order, entry)| TaskSpec {
                kind: entry.kind.as_str().into(),
                name: entry.name.clone(),
                parameters: entry.params.clone(),
                order,
            })
            .collect()
    }

    pub fn config_store(&self) -> MapConfigStore {
        MapConfigStore::from(self.settings.clone())
    }
}
