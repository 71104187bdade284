#![allow(dead_code)]

use std::time::Duration;

use serde_json::Value;

use blogpilot::config::{EngineSection, PlanFile, RawPlanFile, TaskEntry};
use blogpilot::engine::{EngineOptions, RetryPolicy};
use blogpilot::task::{Params, TaskSpec};

/// Builder for `TaskSpec`.
pub struct TaskSpecBuilder {
    spec: TaskSpec,
}

impl TaskSpecBuilder {
    pub fn new(kind: &str) -> Self {
        Self {
            spec: TaskSpec::new(kind),
        }
    }

    /// A `scripted` task (see [`crate::fakes::ScriptedTask`]) with the given
    /// per-attempt outcomes.
    pub fn scripted(outcomes: &[&str]) -> Self {
        Self::new(crate::fakes::SCRIPTED_KIND).param(
            "outcomes",
            Value::from(outcomes.iter().map(|o| o.to_string()).collect::<Vec<_>>()),
        )
    }

    pub fn name(mut self, name: &str) -> Self {
        self.spec.name = Some(name.to_string());
        self
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.spec.parameters.insert(key, value);
        self
    }

    pub fn delay_ms(self, ms: u64) -> Self {
        self.param("delay_ms", ms)
    }

    pub fn session(self) -> Self {
        self.param("session", true)
    }

    pub fn build(self) -> TaskSpec {
        self.spec
    }
}

/// Builder for `PlanFile` to simplify test setup.
pub struct PlanFileBuilder {
    plan: RawPlanFile,
}

impl PlanFileBuilder {
    pub fn new() -> Self {
        Self {
            plan: RawPlanFile {
                engine: EngineSection::default(),
                settings: Default::default(),
                tasks: Vec::new(),
            },
        }
    }

    pub fn with_task(mut self, kind: &str, name: Option<&str>, params: Params) -> Self {
        self.plan.tasks.push(TaskEntry {
            kind: kind.to_string(),
            name: name.map(str::to_string),
            params,
        });
        self
    }

    pub fn with_setting(mut self, key: &str, value: &str) -> Self {
        self.plan
            .settings
            .insert(key.to_string(), toml::Value::String(value.to_string()));
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.plan.engine.concurrency = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.plan.engine.retry.max_attempts = n;
        self
    }

    pub fn build(self) -> PlanFile {
        PlanFile::try_from(self.plan).expect("Failed to build valid plan from builder")
    }

    pub fn raw(self) -> RawPlanFile {
        self.plan
    }
}

impl Default for PlanFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine options for tests: no pacing, instant retries, short timeout.
pub fn fast_options(concurrency: usize) -> EngineOptions {
    EngineOptions {
        concurrency,
        task_timeout: Duration::from_secs(2),
        inter_task_delay: Duration::ZERO,
        retry: RetryPolicy::fixed(3, Duration::ZERO),
    }
}
