// src/tasks/wait.rs

use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::context::RunContext;
use crate::task::{Task, TaskEnv, TaskError, TaskFuture, TaskResult, TaskSpec};
use crate::types::TaskKind;

use super::pacing::jittered;

/// Idle for a while, like a person stepping away between rounds.
///
/// Parameters: `duration_secs` (1..=600, default 10) and `random_variance`
/// (fraction of the duration, 0..=1, default 0.2).
#[derive(Debug)]
pub struct WaitTask {
    kind: TaskKind,
    duration: Duration,
    variance: f64,
}

impl WaitTask {
    pub fn build(spec: &TaskSpec, _ctx: &RunContext) -> Result<Box<dyn Task>, TaskError> {
        let params = &spec.parameters;
        let secs = params.u64_in("duration_secs", 10, 1, 600)?;
        let variance = params.f64_or("random_variance", 0.2)?;
        if !(0.0..=1.0).contains(&variance) {
            return Err(TaskError::invalid_parameter(
                "random_variance",
                format!("{variance} is outside 0..=1"),
            ));
        }
        Ok(Box::new(Self {
            kind: spec.kind.clone(),
            duration: Duration::from_secs(secs),
            variance,
        }))
    }
}

impl Task for WaitTask {
    fn kind(&self) -> &TaskKind {
        &self.kind
    }

    fn needs_session(&self) -> bool {
        false
    }

    fn execute<'a>(&'a self, env: &'a TaskEnv) -> TaskFuture<'a> {
        Box::pin(async move {
            let actual = jittered(self.duration, self.variance);
            debug!(index = env.index(), secs = actual.as_secs_f64(), "waiting");
            match env.pause(actual).await {
                Ok(()) => TaskResult::ok_with(
                    format!("waited {:.1}s", actual.as_secs_f64()),
                    json!({ "actual_duration_secs": actual.as_secs_f64() }),
                ),
                Err(e) => TaskResult::from_error(e),
            }
        })
    }
}
