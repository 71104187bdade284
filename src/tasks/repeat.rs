// src/tasks/repeat.rs

use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::task::{
    NESTED_TASKS_KEY, Task, TaskEnv, TaskError, TaskFactory, TaskFuture, TaskResult, TaskSpec,
};
use crate::types::{ErrorKind, TaskKind};

struct Step {
    name: String,
    task: Box<dyn Task>,
}

/// Run a list of nested tasks several rounds in a row.
///
/// Parameters: `tasks` (the nested specs, at least one), `repeat_count`
/// (1..=100, default 1), `delay_between_secs` (pause between rounds, 0..=60,
/// default 2) and `continue_on_error` (default true).
///
/// Nested tasks run on the loop's own attempt: they share its session claim,
/// timeout and cancellation, and are not retried on their own. A fatal or
/// cancelled step ends the loop with that result. Other failures are
/// collected; with `continue_on_error = false` the first one ends the loop
/// with the step's error kind, so a transient step makes the whole loop
/// eligible for a retry. Otherwise a loop with any failed step is a permanent
/// failure carrying the per-step record.
pub struct LoopTask {
    kind: TaskKind,
    steps: Vec<Step>,
    rounds: u64,
    delay: Duration,
    continue_on_error: bool,
}

impl LoopTask {
    pub fn build(
        spec: &TaskSpec,
        ctx: &RunContext,
        factory: &TaskFactory,
    ) -> Result<Box<dyn Task>, TaskError> {
        let params = &spec.parameters;
        let nested = spec.nested_specs()?;
        if nested.is_empty() {
            return Err(TaskError::invalid_parameter(
                NESTED_TASKS_KEY,
                "must list at least one task",
            ));
        }

        let steps = nested
            .iter()
            .enumerate()
            .map(|(position, child)| {
                let task = factory.create(child, ctx).map_err(|err| {
                    TaskError::new(
                        err.kind(),
                        format!(
                            "{NESTED_TASKS_KEY}[{position}] ({}): {}",
                            child.kind,
                            err.message()
                        ),
                    )
                })?;
                Ok(Step {
                    name: child.display_name().to_string(),
                    task,
                })
            })
            .collect::<Result<Vec<_>, TaskError>>()?;

        let delay = params.f64_or("delay_between_secs", 2.0)?;
        if !(0.0..=60.0).contains(&delay) {
            return Err(TaskError::invalid_parameter(
                "delay_between_secs",
                format!("{delay} is outside 0..=60"),
            ));
        }

        Ok(Box::new(Self {
            kind: spec.kind.clone(),
            steps,
            rounds: params.u64_in("repeat_count", 1, 1, 100)?,
            delay: Duration::from_secs_f64(delay),
            continue_on_error: params.bool_or("continue_on_error", true)?,
        }))
    }

    async fn run(&self, env: &TaskEnv) -> Result<TaskResult, TaskError> {
        let mut executed = 0usize;
        let mut succeeded = 0usize;
        let mut failures: Vec<Value> = Vec::new();
        let mut rounds_completed = 0u64;

        for round in 1..=self.rounds {
            if round > 1 && !self.delay.is_zero() {
                env.pause(self.delay).await?;
            }
            for step in &self.steps {
                env.ensure_active()?;
                debug!(index = env.index(), round, step = %step.name, "loop step started");
                let result = step.task.execute(env).await;
                executed += 1;
                if result.is_success() {
                    succeeded += 1;
                    continue;
                }

                let kind = result.error_kind().unwrap_or(ErrorKind::Permanent);
                if matches!(kind, ErrorKind::Fatal | ErrorKind::Cancelled) {
                    return Ok(result);
                }
                warn!(
                    index = env.index(),
                    round,
                    step = %step.name,
                    error_kind = %kind,
                    message = result.message(),
                    "loop step failed"
                );
                failures.push(json!({
                    "task": step.name,
                    "round": round,
                    "error": result.message(),
                }));
                if !self.continue_on_error {
                    let data = record(executed, succeeded, &failures, rounds_completed);
                    return Ok(TaskResult::failed(
                        kind,
                        format!("'{}' failed in round {round}: {}", step.name, result.message()),
                    )
                    .with_data(data));
                }
            }
            rounds_completed = round;
        }

        let data = record(executed, succeeded, &failures, rounds_completed);
        if failures.is_empty() {
            info!(index = env.index(), rounds = rounds_completed, executed, "loop finished");
            Ok(TaskResult::ok_with(
                format!("{rounds_completed} round(s), {succeeded}/{executed} step(s) succeeded"),
                data,
            ))
        } else {
            Ok(TaskResult::failed(
                ErrorKind::Permanent,
                format!("{} of {executed} step run(s) failed", failures.len()),
            )
            .with_data(data))
        }
    }
}

fn record(executed: usize, succeeded: usize, failures: &[Value], rounds: u64) -> Value {
    json!({
        "executed": executed,
        "succeeded": succeeded,
        "failed": failures.len(),
        "failures": failures,
        "rounds_completed": rounds,
    })
}

impl Task for LoopTask {
    fn kind(&self) -> &TaskKind {
        &self.kind
    }

    fn needs_session(&self) -> bool {
        self.steps.iter().any(|step| step.task.needs_session())
    }

    fn execute<'a>(&'a self, env: &'a TaskEnv) -> TaskFuture<'a> {
        Box::pin(async move { TaskResult::from(self.run(env).await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DetachedBrowser;
    use crate::task::test_support::context_with;
    use std::sync::Arc;

    fn looped(tasks: Value) -> TaskSpec {
        TaskSpec::new(TaskKind::LOOP).param(NESTED_TASKS_KEY, tasks)
    }

    #[test]
    fn needs_at_least_one_nested_task() {
        let factory = TaskFactory::with_builtins();
        let ctx = context_with(Arc::new(DetachedBrowser));
        let err = LoopTask::build(&TaskSpec::new(TaskKind::LOOP), &ctx, &factory)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert!(err.message().contains(NESTED_TASKS_KEY));
    }

    #[test]
    fn nested_parameter_errors_name_the_position() {
        let factory = TaskFactory::with_builtins();
        let ctx = context_with(Arc::new(DetachedBrowser));
        let spec = looped(json!([
            { "kind": "wait", "params": { "duration_secs": 1 } },
            { "kind": "wait", "params": { "duration_secs": 0 } }
        ]));
        let err = LoopTask::build(&spec, &ctx, &factory).err().unwrap();
        assert!(err.message().starts_with("tasks[1] (wait)"), "{}", err.message());
    }

    #[test]
    fn session_need_follows_the_steps() {
        let factory = TaskFactory::with_builtins();
        let ctx = context_with(Arc::new(DetachedBrowser));
        let idle = looped(json!([{ "kind": "wait" }]));
        assert!(!LoopTask::build(&idle, &ctx, &factory).unwrap_or_else(|e| panic!("{e}")).needs_session());

        let browsing = looped(json!([
            { "kind": "wait" },
            { "kind": "goto-url", "params": { "url": "https://blog.test/" } }
        ]));
        assert!(LoopTask::build(&browsing, &ctx, &factory).unwrap_or_else(|e| panic!("{e}")).needs_session());
    }

    #[test]
    fn repeat_count_is_bounded() {
        let factory = TaskFactory::with_builtins();
        let ctx = context_with(Arc::new(DetachedBrowser));
        let spec = looped(json!([{ "kind": "wait" }])).param("repeat_count", 101);
        assert!(LoopTask::build(&spec, &ctx, &factory).is_err());
    }
}
