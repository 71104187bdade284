// src/task/factory.rs

//! Registry of task constructors, keyed by kind.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::context::RunContext;
use crate::errors::{BlogpilotError, Result};
use crate::task::{Task, TaskError, TaskSpec};
use crate::types::{ErrorKind, TaskKind};

/// Builds a task from its spec. Collaborators are taken from the run context
/// at construction time; parameter problems are reported as a permanent
/// [`TaskError`].
pub type TaskConstructor =
    Arc<dyn Fn(&TaskSpec, &RunContext) -> std::result::Result<Box<dyn Task>, TaskError> + Send + Sync>;

/// Builds a task that contains other tasks. It receives the factory so it
/// can instantiate the specs nested under its `tasks` parameter.
pub type CompositeConstructor = Arc<
    dyn Fn(&TaskSpec, &RunContext, &TaskFactory) -> std::result::Result<Box<dyn Task>, TaskError>
        + Send
        + Sync,
>;

#[derive(Clone)]
enum Constructor {
    Leaf(TaskConstructor),
    Composite(CompositeConstructor),
}

#[derive(Clone, Default)]
pub struct TaskFactory {
    constructors: BTreeMap<TaskKind, Constructor>,
}

impl TaskFactory {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in kind from [`crate::tasks`].
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        crate::tasks::register_builtins(&mut factory);
        factory
    }

    /// Register (or replace) the constructor for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<TaskKind>, constructor: F) -> &mut Self
    where
        F: Fn(&TaskSpec, &RunContext) -> std::result::Result<Box<dyn Task>, TaskError>
            + Send
            + Sync
            + 'static,
    {
        let kind = kind.into();
        debug!(kind = %kind, "registering task kind");
        self.constructors
            .insert(kind, Constructor::Leaf(Arc::new(constructor)));
        self
    }

    /// Register (or replace) a kind whose spec nests other specs.
    pub fn register_composite<F>(&mut self, kind: impl Into<TaskKind>, constructor: F) -> &mut Self
    where
        F: Fn(&TaskSpec, &RunContext, &TaskFactory) -> std::result::Result<Box<dyn Task>, TaskError>
            + Send
            + Sync
            + 'static,
    {
        let kind = kind.into();
        debug!(kind = %kind, "registering composite task kind");
        self.constructors
            .insert(kind, Constructor::Composite(Arc::new(constructor)));
        self
    }

    pub fn is_registered(&self, kind: &TaskKind) -> bool {
        self.constructors.contains_key(kind)
    }

    pub fn registered_kinds(&self) -> Vec<&TaskKind> {
        self.constructors.keys().collect()
    }

    pub fn create(
        &self,
        spec: &TaskSpec,
        ctx: &RunContext,
    ) -> std::result::Result<Box<dyn Task>, TaskError> {
        let constructor = self.constructors.get(&spec.kind).ok_or_else(|| {
            TaskError::new(
                ErrorKind::UnknownTaskKind,
                format!("no constructor registered for '{}'", spec.kind),
            )
        })?;
        match constructor {
            Constructor::Leaf(build) => build(spec, ctx),
            Constructor::Composite(build) => build(spec, ctx, self),
        }
    }

    /// Check every spec's kind before anything runs, including the specs
    /// nested in composite kinds. `index` is the top-level position.
    pub fn validate(&self, specs: &[TaskSpec]) -> Result<()> {
        for (index, spec) in specs.iter().enumerate() {
            self.validate_one(spec, index)?;
        }
        Ok(())
    }

    fn validate_one(&self, spec: &TaskSpec, index: usize) -> Result<()> {
        match self.constructors.get(&spec.kind) {
            None => Err(BlogpilotError::UnknownTaskKind {
                kind: spec.kind.clone(),
                index,
            }),
            Some(Constructor::Leaf(_)) => Ok(()),
            Some(Constructor::Composite(_)) => {
                // Malformed nesting is a parameter error, reported at construction.
                for nested in spec.nested_specs().unwrap_or_default() {
                    self.validate_one(&nested, index)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for TaskFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFactory")
            .field("kinds", &self.registered_kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DetachedBrowser;
    use crate::task::test_support::context_with;

    #[test]
    fn builtins_cover_the_documented_kinds() {
        let factory = TaskFactory::with_builtins();
        for kind in [
            TaskKind::WAIT,
            TaskKind::GOTO_URL,
            TaskKind::SCROLL_READ,
            TaskKind::LIKE,
            TaskKind::VISIT_NEIGHBORS,
            TaskKind::COMMENT,
            TaskKind::LOGIN,
            TaskKind::LOOP,
        ] {
            assert!(factory.is_registered(&TaskKind::new(kind)), "{kind} missing");
        }
    }

    #[test]
    fn validate_reports_first_unknown_kind() {
        let factory = TaskFactory::with_builtins();
        let specs = vec![
            TaskSpec::new("wait"),
            TaskSpec::new("teleport"),
            TaskSpec::new("fly"),
        ];
        match factory.validate(&specs) {
            Err(BlogpilotError::UnknownTaskKind { kind, index }) => {
                assert_eq!(kind.as_str(), "teleport");
                assert_eq!(index, 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn validate_looks_inside_composite_kinds() {
        let factory = TaskFactory::with_builtins();
        let looped = TaskSpec::new(TaskKind::LOOP).param(
            "tasks",
            serde_json::json!([{ "kind": "wait" }, { "kind": "Teleport" }]),
        );
        let specs = vec![TaskSpec::new("wait"), looped];
        match factory.validate(&specs) {
            Err(BlogpilotError::UnknownTaskKind { kind, index }) => {
                assert_eq!(kind.as_str(), "teleport");
                assert_eq!(index, 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn create_surfaces_parameter_errors_as_permanent() {
        let factory = TaskFactory::with_builtins();
        let ctx = context_with(Arc::new(DetachedBrowser));

        let bad = TaskSpec::new(TaskKind::WAIT).param("duration_secs", "soon");
        let err = factory.create(&bad, &ctx).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Permanent);

        let unknown = TaskSpec::new("teleport");
        let err = factory.create(&unknown, &ctx).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::UnknownTaskKind);
    }
}
