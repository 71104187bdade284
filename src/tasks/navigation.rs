// src/tasks/navigation.rs

//! Session-bound page navigation: `goto-url` and `scroll-read`.
//!
//! Both leave the browser on the last page they visited; the next
//! session-bound task starts from there.

use serde_json::json;
use tracing::debug;

use crate::context::RunContext;
use crate::task::{Task, TaskEnv, TaskError, TaskFuture, TaskResult, TaskSpec};
use crate::types::TaskKind;

use super::pacing::Pacing;

pub(crate) fn checked_url(key: &str, url: String) -> Result<String, TaskError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url)
    } else {
        Err(TaskError::invalid_parameter(
            key,
            format!("'{url}' is not an http(s) URL"),
        ))
    }
}

#[derive(Debug)]
pub struct GotoUrlTask {
    kind: TaskKind,
    url: String,
}

impl GotoUrlTask {
    pub fn build(spec: &TaskSpec, _ctx: &RunContext) -> Result<Box<dyn Task>, TaskError> {
        let url = checked_url("url", spec.parameters.require_str("url")?)?;
        Ok(Box::new(Self {
            kind: spec.kind.clone(),
            url,
        }))
    }

    async fn run(&self, env: &TaskEnv) -> Result<TaskResult, TaskError> {
        let browser = env.browser()?;
        env.guard(browser.navigate(&self.url)).await?;
        let landed = env.guard(browser.current_url()).await?;
        debug!(index = env.index(), url = %landed, "navigation finished");
        Ok(TaskResult::ok_with(
            format!("navigated to {}", self.url),
            json!({ "url": landed }),
        ))
    }
}

impl Task for GotoUrlTask {
    fn kind(&self) -> &TaskKind {
        &self.kind
    }

    fn needs_session(&self) -> bool {
        true
    }

    fn execute<'a>(&'a self, env: &'a TaskEnv) -> TaskFuture<'a> {
        Box::pin(async move { TaskResult::from(self.run(env).await) })
    }
}

/// Scroll through a page at reading speed.
///
/// Parameters: optional `url` (otherwise the current page), `scrolls`
/// (1..=100, default 5), `scroll_distance` in pixels (default 600) and the
/// pacing range.
#[derive(Debug)]
pub struct ScrollReadTask {
    kind: TaskKind,
    url: Option<String>,
    scrolls: u64,
    distance: i32,
    pacing: Pacing,
}

impl ScrollReadTask {
    pub fn build(spec: &TaskSpec, _ctx: &RunContext) -> Result<Box<dyn Task>, TaskError> {
        let params = &spec.parameters;
        let url = params
            .str_opt("url")?
            .map(|u| checked_url("url", u))
            .transpose()?;
        Ok(Box::new(Self {
            kind: spec.kind.clone(),
            url,
            scrolls: params.u64_in("scrolls", 5, 1, 100)?,
            distance: params.u64_in("scroll_distance", 600, 1, 5000)? as i32,
            pacing: Pacing::from_params(params)?,
        }))
    }

    async fn run(&self, env: &TaskEnv) -> Result<TaskResult, TaskError> {
        let browser = env.browser()?;
        if let Some(url) = &self.url {
            env.guard(browser.navigate(url)).await?;
        }
        for _ in 0..self.scrolls {
            env.ensure_active()?;
            env.guard(browser.scroll(self.distance)).await?;
            self.pacing.pause(env).await?;
        }
        Ok(TaskResult::ok_with(
            format!("scrolled {} times", self.scrolls),
            json!({ "scrolls": self.scrolls }),
        ))
    }
}

impl Task for ScrollReadTask {
    fn kind(&self) -> &TaskKind {
        &self.kind
    }

    fn needs_session(&self) -> bool {
        true
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

    #[test]
    fn urls_must_be_http() {
        let ctx = context_with(Arc::new(DetachedBrowser));
        let spec = TaskSpec::new(TaskKind::GOTO_URL).param("url", "ftp://blog");
        assert!(GotoUrlTask::build(&spec, &ctx).is_err());

        let missing = TaskSpec::new(TaskKind::GOTO_URL);
        let err = GotoUrlTask::build(&missing, &ctx).err().unwrap();
        assert!(err.message().contains("url"));

        let scroll = TaskSpec::new(TaskKind::SCROLL_READ).param("scrolls", 2);
        assert!(ScrollReadTask::build(&scroll, &ctx).unwrap().needs_session());
    }
}
