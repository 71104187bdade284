// src/tasks/neighbors.rs

use serde_json::json;
use tracing::{debug, info};

use crate::context::RunContext;
use crate::task::{Task, TaskEnv, TaskError, TaskFuture, TaskResult, TaskSpec};
use crate::types::TaskKind;

use super::navigation::checked_url;
use super::pacing::Pacing;

/// Settings key consulted when the task has no `neighbor_list_url` parameter.
pub const NEIGHBOR_LIST_URL_KEY: &str = "neighbor_list_url";
pub const DEFAULT_LINK_SELECTOR: &str = "a.post-link";

/// Visit recent posts of neighbor blogs.
///
/// Opens the neighbor feed, collects distinct post links (`link_selector`),
/// then visits up to `count` of them (1..=100, default 10), scrolling each
/// `scrolls_per_post` times (default 3). Ends on the last visited post.
#[derive(Debug)]
pub struct VisitNeighborsTask {
    kind: TaskKind,
    list_url: String,
    link_selector: String,
    count: usize,
    scrolls_per_post: u64,
    distance: i32,
    pacing: Pacing,
}

impl VisitNeighborsTask {
    pub fn build(spec: &TaskSpec, ctx: &RunContext) -> Result<Box<dyn Task>, TaskError> {
        let params = &spec.parameters;
        let list_url = match params.str_opt(NEIGHBOR_LIST_URL_KEY)? {
            Some(url) => url,
            None => ctx
                .config()
                .get(NEIGHBOR_LIST_URL_KEY)
                .filter(|u| !u.trim().is_empty())
                .ok_or_else(|| {
                    TaskError::invalid_parameter(
                        NEIGHBOR_LIST_URL_KEY,
                        "is required (as a parameter or a setting)",
                    )
                })?,
        };
        Ok(Box::new(Self {
            kind: spec.kind.clone(),
            list_url: checked_url(NEIGHBOR_LIST_URL_KEY, list_url.trim().to_string())?,
            link_selector: params
                .str_opt("link_selector")?
                .unwrap_or_else(|| DEFAULT_LINK_SELECTOR.to_string()),
            count: params.u64_in("count", 10, 1, 100)? as usize,
            scrolls_per_post: params.u64_in("scrolls_per_post", 3, 0, 50)?,
            distance: params.u64_in("scroll_distance", 600, 1, 5000)? as i32,
            pacing: Pacing::from_params(params)?,
        }))
    }

    async fn run(&self, env: &TaskEnv) -> Result<TaskResult, TaskError> {
        let browser = env.browser()?;
        env.guard(browser.navigate(&self.list_url)).await?;

        let links = env.guard(browser.find_elements(&self.link_selector)).await?;
        let mut targets: Vec<String> = Vec::new();
        for href in links.into_iter().filter_map(|e| e.href) {
            if targets.len() == self.count {
                break;
            }
            if !targets.contains(&href) {
                targets.push(href);
            }
        }

        if targets.is_empty() {
            info!(index = env.index(), "neighbor feed has no posts");
            return Ok(TaskResult::ok_with(
                "no neighbor posts found",
                json!({ "visited": 0, "urls": [] }),
            ));
        }

        let mut visited = Vec::with_capacity(targets.len());
        for url in &targets {
            env.ensure_active()?;
            env.guard(browser.navigate(url)).await?;
            for _ in 0..self.scrolls_per_post {
                self.pacing.pause(env).await?;
                env.guard(browser.scroll(self.distance)).await?;
            }
            debug!(index = env.index(), url = %url, "neighbor post visited");
            visited.push(url.clone());
            self.pacing.pause(env).await?;
        }

        Ok(TaskResult::ok_with(
            format!("visited {} neighbor post(s)", visited.len()),
            json!({ "visited": visited.len(), "urls": visited }),
        ))
    }
}

impl Task for VisitNeighborsTask {
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
    use crate::context::{DetachedBrowser, MapConfigStore, SecurityContext};
    use std::sync::Arc;

    #[test]
    fn list_url_falls_back_to_settings() {
        let bare = RunContext::new(
            Arc::new(DetachedBrowser),
            Arc::new(MapConfigStore::new()),
            SecurityContext::from_descriptors(["t"]),
        );
        let spec = TaskSpec::new(TaskKind::VISIT_NEIGHBORS);
        assert!(VisitNeighborsTask::build(&spec, &bare).is_err());

        let configured = RunContext::new(
            Arc::new(DetachedBrowser),
            Arc::new(MapConfigStore::new().with(NEIGHBOR_LIST_URL_KEY, "https://blog.test/feed")),
            SecurityContext::from_descriptors(["t"]),
        );
        assert!(VisitNeighborsTask::build(&spec, &configured).is_ok());
    }
}
