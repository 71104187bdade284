// src/tasks/like.rs

use serde_json::json;
use tracing::{debug, info};

use crate::context::{BrowserError, RunContext};
use crate::task::{Task, TaskEnv, TaskError, TaskFuture, TaskResult, TaskSpec};
use crate::types::TaskKind;

use super::navigation::checked_url;
use super::pacing::Pacing;

pub const DEFAULT_LIKE_SELECTOR: &str = "button.like-button:not(.liked)";

/// Click like buttons on a post.
///
/// Parameters: optional `url` (otherwise the current page), `selector`
/// for unliked buttons, `max_likes` (1..=50, default 1) and the pacing range.
/// A page without any matching button is a permanent failure.
#[derive(Debug)]
pub struct LikeTask {
    kind: TaskKind,
    url: Option<String>,
    selector: String,
    max_likes: usize,
    pacing: Pacing,
}

impl LikeTask {
    pub fn build(spec: &TaskSpec, _ctx: &RunContext) -> Result<Box<dyn Task>, TaskError> {
        let params = &spec.parameters;
        let url = params
            .str_opt("url")?
            .map(|u| checked_url("url", u))
            .transpose()?;
        Ok(Box::new(Self {
            kind: spec.kind.clone(),
            url,
            selector: params
                .str_opt("selector")?
                .unwrap_or_else(|| DEFAULT_LIKE_SELECTOR.to_string()),
            max_likes: params.u64_in("max_likes", 1, 1, 50)? as usize,
            pacing: Pacing::from_params(params)?,
        }))
    }

    async fn run(&self, env: &TaskEnv) -> Result<TaskResult, TaskError> {
        let browser = env.browser()?;
        if let Some(url) = &self.url {
            env.guard(browser.navigate(url)).await?;
        }

        let buttons = env.guard(browser.find_elements(&self.selector)).await?;
        if buttons.is_empty() {
            return Err(BrowserError::ElementNotFound(self.selector.clone()).into());
        }

        let mut liked = 0usize;
        for button in buttons.iter().take(self.max_likes) {
            self.pacing.pause(env).await?;
            env.guard(browser.click(button)).await?;
            liked += 1;
            debug!(index = env.index(), element = %button.id, "like clicked");
        }

        info!(index = env.index(), liked, "likes done");
        Ok(TaskResult::ok_with(
            format!("liked {liked} item(s)"),
            json!({ "liked": liked }),
        ))
    }
}

impl Task for LikeTask {
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
