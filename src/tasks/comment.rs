// src/tasks/comment.rs

//! Leave comments on posts, written by the comment generator or from a template.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info};

use crate::context::{
    BrowserError, BrowserProvider, CommentGenerator, CommentRequest, Element, RunContext,
};
use crate::task::{Task, TaskEnv, TaskError, TaskFuture, TaskResult, TaskSpec};
use crate::types::TaskKind;

use super::navigation::checked_url;
use super::pacing::Pacing;

pub const DEFAULT_COMMENT_BOX_SELECTOR: &str = "textarea.comment-input";
pub const DEFAULT_SUBMIT_SELECTOR: &str = "button.comment-submit";
pub const DEFAULT_TITLE_SELECTOR: &str = ".post-title";
pub const DEFAULT_CONTENT_SELECTOR: &str = ".post-content p";

/// Excerpts handed to the generator are cut to this many characters.
const EXCERPT_CHARS: usize = 500;

pub struct CommentTask {
    kind: TaskKind,
    urls: Vec<String>,
    template: Option<String>,
    generator: Option<Arc<dyn CommentGenerator>>,
    tone: Option<String>,
    max_length: usize,
    comment_box_selector: String,
    submit_selector: String,
    title_selector: String,
    content_selector: String,
    read_time: Pacing,
    pacing: Pacing,
}

impl CommentTask {
    /// Parameters:
    /// - `urls` (list) and/or `post_url`: posts to comment on, at least one.
    /// - `comment_text`: template, `{title}` is replaced with the post title.
    /// - `use_ai` (default true): prefer the run's comment generator.
    /// - `tone`, `max_comment_length` (10..=1000, default 150).
    /// - selectors for the comment box, submit button, title and content.
    /// - `read_time_min_secs` / `read_time_max_secs` (default 30..90) spent
    ///   on each post before writing, plus the usual pacing range.
    pub fn build(spec: &TaskSpec, ctx: &RunContext) -> Result<Box<dyn Task>, TaskError> {
        let params = &spec.parameters;

        let mut urls = params.str_list("urls")?;
        if let Some(single) = params.str_opt("post_url")? {
            urls.push(single);
        }
        if urls.is_empty() {
            return Err(TaskError::invalid_parameter("urls", "at least one post URL is required"));
        }
        let urls = urls
            .into_iter()
            .map(|u| checked_url("urls", u))
            .collect::<Result<Vec<_>, _>>()?;

        let template = params.str_opt("comment_text")?;
        let generator = if params.bool_or("use_ai", true)? {
            ctx.comment_generator()
        } else {
            None
        };
        if generator.is_none() && template.is_none() {
            return Err(TaskError::invalid_parameter(
                "comment_text",
                "is required when no comment generator is available",
            ));
        }

        let selector = |key: &str, default: &str| -> Result<String, TaskError> {
            Ok(params.str_opt(key)?.unwrap_or_else(|| default.to_string()))
        };

        Ok(Box::new(Self {
            kind: spec.kind.clone(),
            urls,
            template,
            generator,
            tone: params.str_opt("tone")?,
            max_length: params.u64_in("max_comment_length", 150, 10, 1000)? as usize,
            comment_box_selector: selector("comment_box_selector", DEFAULT_COMMENT_BOX_SELECTOR)?,
            submit_selector: selector("submit_selector", DEFAULT_SUBMIT_SELECTOR)?,
            title_selector: selector("title_selector", DEFAULT_TITLE_SELECTOR)?,
            content_selector: selector("content_selector", DEFAULT_CONTENT_SELECTOR)?,
            read_time: Pacing::from_keys(
                params,
                ("read_time_min_secs", 30),
                ("read_time_max_secs", 90),
                Duration::from_secs,
            )?,
            pacing: Pacing::from_params(params)?,
        }))
    }

    async fn run(&self, env: &TaskEnv) -> Result<TaskResult, TaskError> {
        let browser = env.browser()?;
        let mut commented = Vec::with_capacity(self.urls.len());

        for url in &self.urls {
            env.ensure_active()?;
            env.guard(browser.navigate(url)).await?;
            self.read_time.pause(env).await?;

            let text = self.compose(env, browser.as_ref(), url).await?;

            let input = first_match(env, browser.as_ref(), &self.comment_box_selector).await?;
            env.guard(browser.fill(&input, &text)).await?;
            self.pacing.pause(env).await?;
            let submit = first_match(env, browser.as_ref(), &self.submit_selector).await?;
            env.guard(browser.click(&submit)).await?;

            debug!(index = env.index(), url = %url, chars = text.chars().count(), "comment posted");
            commented.push(url.clone());
            self.pacing.pause(env).await?;
        }

        info!(index = env.index(), count = commented.len(), "comments done");
        Ok(TaskResult::ok_with(
            format!("commented on {} post(s)", commented.len()),
            json!({ "commented": commented.len(), "urls": commented }),
        ))
    }

    async fn compose(
        &self,
        env: &TaskEnv,
        browser: &dyn BrowserProvider,
        url: &str,
    ) -> Result<String, TaskError> {
        let title = texts(env, browser, &self.title_selector)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let text = match &self.generator {
            Some(generator) => {
                let excerpt: String = texts(env, browser, &self.content_selector)
                    .await?
                    .join("\n")
                    .chars()
                    .take(EXCERPT_CHARS)
                    .collect();
                let request = CommentRequest {
                    post_url: url.to_string(),
                    post_title: title,
                    post_excerpt: excerpt,
                    tone: self.tone.clone(),
                };
                env.guard(generator.generate_comment(&request)).await?
            }
            None => self
                .template
                .as_deref()
                .unwrap_or_default()
                .replace("{title}", &title),
        };

        let text: String = text.trim().chars().take(self.max_length).collect();
        if text.is_empty() {
            return Err(TaskError::permanent(format!("empty comment for {url}")));
        }
        Ok(text)
    }
}

/// Text of every element matching `selector`; a missing element yields none.
async fn texts(
    env: &TaskEnv,
    browser: &dyn BrowserProvider,
    selector: &str,
) -> Result<Vec<String>, TaskError> {
    let lookup = async {
        match browser.find_elements(selector).await {
            Err(BrowserError::ElementNotFound(_)) => Ok(Vec::new()),
            other => other,
        }
    };
    Ok(env
        .guard(lookup)
        .await?
        .into_iter()
        .map(|e| e.text.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect())
}

async fn first_match(
    env: &TaskEnv,
    browser: &dyn BrowserProvider,
    selector: &str,
) -> Result<Element, TaskError> {
    env.guard(browser.find_elements(selector))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| BrowserError::ElementNotFound(selector.to_string()).into())
}

impl Task for CommentTask {
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

impl std::fmt::Debug for CommentTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommentTask")
            .field("urls", &self.urls)
            .field("uses_generator", &self.generator.is_some())
            .field("max_length", &self.max_length)
            .finish_non_exhaustive()
    }
}
