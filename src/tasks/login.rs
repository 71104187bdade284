// src/tasks/login.rs

use std::fmt;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::context::{BrowserError, Element, RunContext};
use crate::task::{Params, Task, TaskEnv, TaskError, TaskFuture, TaskResult, TaskSpec};
use crate::types::{ErrorKind, TaskKind};

use super::navigation::checked_url;
use super::pacing::Pacing;

pub const LOGIN_URL_KEY: &str = "login_url";
pub const USERNAME_KEY: &str = "username";
pub const PASSWORD_KEY: &str = "password";

pub const DEFAULT_USERNAME_SELECTOR: &str = "#id";
pub const DEFAULT_PASSWORD_SELECTOR: &str = "#pw";
pub const DEFAULT_KEEP_LOGIN_SELECTOR: &str = ".keep_check";
pub const DEFAULT_LOGIN_SUBMIT_SELECTOR: &str = "#log\\.login";

/// Sign in through the site's login form.
///
/// `login_url`, `username` and `password` come from the parameters or, when
/// absent, from settings of the same name. Other parameters: `keep_login`
/// (default true), the form selectors, `settle_ms` (wait after submitting,
/// 0..=30000, default 2000) and the pacing range.
///
/// After submitting, the landing URL decides the outcome: still on the login
/// page is a rejected login, a captcha page is reported with
/// `captcha_required`, anything else is success. Both failures are permanent.
pub struct LoginTask {
    kind: TaskKind,
    login_url: String,
    username: String,
    password: String,
    keep_login: bool,
    username_selector: String,
    password_selector: String,
    keep_login_selector: String,
    submit_selector: String,
    settle: Duration,
    pacing: Pacing,
}

impl fmt::Debug for LoginTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginTask")
            .field("login_url", &self.login_url)
            .field("keep_login", &self.keep_login)
            .finish_non_exhaustive()
    }
}

fn param_or_setting(params: &Params, ctx: &RunContext, key: &str) -> Result<String, TaskError> {
    let value = match params.str_opt(key)? {
        Some(value) => Some(value),
        None => ctx.config().get(key),
    };
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| TaskError::invalid_parameter(key, "is required (as a parameter or a setting)"))
}

fn selector(params: &Params, key: &str, default: &str) -> Result<String, TaskError> {
    Ok(params.str_opt(key)?.unwrap_or_else(|| default.to_string()))
}

impl LoginTask {
    pub fn build(spec: &TaskSpec, ctx: &RunContext) -> Result<Box<dyn Task>, TaskError> {
        Ok(Box::new(Self::from_spec(spec, ctx)?))
    }

    fn from_spec(spec: &TaskSpec, ctx: &RunContext) -> Result<Self, TaskError> {
        let params = &spec.parameters;
        let login_url = param_or_setting(params, ctx, LOGIN_URL_KEY)?;
        Ok(Self {
            kind: spec.kind.clone(),
            login_url: checked_url(LOGIN_URL_KEY, login_url.trim().to_string())?,
            username: param_or_setting(params, ctx, USERNAME_KEY)?.trim().to_string(),
            password: param_or_setting(params, ctx, PASSWORD_KEY)?,
            keep_login: params.bool_or("keep_login", true)?,
            username_selector: selector(params, "username_selector", DEFAULT_USERNAME_SELECTOR)?,
            password_selector: selector(params, "password_selector", DEFAULT_PASSWORD_SELECTOR)?,
            keep_login_selector: selector(params, "keep_login_selector", DEFAULT_KEEP_LOGIN_SELECTOR)?,
            submit_selector: selector(params, "submit_selector", DEFAULT_LOGIN_SUBMIT_SELECTOR)?,
            settle: Duration::from_millis(params.u64_in("settle_ms", 2000, 0, 30_000)?),
            pacing: Pacing::from_params(params)?,
        })
    }

    async fn first(&self, env: &TaskEnv, selector: &str) -> Result<Option<Element>, TaskError> {
        let browser = env.browser()?;
        let found = env.guard(browser.find_elements(selector)).await?;
        Ok(found.into_iter().next())
    }

    async fn required(&self, env: &TaskEnv, selector: &str) -> Result<Element, TaskError> {
        self.first(env, selector)
            .await?
            .ok_or_else(|| BrowserError::ElementNotFound(selector.to_string()).into())
    }

    async fn run(&self, env: &TaskEnv) -> Result<TaskResult, TaskError> {
        let browser = env.browser()?;
        let account = env.context().security().redact(&self.username);
        debug!(index = env.index(), account = %account, "opening login page");
        env.guard(browser.navigate(&self.login_url)).await?;

        let username_box = self.required(env, &self.username_selector).await?;
        self.pacing.pause(env).await?;
        env.guard(browser.fill(&username_box, &self.username)).await?;

        let password_box = self.required(env, &self.password_selector).await?;
        self.pacing.pause(env).await?;
        env.guard(browser.fill(&password_box, &self.password)).await?;

        if self.keep_login {
            match self.first(env, &self.keep_login_selector).await? {
                Some(checkbox) => env.guard(browser.click(&checkbox)).await?,
                None => debug!(index = env.index(), "no keep-login checkbox on the form"),
            }
        }

        let submit = self.required(env, &self.submit_selector).await?;
        self.pacing.pause(env).await?;
        env.guard(browser.click(&submit)).await?;
        env.pause(self.settle).await?;

        let landed = env.guard(browser.current_url()).await?;
        if landed.to_lowercase().contains("captcha") {
            warn!(index = env.index(), account = %account, "login stopped at a captcha");
            return Ok(TaskResult::failed(ErrorKind::Permanent, "login requires solving a captcha")
                .with_data(json!({ "captcha_required": true, "url": landed })));
        }
        if landed.starts_with(&self.login_url) {
            warn!(index = env.index(), account = %account, "login rejected");
            return Err(TaskError::permanent(
                "login was rejected; still on the login page",
            ));
        }

        info!(index = env.index(), account = %account, "logged in");
        Ok(TaskResult::ok_with(
            "logged in",
            json!({ "account": account, "url": landed }),
        ))
    }
}

impl Task for LoginTask {
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
