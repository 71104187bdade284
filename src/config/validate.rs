// src/config/validate.rs

use std::collections::BTreeMap;

use crate::config::model::{EngineSection, PlanFile, RawPlanFile};
use crate::engine::EngineOptions;
use crate::errors::{BlogpilotError, Result};

impl TryFrom<RawPlanFile> for PlanFile {
    type Error = BlogpilotError;

    fn try_from(raw: RawPlanFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_tasks(&raw)?;
        validate_engine(&raw.engine)?;
        validate_tasks(&raw)?;
        let settings = flatten_settings(&raw.settings)?;
        Ok(PlanFile::new_unchecked(raw.engine, settings, raw.tasks))
    }
}

fn ensure_has_tasks(plan: &RawPlanFile) -> Result<()> {
    if plan.tasks.is_empty() {
        return Err(BlogpilotError::ConfigError(
            "plan must contain at least one [[task]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_engine(engine: &EngineSection) -> Result<()> {
    if engine.concurrency == 0 {
        return Err(BlogpilotError::ConfigError(
            "[engine].concurrency must be >= 1 (got 0)".to_string(),
        ));
    }
    if engine.concurrency > EngineOptions::MAX_CONCURRENCY {
        return Err(BlogpilotError::ConfigError(format!(
            "[engine].concurrency must be <= {} (got {})",
            EngineOptions::MAX_CONCURRENCY,
            engine.concurrency
        )));
    }
    if engine.task_timeout_secs == 0 {
        return Err(BlogpilotError::ConfigError(
            "[engine].task_timeout_secs must be > 0".to_string(),
        ));
    }

    let retry = &engine.retry;
    if retry.max_attempts == 0 {
        return Err(BlogpilotError::ConfigError(
            "[engine.retry].max_attempts must be >= 1 (got 0)".to_string(),
        ));
    }
    if !(retry.backoff_multiplier >= 1.0 && retry.backoff_multiplier.is_finite()) {
        return Err(BlogpilotError::ConfigError(format!(
            "[engine.retry].backoff_multiplier must be a finite number >= 1.0 (got {})",
            retry.backoff_multiplier
        )));
    }
    if retry.initial_delay_ms > retry.max_delay_ms {
        return Err(BlogpilotError::ConfigError(format!(
            "[engine.retry].initial_delay_ms ({}) must not exceed max_delay_ms ({})",
            retry.initial_delay_ms, retry.max_delay_ms
        )));
    }
    Ok(())
}

fn validate_tasks(plan: &RawPlanFile) -> Result<()> {
    for (index, entry) in plan.tasks.iter().enumerate() {
        if entry.kind.trim().is_empty() {
            return Err(BlogpilotError::ConfigError(format!(
                "[[task]] #{} has an empty `kind`",
                index + 1
            )));
        }
    }
    Ok(())
}

fn flatten_settings(settings: &BTreeMap<String, toml::Value>) -> Result<BTreeMap<String, String>> {
    settings
        .iter()
        .map(|(key, value)| {
            let text = match value {
                toml::Value::String(s) => s.clone(),
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                toml::Value::Datetime(d) => d.to_string(),
                toml::Value::Array(_) | toml::Value::Table(_) => {
                    return Err(BlogpilotError::ConfigError(format!(
                        "[settings].{key} must be a scalar value"
                    )));
                }
            };
            Ok((key.clone(), text))
        })
        .collect()
}
