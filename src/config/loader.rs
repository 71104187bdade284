// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{PlanFile, RawPlanFile};
use crate::errors::Result;

/// Read and deserialize a plan without semantic validation.
///
/// Use [`load_and_validate`] unless you need the raw form.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawPlanFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    debug!(path = %path.display(), bytes = contents.len(), "plan file read");
    load_from_str(&contents)
}

pub fn load_from_str(contents: &str) -> Result<RawPlanFile> {
    let plan: RawPlanFile = toml::from_str(contents)?;
    Ok(plan)
}

/// Read, deserialize and validate a plan.
///
/// Task kinds and parameters are not checked here: kinds are checked by the
/// scheduler against its factory, parameters when each task is built.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<PlanFile> {
    let raw = load_from_path(&path)?;
    PlanFile::try_from(raw)
}

/// `Blogpilot.toml` in the working directory.
pub fn default_plan_path() -> PathBuf {
    PathBuf::from("Blogpilot.toml")
}
