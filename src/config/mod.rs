// src/config/mod.rs

//! Run plan loading and validation.
//!
//! - `model.rs`: the TOML data model (`RawPlanFile`) and the validated `PlanFile`.
//! - `loader.rs`: reading plans from disk.
//! - `validate.rs`: the `RawPlanFile` → `PlanFile` checks.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_plan_path, load_and_validate, load_from_path, load_from_str};
pub use model::{EngineSection, PlanFile, RawPlanFile, RetrySection, TaskEntry};
