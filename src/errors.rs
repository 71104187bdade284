// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::context::LicenseError;
use crate::types::{RunState, TaskKind};

#[derive(Error, Debug)]
pub enum BlogpilotError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Unknown task kind '{kind}' at position {index}")]
    UnknownTaskKind { kind: TaskKind, index: usize },

    #[error("License check failed: {0}")]
    License(#[from] LicenseError),

    #[error("Run context error: {0}")]
    Context(String),

    #[error("Scheduler is {actual}, expected {expected}")]
    InvalidState { expected: RunState, actual: RunState },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BlogpilotError>;
