// src/context/license.rs

//! License/entitlement seam, consulted once before a run leaves `Idle`.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable identifier of the machine the engine runs on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HardwareFingerprint(String);

impl HardwareFingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HardwareFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseStatus {
    pub valid: bool,
    /// `None` means the license does not expire.
    pub expires_at: Option<DateTime<Utc>>,
}

impl LicenseStatus {
    /// Check the status against `now`, turning an invalid or expired license
    /// into the matching error.
    pub fn ensure_usable_at(&self, now: DateTime<Utc>) -> Result<(), LicenseError> {
        if !self.valid {
            return Err(LicenseError::Invalid(
                "license was rejected by the verifier".to_string(),
            ));
        }
        match self.expires_at {
            Some(expiry) if expiry <= now => Err(LicenseError::Expired(expiry)),
            _ => Ok(()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LicenseError {
    #[error("license is not valid: {0}")]
    Invalid(String),

    #[error("license expired at {0}")]
    Expired(DateTime<Utc>),

    #[error("license backend unavailable: {0}")]
    Backend(String),
}

pub trait LicenseVerifier: Send + Sync {
    fn check_valid<'a>(
        &'a self,
        fingerprint: &'a HardwareFingerprint,
    ) -> Pin<Box<dyn Future<Output = Result<LicenseStatus, LicenseError>> + Send + 'a>>;
}
