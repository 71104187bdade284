// src/context/security.rs

//! Security helper shared by the run: machine fingerprinting and hashing of
//! sensitive identifiers before they reach logs.

use super::license::HardwareFingerprint;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityContext {
    fingerprint: HardwareFingerprint,
}

impl SecurityContext {
    /// Derive the fingerprint from an ordered list of machine descriptors.
    ///
    /// Descriptors are length-prefixed before hashing so that
    /// `["ab", "c"]` and `["a", "bc"]` yield different fingerprints.
    pub fn from_descriptors<I, S>(descriptors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut hasher = blake3::Hasher::new();
        for d in descriptors {
            let bytes = d.as_ref().as_bytes();
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
        let hex = hasher.finalize().to_hex();
        Self {
            fingerprint: HardwareFingerprint::new(hex.as_str()),
        }
    }

    /// Fingerprint of the current host from whatever the environment exposes.
    pub fn for_current_host() -> Self {
        let host = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .unwrap_or_default();
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_default();
        Self::from_descriptors([
            host.as_str(),
            user.as_str(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        ])
    }

    pub fn fingerprint(&self) -> &HardwareFingerprint {
        &self.fingerprint
    }

    /// Short, non-reversible tag for an identifier (account names, blog ids).
    pub fn redact(&self, value: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.fingerprint.as_str().as_bytes());
        hasher.update(value.as_bytes());
        let hex = hasher.finalize().to_hex();
        hex.as_str()[..12].to_string()
    }
}
