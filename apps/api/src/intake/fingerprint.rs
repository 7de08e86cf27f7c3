//! Content Fingerprinter: SHA-256 content address of normalized text.
//!
//! The fingerprint is the dedup key for the quota ledger and the only
//! representation of a submission that may be logged or stored.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::intake::normalize::NormalizedText;

/// Hex-encoded SHA-256 digest, always 64 lowercase characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

pub const FINGERPRINT_HEX_LEN: usize = 64;

impl Fingerprint {
    /// Accepts a caller-supplied fingerprint (e.g. from a query string).
    /// Returns `None` unless it is exactly 64 hex characters.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.len() == FINGERPRINT_HEX_LEN && raw.chars().all(|c| c.is_ascii_hexdigit()) {
            Some(Fingerprint(raw.to_ascii_lowercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives the content address of `text`. Deterministic, no I/O.
pub fn fingerprint(text: &NormalizedText) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(text.as_str().as_bytes());
    Fingerprint(format!("{:x}", hasher.finalize()))
}
