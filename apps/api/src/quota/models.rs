use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::intake::{Fingerprint, Identity};

/// Subject used in `SharedContent` scope, where every identity draws from one
/// allowance per fingerprint.
const SHARED_SUBJECT: &str = "*";

/// Which dimensions make up a quota key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QuotaScope {
    /// fingerprint + identity + bucket
    #[default]
    PerIdentity,
    /// fingerprint + bucket; identity is recorded for reporting only
    SharedContent,
}

#[derive(Debug, Error)]
#[error("unknown quota scope '{0}'")]
pub struct ParseQuotaScopeError(String);

impl FromStr for QuotaScope {
    type Err = ParseQuotaScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per_identity" => Ok(QuotaScope::PerIdentity),
            "shared_content" => Ok(QuotaScope::SharedContent),
            other => Err(ParseQuotaScopeError(other.to_string())),
        }
    }
}

/// Composite ledger key. Two submissions share a key iff they have the same
/// content, the same subject, and fall in the same time bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuotaKey {
    pub fingerprint: Fingerprint,
    pub subject: String,
    pub bucket: i64,
}

impl QuotaKey {
    pub fn new(
        scope: QuotaScope,
        fingerprint: &Fingerprint,
        identity: &Identity,
        bucket: i64,
    ) -> Self {
        let subject = match scope {
            QuotaScope::PerIdentity => identity.key().to_string(),
            QuotaScope::SharedContent => SHARED_SUBJECT.to_string(),
        };
        QuotaKey {
            fingerprint: fingerprint.clone(),
            subject,
            bucket,
        }
    }
}

/// Index of the bucket containing `now`, for buckets `width_secs` wide
/// starting at the Unix epoch (UTC midnight boundaries for one-day buckets).
pub fn bucket_index(now: DateTime<Utc>, width_secs: i64) -> i64 {
    now.timestamp().div_euclid(width_secs.max(1))
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuotaRecord {
    pub key: QuotaKey,
    /// Who consumed this allowance. Starts as the first submitter; an anonymous
    /// record adopts the first email seen later.
    pub identity: Identity,
    pub count: u32,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl QuotaRecord {
    pub fn first(key: QuotaKey, identity: Identity, now: DateTime<Utc>) -> Self {
        QuotaRecord {
            key,
            identity,
            count: 1,
            created_at: now,
            last_seen_at: now,
        }
    }
}

/// Outcome of a check-and-consume call. This is the entire caller-visible
/// contract of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub remaining: u32,
}

impl QuotaDecision {
    pub fn allowed(remaining: u32) -> Self {
        QuotaDecision {
            allowed: true,
            remaining,
        }
    }

    pub fn denied() -> Self {
        QuotaDecision {
            allowed: false,
            remaining: 0,
        }
    }
}

/// Read-only view of a key's usage in the current bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaUsage {
    pub used: u32,
    pub remaining: u32,
    pub max_free: u32,
}

impl QuotaUsage {
    pub fn from_count(count: u32, max_free: u32) -> Self {
        QuotaUsage {
            used: count,
            remaining: max_free.saturating_sub(count),
            max_free,
        }
    }
}
