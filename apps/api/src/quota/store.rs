//! Quota store abstraction and the in-memory backend.
//!
//! `consume` is the one operation that must be atomic per key: the
//! check-then-increment happens under a single lock (DashMap shard lock for the
//! in-memory store, a row-level upsert for Postgres). A denied call never
//! touches the record.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use crate::intake::Identity;
use crate::quota::models::{QuotaDecision, QuotaKey, QuotaRecord};

#[derive(Debug, Error)]
pub enum QuotaStoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt quota record: {0}")]
    Corrupt(String),

    #[error("Quota store did not answer within {0:?}")]
    Timeout(Duration),
}

/// Backing store for the quota ledger. Implement this to move quota state out
/// of process without touching the ledger or its callers.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Returns the record for `key`, if any. Never mutates.
    async fn get(&self, key: &QuotaKey) -> Result<Option<QuotaRecord>, QuotaStoreError>;

    /// Atomically grants one analysis for `key` if fewer than `max_free` have
    /// been granted, creating the record on first use.
    async fn consume(
        &self,
        key: &QuotaKey,
        identity: &Identity,
        max_free: u32,
        now: DateTime<Utc>,
    ) -> Result<QuotaDecision, QuotaStoreError>;

    /// Removes records last seen before `cutoff`. Returns how many went.
    async fn delete_seen_before(&self, cutoff: DateTime<Utc>) -> Result<usize, QuotaStoreError>;

    /// Short backend label for logs.
    fn backend(&self) -> &'static str;
}

/// Single-process store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryQuotaStore {
    records: DashMap<QuotaKey, QuotaRecord>,
}

impl InMemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    async fn get(&self, key: &QuotaKey) -> Result<Option<QuotaRecord>, QuotaStoreError> {
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    async fn consume(
        &self,
        key: &QuotaKey,
        identity: &Identity,
        max_free: u32,
        now: DateTime<Utc>,
    ) -> Result<QuotaDecision, QuotaStoreError> {
        if max_free == 0 {
            return Ok(QuotaDecision::denied());
        }

        // The entry guard holds the shard write lock until it drops, which
        // makes the whole match below one atomic step for this key.
        let decision = match self.records.entry(key.clone()) {
            Entry::Vacant(vacant) => {
                vacant.insert(QuotaRecord::first(key.clone(), identity.clone(), now));
                QuotaDecision::allowed(max_free - 1)
            }
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                if record.count >= max_free {
                    QuotaDecision::denied()
                } else {
                    record.count += 1;
                    record.last_seen_at = now;
                    if record.identity.is_anonymous() && !identity.is_anonymous() {
                        record.identity = identity.clone();
                    }
                    QuotaDecision::allowed(max_free - record.count)
                }
            }
        };

        Ok(decision)
    }

    async fn delete_seen_before(&self, cutoff: DateTime<Utc>) -> Result<usize, QuotaStoreError> {
        let mut removed = 0;
        self.records.retain(|_, record| {
            let keep = record.last_seen_at >= cutoff;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
