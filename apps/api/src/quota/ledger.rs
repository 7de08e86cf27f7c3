//! Quota Ledger: the gate in front of the analyzer.
//!
//! `check_and_consume` is total: when the primary store fails, the same
//! decision is taken against an in-memory fallback so users are never blocked
//! by a storage outage. Availability wins over strict enforcement there.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::intake::{Fingerprint, Identity};
use crate::quota::models::{bucket_index, QuotaDecision, QuotaKey, QuotaScope, QuotaUsage};
use crate::quota::store::{InMemoryQuotaStore, QuotaStore, QuotaStoreError};

/// Upper bound on a single primary-store call unless overridden.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct QuotaLedger {
    primary: Arc<dyn QuotaStore>,
    /// Present only when the primary store is remote.
    fallback: Option<InMemoryQuotaStore>,
    scope: QuotaScope,
    bucket_secs: i64,
    /// `None` when the horizon does not fit a `chrono::Duration`; nothing is
    /// ever old enough to evict then.
    retention: Option<chrono::Duration>,
    store_timeout: Duration,
}

impl QuotaLedger {
    /// Ledger over a purely in-memory store.
    pub fn in_memory(scope: QuotaScope, bucket: Duration, retention: Duration) -> Self {
        Self::build(Arc::new(InMemoryQuotaStore::new()), None, scope, bucket, retention)
    }

    /// Ledger over a remote store, degrading to memory when it is unreachable.
    pub fn with_store(
        primary: Arc<dyn QuotaStore>,
        scope: QuotaScope,
        bucket: Duration,
        retention: Duration,
    ) -> Self {
        Self::build(primary, Some(InMemoryQuotaStore::new()), scope, bucket, retention)
    }

    fn build(
        primary: Arc<dyn QuotaStore>,
        fallback: Option<InMemoryQuotaStore>,
        scope: QuotaScope,
        bucket: Duration,
        retention: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            scope,
            bucket_secs: i64::try_from(bucket.as_secs()).unwrap_or(i64::MAX).max(1),
            retention: i64::try_from(retention.as_secs())
                .ok()
                .and_then(chrono::Duration::try_seconds),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Caps every primary-store call; a call that runs longer is treated as
    /// a store failure.
    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    pub fn backend(&self) -> &'static str {
        self.primary.backend()
    }

    /// Grants one free analysis for (fingerprint, identity, current bucket) if
    /// fewer than `max_free` have been granted. A denial never consumes.
    pub async fn check_and_consume(
        &self,
        fingerprint: &Fingerprint,
        identity: &Identity,
        max_free: u32,
    ) -> QuotaDecision {
        self.check_and_consume_at(fingerprint, identity, max_free, Utc::now())
            .await
    }

    pub async fn check_and_consume_at(
        &self,
        fingerprint: &Fingerprint,
        identity: &Identity,
        max_free: u32,
        now: DateTime<Utc>,
    ) -> QuotaDecision {
        let key = self.key_for(fingerprint, identity, now);

        let decision = match self
            .bounded(self.primary.consume(&key, identity, max_free, now))
            .await
        {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    "Quota store '{}' unavailable, degrading to in-memory ledger: {e}",
                    self.primary.backend()
                );
                self.consume_fallback(&key, identity, max_free, now).await
            }
        };

        debug!(
            "Quota {} for fp={} identity={} bucket={} remaining={}",
            if decision.allowed { "granted" } else { "denied" },
            fingerprint.short(),
            identity.kind(),
            key.bucket,
            decision.remaining
        );
        decision
    }

    async fn consume_fallback(
        &self,
        key: &QuotaKey,
        identity: &Identity,
        max_free: u32,
        now: DateTime<Utc>,
    ) -> QuotaDecision {
        let Some(fallback) = &self.fallback else {
            return QuotaDecision::allowed(max_free.saturating_sub(1));
        };
        match fallback.consume(key, identity, max_free, now).await {
            Ok(decision) => decision,
            // The in-memory store has no failure path today; allow if it ever does.
            Err(_) => QuotaDecision::allowed(max_free.saturating_sub(1)),
        }
    }

    /// Current usage for the bucket containing now. Never mutates.
    pub async fn usage(
        &self,
        fingerprint: &Fingerprint,
        identity: &Identity,
        max_free: u32,
    ) -> QuotaUsage {
        let key = self.key_for(fingerprint, identity, Utc::now());

        let record = match self.bounded(self.primary.get(&key)).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Quota store '{}' unavailable for read: {e}", self.primary.backend());
                match &self.fallback {
                    Some(fallback) => fallback.get(&key).await.ok().flatten(),
                    None => None,
                }
            }
        };

        QuotaUsage::from_count(record.map(|r| r.count).unwrap_or(0), max_free)
    }

    /// Garbage-collects records not seen within the retention horizon. This is
    /// not a quota reset: the bucket index already scopes counts by time.
    pub async fn evict_stale(&self) -> usize {
        self.evict_stale_at(Utc::now()).await
    }

    pub async fn evict_stale_at(&self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = self.retention.and_then(|r| now.checked_sub_signed(r)) else {
            debug!("Quota retention horizon reaches before the epoch; nothing to evict");
            return 0;
        };
        let mut removed = match self.bounded(self.primary.delete_seen_before(cutoff)).await {
            Ok(n) => n,
            Err(e) => {
                warn!("Quota eviction on '{}' failed: {e}", self.primary.backend());
                0
            }
        };
        if let Some(fallback) = &self.fallback {
            removed += fallback.delete_seen_before(cutoff).await.unwrap_or(0);
        }
        removed
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, QuotaStoreError>>,
    ) -> Result<T, QuotaStoreError> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(QuotaStoreError::Timeout(self.store_timeout)),
        }
    }

    fn key_for(&self, fingerprint: &Fingerprint, identity: &Identity, now: DateTime<Utc>) -> QuotaKey {
        QuotaKey::new(self.scope, fingerprint, identity, bucket_index(now, self.bucket_secs))
    }
}

/// Runs `evict_stale` every `every` until the runtime shuts down.
pub fn spawn_eviction_task(ledger: Arc<QuotaLedger>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // first tick fires immediately

        loop {
            ticker.tick().await;
            let removed = ledger.evict_stale().await;
            if removed > 0 {
                info!("Evicted {removed} stale quota records");
            }
        }
    })
}
