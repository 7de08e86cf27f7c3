//! Durable quota store on PostgreSQL.
//!
//! CRITICAL: `consume` is a single upsert statement. Splitting it into a SELECT
//! followed by an UPDATE reintroduces the double-grant race.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::intake::{Fingerprint, Identity};
use crate::quota::models::{QuotaDecision, QuotaKey, QuotaRecord};
use crate::quota::store::{QuotaStore, QuotaStoreError};

#[derive(Debug, FromRow)]
struct QuotaRow {
    fingerprint: String,
    identity: String,
    bucket: i64,
    count: i32,
    reported_identity: Option<String>,
    created_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
}

impl TryFrom<QuotaRow> for QuotaRecord {
    type Error = QuotaStoreError;

    fn try_from(row: QuotaRow) -> Result<Self, Self::Error> {
        let fingerprint = Fingerprint::parse(&row.fingerprint)
            .ok_or_else(|| QuotaStoreError::Corrupt(format!("bad fingerprint '{}'", row.fingerprint)))?;
        let count = u32::try_from(row.count)
            .map_err(|_| QuotaStoreError::Corrupt(format!("negative count {}", row.count)))?;
        let identity = row
            .reported_identity
            .as_deref()
            .map(|e| Identity::from_email(Some(e)))
            .unwrap_or_else(|| Identity::from_key(&row.identity));

        Ok(QuotaRecord {
            key: QuotaKey {
                fingerprint,
                subject: row.identity,
                bucket: row.bucket,
            },
            identity,
            count,
            created_at: row.created_at,
            last_seen_at: row.last_seen_at,
        })
    }
}

#[derive(Clone)]
pub struct PgQuotaStore {
    pool: PgPool,
}

impl PgQuotaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn reported_email(identity: &Identity) -> Option<&str> {
    match identity {
        Identity::Email(e) => Some(e.as_str()),
        Identity::Anonymous => None,
    }
}

#[async_trait]
impl QuotaStore for PgQuotaStore {
    async fn get(&self, key: &QuotaKey) -> Result<Option<QuotaRecord>, QuotaStoreError> {
        let row: Option<QuotaRow> = sqlx::query_as(
            r#"
            SELECT fingerprint, identity, bucket, count, reported_identity, created_at, last_seen_at
            FROM quota_records
            WHERE fingerprint = $1 AND identity = $2 AND bucket = $3
            "#,
        )
        .bind(key.fingerprint.as_str())
        .bind(&key.subject)
        .bind(key.bucket)
        .fetch_optional(&self.pool)
        .await?;

        row.map(QuotaRecord::try_from).transpose()
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
        let max = i32::try_from(max_free).unwrap_or(i32::MAX);

        // The WHERE on the conflict branch turns an exhausted key into a no-op:
        // no row is updated and nothing is returned.
        let granted: Option<i32> = sqlx::query_scalar(
            r#"
            INSERT INTO quota_records
                (fingerprint, identity, bucket, count, reported_identity, created_at, last_seen_at)
            VALUES ($1, $2, $3, 1, $4, $5, $5)
            ON CONFLICT (fingerprint, identity, bucket) DO UPDATE
            SET count = quota_records.count + 1,
                last_seen_at = EXCLUDED.last_seen_at,
                reported_identity = COALESCE(quota_records.reported_identity, EXCLUDED.reported_identity)
            WHERE quota_records.count < $6
            RETURNING count
            "#,
        )
        .bind(key.fingerprint.as_str())
        .bind(&key.subject)
        .bind(key.bucket)
        .bind(reported_email(identity))
        .bind(now)
        .bind(max)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match granted {
            Some(count) => {
                let count = u32::try_from(count).unwrap_or(max_free);
                QuotaDecision::allowed(max_free.saturating_sub(count))
            }
            None => QuotaDecision::denied(),
        })
    }

    async fn delete_seen_before(&self, cutoff: DateTime<Utc>) -> Result<usize, QuotaStoreError> {
        let result = sqlx::query("DELETE FROM quota_records WHERE last_seen_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
