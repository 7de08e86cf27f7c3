use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Creates a PostgreSQL connection pool and makes sure the quota table exists.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(database_url)
        .await?;

    ensure_schema(&pool).await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Idempotent DDL for the durable quota ledger. The raw résumé text is never
/// stored; rows are keyed by content fingerprint.
async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quota_records (
            fingerprint        TEXT        NOT NULL,
            identity           TEXT        NOT NULL,
            bucket             BIGINT      NOT NULL,
            count              INTEGER     NOT NULL CHECK (count >= 0),
            reported_identity  TEXT,
            created_at         TIMESTAMPTZ NOT NULL,
            last_seen_at       TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (fingerprint, identity, bucket)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create quota_records table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS quota_records_last_seen_idx ON quota_records (last_seen_at)",
    )
    .execute(pool)
    .await
    .context("Failed to create quota_records index")?;

    Ok(())
}
