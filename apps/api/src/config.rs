use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::quota::QuotaScope;

const DEFAULT_LLM_API_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_LLM_MODEL: &str = "claude-sonnet-4-5";

/// One year. Quota windows and horizons beyond this are configuration mistakes.
const MAX_QUOTA_BUCKET_SECS: u64 = 366 * 86_400;
/// Ten years.
const MAX_QUOTA_RETENTION_SECS: u64 = 10 * 366 * 86_400;

/// Application configuration loaded from environment variables.
/// Every variable has a default; startup fails only on malformed values.
#[derive(Debug, Clone)]
pub struct Config {
    /// Optional. When unset the quota ledger lives in memory only.
    pub database_url: Option<String>,
    pub llm_api_url: String,
    /// Optional. When unset the analyzer goes straight to the local tier.
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_timeout: Duration,
    pub llm_max_input_chars: usize,
    pub free_analyses: u32,
    pub quota_bucket: Duration,
    pub quota_retention: Duration,
    pub quota_eviction_interval: Duration,
    /// Upper bound on a single quota store call before the ledger falls back.
    pub quota_store_timeout: Duration,
    pub quota_scope: QuotaScope,
    pub max_upload_bytes: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let config = Config {
            database_url: optional_env("DATABASE_URL"),
            llm_api_url: optional_env("LLM_API_URL")
                .unwrap_or_else(|| DEFAULT_LLM_API_URL.to_string()),
            llm_api_key: optional_env("LLM_API_KEY"),
            llm_model: optional_env("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            llm_timeout: Duration::from_secs(parse_env("LLM_TIMEOUT_SECS", 20)?),
            llm_max_input_chars: parse_env("LLM_MAX_INPUT_CHARS", 12_000)?,
            free_analyses: parse_env("FREE_ANALYSES_PER_BUCKET", 3)?,
            quota_bucket: Duration::from_secs(parse_env("QUOTA_BUCKET_SECS", 86_400)?),
            quota_retention: Duration::from_secs(parse_env("QUOTA_RETENTION_SECS", 604_800)?),
            quota_eviction_interval: Duration::from_secs(parse_env(
                "QUOTA_EVICTION_INTERVAL_SECS",
                300,
            )?),
            quota_store_timeout: Duration::from_secs(parse_env("QUOTA_STORE_TIMEOUT_SECS", 2)?),
            quota_scope: optional_env("QUOTA_SCOPE")
                .map(|s| s.parse::<QuotaScope>())
                .transpose()
                .context("QUOTA_SCOPE must be 'per_identity' or 'shared_content'")?
                .unwrap_or_default(),
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", 5 * 1024 * 1024)?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.llm_api_url.starts_with("http://") && !self.llm_api_url.starts_with("https://") {
            bail!("LLM_API_URL must start with http:// or https://");
        }
        if self.quota_bucket.is_zero() {
            bail!("QUOTA_BUCKET_SECS must be greater than zero");
        }
        if self.quota_bucket.as_secs() > MAX_QUOTA_BUCKET_SECS {
            bail!("QUOTA_BUCKET_SECS must be at most {MAX_QUOTA_BUCKET_SECS}");
        }
        if self.quota_retention.as_secs() > MAX_QUOTA_RETENTION_SECS {
            bail!("QUOTA_RETENTION_SECS must be at most {MAX_QUOTA_RETENTION_SECS}");
        }
        if self.quota_retention <= self.quota_bucket {
            bail!("QUOTA_RETENTION_SECS must be longer than QUOTA_BUCKET_SECS");
        }
        if self.quota_eviction_interval.is_zero() {
            bail!("QUOTA_EVICTION_INTERVAL_SECS must be greater than zero");
        }
        if self.quota_store_timeout.is_zero() {
            bail!("QUOTA_STORE_TIMEOUT_SECS must be greater than zero");
        }
        Ok(())
    }
}

/// Returns the variable if set and non-blank.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
impl Config {
    /// Defaults used by in-process tests; no provider credential, no database.
    pub fn for_tests() -> Self {
        Config {
            database_url: None,
            llm_api_url: DEFAULT_LLM_API_URL.to_string(),
            llm_api_key: None,
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            llm_timeout: Duration::from_secs(2),
            llm_max_input_chars: 12_000,
            free_analyses: 3,
            quota_bucket: Duration::from_secs(86_400),
            quota_retention: Duration::from_secs(604_800),
            quota_eviction_interval: Duration::from_secs(300),
            quota_store_timeout: Duration::from_secs(2),
            quota_scope: QuotaScope::PerIdentity,
            max_upload_bytes: 1024 * 1024,
            port: 0,
            rust_log: "debug".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_defaults_validate() {
        assert!(Config::for_tests().validate().is_ok());
    }

    #[test]
    fn test_retention_must_exceed_bucket() {
        let mut config = Config::for_tests();
        config.quota_retention = config.quota_bucket;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_quota_windows_are_rejected() {
        let mut config = Config::for_tests();
        config.quota_retention = Duration::from_secs(u64::MAX);
        assert!(config.validate().is_err());

        let mut config = Config::for_tests();
        config.quota_bucket = Duration::from_secs(MAX_QUOTA_BUCKET_SECS + 1);
        config.quota_retention = Duration::from_secs(MAX_QUOTA_RETENTION_SECS);
        assert!(config.validate().is_err());

        let mut config = Config::for_tests();
        config.quota_retention = Duration::from_secs(MAX_QUOTA_RETENTION_SECS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_store_timeout_must_be_positive() {
        let mut config = Config::for_tests();
        config.quota_store_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_provider_url_must_be_http() {
        let mut config = Config::for_tests();
        config.llm_api_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }
}
