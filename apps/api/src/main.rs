mod analysis;
mod config;
mod db;
mod errors;
mod intake;
mod llm_client;
mod quota;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::analysis::{Analyzer, SubmissionService};
use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::{CompletionProvider, LlmClient};
use crate::quota::{spawn_eviction_task, PgQuotaStore, QuotaLedger};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting CV Check API v{}", env!("CARGO_PKG_VERSION"));

    // Quota ledger: PostgreSQL when configured, memory otherwise
    let ledger = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url).await?;
            QuotaLedger::with_store(
                Arc::new(PgQuotaStore::new(pool)),
                config.quota_scope,
                config.quota_bucket,
                config.quota_retention,
            )
        }
        None => {
            warn!("DATABASE_URL not set; quota ledger is in-memory and resets on restart");
            QuotaLedger::in_memory(
                config.quota_scope,
                config.quota_bucket,
                config.quota_retention,
            )
        }
    };
    let ledger = Arc::new(ledger.with_store_timeout(config.quota_store_timeout));
    info!(
        "Quota ledger ready (backend: {}, scope: {:?}, {} free analyses per bucket)",
        ledger.backend(),
        config.quota_scope,
        config.free_analyses
    );
    spawn_eviction_task(ledger.clone(), config.quota_eviction_interval);

    // Remote provider is optional; without it every analysis takes the local tier
    let provider = build_provider(&config);
    let analyzer = Analyzer::new(provider, config.llm_timeout, config.llm_max_input_chars);

    let state = AppState {
        submissions: SubmissionService::new(ledger, analyzer, config.free_analyses),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the frontend domain is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_provider(config: &Config) -> Option<Arc<dyn CompletionProvider>> {
    let Some(api_key) = config.llm_api_key.clone() else {
        warn!("LLM_API_KEY not set; analyses will use the local heuristic only");
        return None;
    };

    match LlmClient::new(config.llm_api_url.clone(), api_key, config.llm_model.clone()) {
        Ok(client) => {
            info!("LLM client initialized (model: {})", config.llm_model);
            Some(Arc::new(client))
        }
        Err(e) => {
            warn!("Could not build LLM client, falling back to local analysis: {e}");
            None
        }
    }
}
