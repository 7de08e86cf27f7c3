use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns service status plus which backends are active.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "cvcheck-api",
        "provider_configured": state.config.llm_api_key.is_some(),
        "quota_backend": state.submissions.quota_backend(),
    }))
}
