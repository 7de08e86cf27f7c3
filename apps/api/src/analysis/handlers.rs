use axum::{
    extract::{Multipart, Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::analysis::models::AnalysisResult;
use crate::analysis::submission::SubmissionOutcome;
use crate::errors::AppError;
use crate::intake::extract::extract_text;
use crate::intake::{Fingerprint, Identity};
use crate::quota::QuotaDecision;
use crate::state::AppState;

/// Diagnostic only; clients must not depend on it.
const TIER_HEADER: &str = "x-analysis-tier";

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub text: Option<String>,
    #[serde(default, alias = "identity")]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub allowed: bool,
    pub remaining: u32,
    pub fingerprint: Fingerprint,
    pub analysis: AnalysisResult,
}

#[derive(Debug, Deserialize)]
pub struct QuotaQuery {
    pub fingerprint: String,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QuotaStatusResponse {
    pub fingerprint: Fingerprint,
    pub used: u32,
    pub remaining: u32,
    pub max_free: u32,
}

/// POST /api/v1/analyze
pub async fn handle_analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Response, AppError> {
    let outcome = state
        .submissions
        .submit(req.text.as_deref().unwrap_or_default(), req.email.as_deref())
        .await?;
    Ok(outcome_response(outcome))
}

/// POST /api/v1/analyze/upload (multipart: `file`, optional `email`)
pub async fn handle_analyze_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut upload: Option<(Option<String>, Option<String>, Vec<u8>)> = None;
    let mut email: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().map(String::from);
                let content_type = field.content_type().map(String::from);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Could not read upload: {e}")))?;
                upload = Some((filename, content_type, bytes.to_vec()));
            }
            Some("email") | Some("identity") => {
                email = Some(field.text().await.map_err(|e| {
                    AppError::Validation(format!("Could not read email field: {e}"))
                })?);
            }
            _ => {}
        }
    }

    let (filename, content_type, bytes) = upload
        .ok_or_else(|| AppError::Validation("Multipart field 'file' is required".to_string()))?;
    let raw = extract_text(filename.as_deref(), content_type.as_deref(), bytes).await?;

    let outcome = state.submissions.submit(&raw, email.as_deref()).await?;
    Ok(outcome_response(outcome))
}

/// GET /api/v1/quota?fingerprint=…&email=…
pub async fn handle_quota_status(
    State(state): State<AppState>,
    Query(query): Query<QuotaQuery>,
) -> Result<Json<QuotaStatusResponse>, AppError> {
    let fingerprint = Fingerprint::parse(&query.fingerprint).ok_or_else(|| {
        AppError::Validation("fingerprint must be a 64-character hex digest".to_string())
    })?;
    let identity = Identity::from_email(query.email.as_deref());
    let usage = state.submissions.usage(&fingerprint, &identity).await;

    Ok(Json(QuotaStatusResponse {
        fingerprint,
        used: usage.used,
        remaining: usage.remaining,
        max_free: usage.max_free,
    }))
}

fn outcome_response(outcome: SubmissionOutcome) -> Response {
    match outcome {
        SubmissionOutcome::Denied => {
            (StatusCode::TOO_MANY_REQUESTS, Json(QuotaDecision::denied())).into_response()
        }
        SubmissionOutcome::Granted {
            remaining,
            fingerprint,
            analysis,
            tier,
        } => {
            let mut response = Json(AnalyzeResponse {
                allowed: true,
                remaining,
                fingerprint,
                analysis,
            })
            .into_response();
            response
                .headers_mut()
                .insert(TIER_HEADER, HeaderValue::from_static(tier.as_str()));
            response
        }
    }
}
