//! Submission pipeline: Normalizer → Fingerprinter → Quota Ledger → Analyzer.
//!
//! The ledger and analyzer share nothing. A denied submission never reaches
//! the analyzer, and the analyzer never consults quota.

use std::sync::Arc;

use tracing::info;

use crate::analysis::models::{AnalysisResult, Tier};
use crate::analysis::orchestrator::Analyzer;
use crate::errors::AppError;
use crate::intake::{fingerprint, normalize, Fingerprint, Identity, NormalizedText};
use crate::quota::{QuotaLedger, QuotaUsage};

/// Submissions shorter than this after normalization are rejected up front.
pub const MIN_SUBMISSION_CHARS: usize = 30;

#[derive(Debug, Clone)]
pub enum SubmissionOutcome {
    Denied,
    Granted {
        remaining: u32,
        fingerprint: Fingerprint,
        analysis: AnalysisResult,
        tier: Tier,
    },
}

#[derive(Clone)]
pub struct SubmissionService {
    ledger: Arc<QuotaLedger>,
    analyzer: Analyzer,
    max_free: u32,
}

impl SubmissionService {
    pub fn new(ledger: Arc<QuotaLedger>, analyzer: Analyzer, max_free: u32) -> Self {
        Self {
            ledger,
            analyzer,
            max_free,
        }
    }

    pub fn quota_backend(&self) -> &'static str {
        self.ledger.backend()
    }

    /// Normalizes raw text and, if it is long enough and the gate allows it,
    /// analyzes it. Short text is rejected before the gate, so it never
    /// consumes an allowance.
    pub async fn submit(
        &self,
        raw_text: &str,
        email: Option<&str>,
    ) -> Result<SubmissionOutcome, AppError> {
        let text = normalize(Some(raw_text));
        if text.char_len() < MIN_SUBMISSION_CHARS {
            return Err(AppError::Validation(format!(
                "text must contain at least {MIN_SUBMISSION_CHARS} characters"
            )));
        }
        let identity = Identity::from_email(email);
        Ok(self.submit_normalized(&text, &identity).await)
    }

    async fn submit_normalized(
        &self,
        text: &NormalizedText,
        identity: &Identity,
    ) -> SubmissionOutcome {
        let fp = fingerprint(text);
        let decision = self
            .ledger
            .check_and_consume(&fp, identity, self.max_free)
            .await;

        if !decision.allowed {
            info!(
                "Submission fp={} identity={} denied: free analyses exhausted",
                fp.short(),
                identity.kind()
            );
            return SubmissionOutcome::Denied;
        }

        let analysis = self.analyzer.analyze(text).await;
        let provider = analysis
            .provider_call
            .as_ref()
            .map(|call| call.outcome.label())
            .unwrap_or_else(|| "not configured".to_string());
        info!(
            "Submission fp={} identity={} analyzed via {} tier (provider: {provider}), {} free analyses left",
            fp.short(),
            identity.kind(),
            analysis.tier,
            decision.remaining
        );

        SubmissionOutcome::Granted {
            remaining: decision.remaining,
            fingerprint: fp,
            analysis: analysis.result,
            tier: analysis.tier,
        }
    }

    /// Read-only usage for a fingerprint in the current bucket.
    pub async fn usage(&self, fingerprint: &Fingerprint, identity: &Identity) -> QuotaUsage {
        self.ledger.usage(fingerprint, identity, self.max_free).await
    }
}
