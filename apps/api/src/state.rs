use crate::analysis::SubmissionService;
use crate::config::Config;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Quota gate + analyzer. Owns the ledger; handlers never touch it directly.
    pub submissions: SubmissionService,
    pub config: Config,
}
