use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Canonical analysis returned to callers. Every field is always present and
/// within bounds, whichever tier produced it (see `shaper::shape`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub industry: String,
    pub role_seniority: String,
    /// ≤ 5
    pub top_roles: Vec<String>,
    /// ≤ 30, case-insensitively unique
    pub skills: Vec<String>,
    /// 1.0 – 10.0
    pub score: f64,
    /// ≤ 8
    pub red_flags: Vec<String>,
    pub summary: String,
    /// ≤ 6
    pub next_steps: Vec<String>,
}

/// Which stage of the fallback chain produced a result. Diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Provider content parsed as a JSON object on the first try.
    Remote,
    /// Provider content was malformed; a JSON object was recovered from it.
    Recovered,
    /// Deterministic local analysis.
    Local,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Remote => "remote",
            Tier::Recovered => "recovered",
            Tier::Local => "local",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified outcome of a single provider attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutcome {
    /// 2xx with non-empty content. Whether it parses is decided later.
    Content(String),
    Empty,
    /// 2xx whose body is not a Messages envelope.
    Malformed,
    HttpError { status: u16 },
    NetworkError(String),
    Timeout,
}

impl ProviderOutcome {
    /// Outcome class for log lines; never includes model output.
    pub fn label(&self) -> String {
        match self {
            ProviderOutcome::Content(c) => format!("content ({} chars)", c.chars().count()),
            ProviderOutcome::Empty => "empty content".to_string(),
            ProviderOutcome::Malformed => "malformed response".to_string(),
            ProviderOutcome::HttpError { status } => format!("http {status}"),
            ProviderOutcome::NetworkError(e) => format!("network error: {e}"),
            ProviderOutcome::Timeout => "timeout".to_string(),
        }
    }
}

/// One attempt to reach the provider. Lives only for one `analyze` call.
#[derive(Debug, Clone)]
pub struct ProviderCall {
    pub model: String,
    pub input_chars: usize,
    pub timeout: Duration,
    pub elapsed: Duration,
    pub outcome: ProviderOutcome,
}

/// What `Analyzer::analyze` hands back: the result plus how it was made.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub result: AnalysisResult,
    pub tier: Tier,
    /// `None` when no provider is configured.
    pub provider_call: Option<ProviderCall>,
}
