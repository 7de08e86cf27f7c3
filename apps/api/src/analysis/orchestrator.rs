//! Analysis Orchestrator: turns normalized text into an `AnalysisResult`.
//!
//! Tiers are evaluated top-down exactly once per request:
//!   0. remote call (single attempt, hard timeout)
//!   1. lenient parse of whatever content came back
//!   2. local heuristic, when 0/1 produced no object
//! Whatever tier wins, its candidate goes through `shaper::shape`.
//!
//! `analyze` never fails. Provider errors, timeouts, and panics all resolve to
//! the local tier.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::analysis::heuristic::analyze_locally;
use crate::analysis::lenient::{parse_candidate, ParseMode};
use crate::analysis::models::{Analysis, ProviderCall, ProviderOutcome, Tier};
use crate::analysis::prompts::{analysis_system_prompt, build_analysis_prompt};
use crate::analysis::shaper::shape;
use crate::intake::NormalizedText;
use crate::llm_client::{CompletionProvider, LlmError};

#[derive(Clone)]
pub struct Analyzer {
    /// `None` when no credential is configured; Tier 0 is then skipped.
    provider: Option<Arc<dyn CompletionProvider>>,
    timeout: Duration,
    max_input_chars: usize,
    system_prompt: Arc<str>,
}

impl Analyzer {
    pub fn new(
        provider: Option<Arc<dyn CompletionProvider>>,
        timeout: Duration,
        max_input_chars: usize,
    ) -> Self {
        Self {
            provider,
            timeout,
            max_input_chars,
            system_prompt: Arc::from(analysis_system_prompt()),
        }
    }

    /// Local-only analyzer.
    #[cfg(test)]
    pub fn offline() -> Self {
        Self::new(None, Duration::ZERO, 0)
    }

    pub async fn analyze(&self, text: &NormalizedText) -> Analysis {
        let provider_call = match &self.provider {
            Some(provider) => Some(self.call_provider(Arc::clone(provider), text).await),
            None => None,
        };

        let (candidate, tier) = select_candidate(text, provider_call.as_ref());
        let result = shape(&candidate);

        match &provider_call {
            Some(call) => debug!(
                "Analysis produced by {tier} tier (model: {}, input: {} chars, {}ms of {}ms budget, provider: {})",
                call.model,
                call.input_chars,
                call.elapsed.as_millis(),
                call.timeout.as_millis(),
                call.outcome.label()
            ),
            None => debug!("Analysis produced by {tier} tier (provider: not configured)"),
        }

        Analysis {
            result,
            tier,
            provider_call,
        }
    }

    /// Tier 0. The call runs on its own task so a panicking provider cannot
    /// take the request down; on timeout the task is aborted and any late
    /// response is discarded.
    async fn call_provider(
        &self,
        provider: Arc<dyn CompletionProvider>,
        text: &NormalizedText,
    ) -> ProviderCall {
        let truncated = truncate_chars(text.as_str(), self.max_input_chars);
        let input_chars = truncated.chars().count();
        let prompt = build_analysis_prompt(truncated);
        let system = Arc::clone(&self.system_prompt);
        let model = provider.model().to_string();

        let started = Instant::now();
        let mut handle =
            tokio::spawn(async move { provider.complete(&prompt, &system).await });

        let outcome = match tokio::time::timeout(self.timeout, &mut handle).await {
            Err(_) => {
                handle.abort();
                ProviderOutcome::Timeout
            }
            Ok(Err(join_error)) => {
                ProviderOutcome::NetworkError(format!("provider task failed: {join_error}"))
            }
            Ok(Ok(result)) => classify(result),
        };
        let elapsed = started.elapsed();

        if !matches!(outcome, ProviderOutcome::Content(_)) {
            warn!(
                "Provider call to {model} failed after {}ms: {}",
                elapsed.as_millis(),
                outcome.label()
            );
        }

        ProviderCall {
            model,
            input_chars,
            timeout: self.timeout,
            elapsed,
            outcome,
        }
    }
}

fn classify(result: Result<String, LlmError>) -> ProviderOutcome {
    match result {
        Ok(content) if content.trim().is_empty() => ProviderOutcome::Empty,
        Ok(content) => ProviderOutcome::Content(content),
        Err(LlmError::EmptyContent) => ProviderOutcome::Empty,
        Err(LlmError::MalformedResponse(_)) => ProviderOutcome::Malformed,
        Err(LlmError::Api { status, .. }) => ProviderOutcome::HttpError { status },
        Err(LlmError::Http(e)) if e.is_timeout() => ProviderOutcome::Timeout,
        Err(LlmError::Http(e)) => ProviderOutcome::NetworkError(e.to_string()),
    }
}

/// Tiers 1 and 2: picks the candidate object and names the tier it came from.
fn select_candidate(text: &NormalizedText, call: Option<&ProviderCall>) -> (Value, Tier) {
    let content = match call.map(|c| &c.outcome) {
        Some(ProviderOutcome::Content(content)) => content,
        Some(ProviderOutcome::Empty)
        | Some(ProviderOutcome::Malformed)
        | Some(ProviderOutcome::HttpError { .. })
        | Some(ProviderOutcome::NetworkError(_))
        | Some(ProviderOutcome::Timeout)
        | None => return local(text),
    };

    match parse_candidate(content) {
        Some((value, ParseMode::Strict)) => (value, Tier::Remote),
        Some((value, ParseMode::Extracted)) => (value, Tier::Recovered),
        None => {
            warn!("Provider content held no parseable JSON object; using local analysis");
            local(text)
        }
    }
}

fn local(text: &NormalizedText) -> (Value, Tier) {
    (analyze_locally(text).into_candidate(), Tier::Local)
}

/// Longest prefix of `s` with at most `max` characters, cut on a char boundary.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::analysis::shaper::{MAX_NEXT_STEPS, MAX_RED_FLAGS, MAX_SKILLS, MAX_TOP_ROLES};
    use crate::intake::normalize;

    const DETAILED_DEV: &str = "8 years experience with react, node and docker. \
        Led a team of five engineers building payment services and internal tooling for operations.";

    /// Scripted provider. Records every prompt it receives.
    enum Script {
        Reply(&'static str),
        Status(u16),
        Empty,
        Malformed,
        Hang,
        Panic,
    }

    struct FakeProvider {
        script: Script,
        calls: AtomicUsize,
        last_prompt: Mutex<Option<String>>,
    }

    impl FakeProvider {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl CompletionProvider for FakeProvider {
        async fn complete(&self, prompt: &str, _system: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            match &self.script {
                Script::Reply(body) => Ok(body.to_string()),
                Script::Status(status) => Err(LlmError::Api {
                    status: *status,
                    message: "upstream failure".to_string(),
                }),
                Script::Empty => Err(LlmError::EmptyContent),
                Script::Malformed => Err(LlmError::MalformedResponse("missing field `content`".to_string())),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok("{}".to_string())
                }
                Script::Panic => panic!("provider bug"),
            }
        }

        fn model(&self) -> &str {
            "fake-model"
        }
    }

    fn analyzer(provider: &Arc<FakeProvider>) -> Analyzer {
        let provider: Arc<dyn CompletionProvider> = provider.clone();
        Analyzer::new(Some(provider), Duration::from_millis(200), 12_000)
    }

    fn assert_schema_valid(analysis: &Analysis) {
        let r = &analysis.result;
        assert!((1.0..=10.0).contains(&r.score), "score {}", r.score);
        assert!(r.top_roles.len() <= MAX_TOP_ROLES);
        assert!(r.skills.len() <= MAX_SKILLS);
        assert!(r.red_flags.len() <= MAX_RED_FLAGS);
        assert!(r.next_steps.len() <= MAX_NEXT_STEPS);
        assert!(r.skills.iter().all(|s| !s.is_empty()));
    }

    #[tokio::test]
    async fn test_well_formed_reply_is_remote_tier() {
        let provider = FakeProvider::new(Script::Reply(
            r#"{"industry":"IT","role_seniority":"Senior","top_roles":["SRE"],"skills":["Go","go","Rust"],"score":12,"red_flags":[],"summary":"ok","next_steps":[]}"#,
        ));
        let analysis = analyzer(&provider).analyze(&normalize(Some(DETAILED_DEV))).await;

        assert_eq!(analysis.tier, Tier::Remote);
        assert_eq!(analysis.result.skills, vec!["Go", "Rust"]);
        assert_eq!(analysis.result.score, 10.0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_schema_valid(&analysis);
    }

    #[tokio::test]
    async fn test_prose_wrapped_reply_is_recovered_tier() {
        let provider = FakeProvider::new(Script::Reply(
            "Aquí está el resultado: {\"industry\": \"Salud\", \"score\": 6} ¡Suerte!",
        ));
        let analysis = analyzer(&provider).analyze(&normalize(Some(DETAILED_DEV))).await;

        assert_eq!(analysis.tier, Tier::Recovered);
        assert_eq!(analysis.result.industry, "Salud");
        assert_eq!(analysis.result.role_seniority, "No determinado");
        assert_schema_valid(&analysis);
    }

    #[tokio::test]
    async fn test_missing_fields_are_defaulted() {
        let provider = FakeProvider::new(Script::Reply(r#"{"summary": "corto"}"#));
        let analysis = analyzer(&provider).analyze(&normalize(Some("cv"))).await;

        assert_eq!(analysis.tier, Tier::Remote);
        assert_eq!(analysis.result.industry, "General");
        assert_eq!(analysis.result.score, 5.0);
        assert!(analysis.result.top_roles.is_empty());
    }

    #[tokio::test]
    async fn test_garbage_reply_falls_back_to_local() {
        let provider = FakeProvider::new(Script::Reply("<html>oops</html>"));
        let analysis = analyzer(&provider).analyze(&normalize(Some(DETAILED_DEV))).await;

        assert_eq!(analysis.tier, Tier::Local);
        assert_eq!(analysis.result.industry, "IT");
        assert_schema_valid(&analysis);
    }

    #[tokio::test]
    async fn test_http_500_falls_back_to_local() {
        let provider = FakeProvider::new(Script::Status(500));
        let analysis = analyzer(&provider).analyze(&normalize(Some(DETAILED_DEV))).await;

        assert_eq!(analysis.tier, Tier::Local);
        assert_eq!(
            analysis.provider_call.unwrap().outcome,
            ProviderOutcome::HttpError { status: 500 }
        );
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1, "no retries");
    }

    #[tokio::test]
    async fn test_empty_content_falls_back_to_local() {
        let provider = FakeProvider::new(Script::Empty);
        let analysis = analyzer(&provider).analyze(&normalize(Some(DETAILED_DEV))).await;
        assert_eq!(analysis.tier, Tier::Local);
        assert_eq!(analysis.provider_call.unwrap().outcome, ProviderOutcome::Empty);
    }

    #[tokio::test]
    async fn test_malformed_response_falls_back_to_local() {
        let provider = FakeProvider::new(Script::Malformed);
        let analysis = analyzer(&provider).analyze(&normalize(Some(DETAILED_DEV))).await;
        assert_eq!(analysis.tier, Tier::Local);
        assert_eq!(analysis.result.industry, "IT");
        assert_eq!(analysis.provider_call.unwrap().outcome, ProviderOutcome::Malformed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_abandons_call_and_falls_back() {
        let provider = FakeProvider::new(Script::Hang);
        let analysis = analyzer(&provider).analyze(&normalize(Some(DETAILED_DEV))).await;

        let call = analysis.provider_call.unwrap();
        assert_eq!(call.outcome, ProviderOutcome::Timeout);
        assert!(call.elapsed >= call.timeout);
        assert_eq!(call.model, "fake-model");
        assert_eq!(analysis.tier, Tier::Local);
        assert_eq!(analysis.result.role_seniority, "Senior");
    }

    #[tokio::test]
    async fn test_panicking_provider_falls_back() {
        let provider = FakeProvider::new(Script::Panic);
        let analysis = analyzer(&provider).analyze(&normalize(Some(DETAILED_DEV))).await;
        assert_eq!(analysis.tier, Tier::Local);
        assert!(matches!(
            analysis.provider_call.unwrap().outcome,
            ProviderOutcome::NetworkError(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_provider_scenario() {
        let analysis = Analyzer::offline().analyze(&normalize(Some(DETAILED_DEV))).await;

        assert_eq!(analysis.tier, Tier::Local);
        assert!(analysis.provider_call.is_none());
        let r = analysis.result;
        assert_eq!(r.industry, "IT");
        assert_eq!(r.role_seniority, "Senior");
        for skill in ["react", "node", "docker"] {
            assert!(r.skills.contains(&skill.to_string()));
        }
        assert!(r.red_flags.is_empty());
        assert!((1.0..=10.0).contains(&r.score));
    }

    #[tokio::test]
    async fn test_prompt_is_truncated_on_char_boundary() {
        let provider = FakeProvider::new(Script::Reply("{}"));
        let provider_dyn: Arc<dyn CompletionProvider> = provider.clone();
        let analyzer = Analyzer::new(Some(provider_dyn), Duration::from_secs(1), 10);
        let text = normalize(Some(&"ñandú ".repeat(100)));

        let analysis = analyzer.analyze(&text).await;
        assert_eq!(analysis.provider_call.unwrap().input_chars, 10);
        let prompt = provider.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.ends_with("ñandú ñand"));
    }

    #[tokio::test]
    async fn test_adversarial_inputs_never_fail() {
        let provider = FakeProvider::new(Script::Reply(r#"{"skills": {"a": 1}, "score": null}"#));
        let analyzer = analyzer(&provider);
        let long = "{".repeat(50_000);
        for text in ["", "\u{0000}\u{FFFD}\u{202E}", "}}}}{{{{", long.as_str()] {
            let analysis = analyzer.analyze(&normalize(Some(text))).await;
            assert_schema_valid(&analysis);
        }
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}
