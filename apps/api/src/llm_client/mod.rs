/// LLM Client: the single point of entry for provider calls.
///
/// ARCHITECTURAL RULE: No other module may call the provider API directly.
/// All LLM interactions MUST go through `CompletionProvider`.
///
/// Exactly one attempt per call. Retries are never made here: a duplicate call
/// costs money and the analyzer's local tier already guarantees an answer.
/// A 2xx body that is not a Messages envelope is an error, never content.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod prompts;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1500;
/// Low temperature keeps the JSON shape stable between calls.
const TEMPERATURE: f32 = 0.2;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("LLM response is not a Messages envelope: {0}")]
    MalformedResponse(String),
}

/// Anything that can turn a system instruction plus user text into raw model
/// output. The analyzer depends on this trait, never on `LlmClient` directly.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str, system: &str) -> Result<String, LlmError>;

    fn model(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// HTTP client for the Anthropic Messages API (or any endpoint speaking it).
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl LlmClient {
    pub fn new(api_url: String, api_key: String, model: String) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?,
            api_url,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl CompletionProvider for LlmClient {
    /// One POST to the provider. Returns the text of the first text block.
    async fn complete(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        let request_body = AnthropicRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Try to parse error message
            let message = serde_json::from_str::<AnthropicError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        content_from_body(&body)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Pulls the model text out of a 2xx Messages body.
fn content_from_body(body: &str) -> Result<String, LlmError> {
    let envelope = serde_json::from_str::<LlmResponse>(body)
        .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

    if let Some(usage) = &envelope.usage {
        debug!(
            "LLM call succeeded: input_tokens={}, output_tokens={}",
            usage.input_tokens, usage.output_tokens
        );
    }

    match envelope.text() {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        _ => Err(LlmError::EmptyContent),
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_envelope_text_picks_first_text_block() {
        let body = r#"{
            "content": [
                {"type": "tool_use"},
                {"type": "text", "text": "{\"industry\": \"IT\"}"}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }"#;
        let envelope: LlmResponse = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.text(), Some("{\"industry\": \"IT\"}"));
    }

    #[test]
    fn test_body_without_envelope_is_malformed() {
        let chat_completion = r#"{"id":"chatcmpl-1","choices":[{"message":{"content":"{}"}}]}"#;
        assert!(matches!(
            content_from_body(chat_completion),
            Err(LlmError::MalformedResponse(_))
        ));
        assert!(matches!(
            content_from_body(r#"{"industry": "IT", "score": 7}"#),
            Err(LlmError::MalformedResponse(_))
        ));
        assert!(matches!(
            content_from_body("<html>gateway</html>"),
            Err(LlmError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_envelope_without_text_is_empty() {
        let body = r#"{"content": [{"type": "text", "text": "   "}]}"#;
        assert!(matches!(content_from_body(body), Err(LlmError::EmptyContent)));
        assert!(matches!(content_from_body(r#"{"content": []}"#), Err(LlmError::EmptyContent)));
    }

    #[test]
    fn test_request_carries_temperature_and_system() {
        let request = AnthropicRequest {
            model: "m",
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            system: "sys",
            messages: vec![AnthropicMessage {
                role: "user",
                content: "cv",
            }],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["system"], "sys");
        assert_eq!(value["messages"][0]["role"], "user");
        assert!((value["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    mod over_http {
        use std::sync::Arc;
        use std::time::Duration;

        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::{TcpListener, TcpStream};

        use reqwest::Client;

        use crate::analysis::models::Tier;
        use crate::analysis::orchestrator::Analyzer;
        use crate::intake::normalize;
        use crate::llm_client::{CompletionProvider, LlmClient, LlmError};

        const DETAILED_DEV: &str = "8 years experience with react, node and docker. \
            Led a team of five engineers building payment services and internal tooling for operations.";

        /// Reads one HTTP request: headers, then `content-length` bytes of body.
        async fn read_request(socket: &mut TcpStream) {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    return;
                }
                buf.extend_from_slice(&chunk[..n]);
                let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                    continue;
                };
                let headers = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let body_len = headers
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    return;
                }
            }
        }

        /// Answers a single request with `status` and `body`, returning the URL.
        async fn serve_once(status: &'static str, body: &'static str) -> String {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                let (mut socket, _) = listener.accept().await.unwrap();
                read_request(&mut socket).await;
                let response = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            });
            format!("http://{addr}/v1/messages")
        }

        fn local_client(api_url: String) -> LlmClient {
            LlmClient {
                client: Client::builder().no_proxy().build().unwrap(),
                api_url,
                api_key: "test-key".to_string(),
                model: "test-model".to_string(),
            }
        }

        #[tokio::test]
        async fn test_envelope_text_is_returned() {
            let url = serve_once(
                "200 OK",
                r#"{"content":[{"type":"text","text":"{\"industry\":\"IT\"}"}],"usage":{"input_tokens":3,"output_tokens":4}}"#,
            )
            .await;
            let text = local_client(url).complete("cv", "sys").await.unwrap();
            assert_eq!(text, r#"{"industry":"IT"}"#);
        }

        #[tokio::test]
        async fn test_error_status_carries_api_message() {
            let url = serve_once("529 Overloaded", r#"{"error":{"message":"overloaded"}}"#).await;
            match local_client(url).complete("cv", "sys").await {
                Err(LlmError::Api { status, message }) => {
                    assert_eq!(status, 529);
                    assert_eq!(message, "overloaded");
                }
                other => panic!("expected API error, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_foreign_success_body_falls_back_to_local_tier() {
            let url = serve_once(
                "200 OK",
                r#"{"id":"chatcmpl-1","object":"chat.completion","choices":[{"index":0,"message":{"role":"assistant","content":"{}"}}]}"#,
            )
            .await;
            let provider: Arc<dyn CompletionProvider> = Arc::new(local_client(url));
            let analyzer = Analyzer::new(Some(provider), Duration::from_secs(5), 12_000);

            let analysis = analyzer.analyze(&normalize(Some(DETAILED_DEV))).await;
            assert_eq!(analysis.tier, Tier::Local);
            assert_eq!(analysis.result.industry, "IT");
            assert_eq!(analysis.result.role_seniority, "Senior");
            for skill in ["react", "node", "docker"] {
                assert!(analysis.result.skills.contains(&skill.to_string()));
            }
        }
    }
}
