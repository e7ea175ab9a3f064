//! Synthesis adapters — final answer generation from gathered context.
//!
//! One adapter per model family:
//! - Anthropic Messages API (auth via `x-api-key`, required
//!   `anthropic-version` header, system prompt as a top-level field),
//! - OpenAI-compatible chat completions (bearer auth, system message in
//!   the messages array).
//!
//! When no credential is configured an adapter degrades to a locally
//! composed placeholder answer instead of failing.

use crate::config::SynthesisConfig;
use crate::error::TransportError;
use crate::types::{SynthesisOutput, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

const SYNTHESIS_SYSTEM_PROMPT: &str = "You are a research assistant. Synthesize the provided \
     local documents and web research into one coherent, accurate answer to the user's query. \
     Cite which sources support each claim where possible.";

/// Abstraction over final answer synthesis.
#[async_trait]
pub trait SynthesisAdapter: Send + Sync {
    /// Generate the final answer from local and web context.
    async fn synthesize(
        &self,
        query: &str,
        local_context: &str,
        web_context: &str,
    ) -> Result<SynthesisOutput, TransportError>;

    /// The model this adapter targets.
    fn model_name(&self) -> &str;
}

/// Build the user prompt shared by all adapters.
fn build_user_prompt(query: &str, local_context: &str, web_context: &str) -> String {
    let mut prompt = format!("Query: {query}\n");
    if !local_context.trim().is_empty() {
        prompt.push_str(&format!("\n# Local documents\n{local_context}\n"));
    }
    if !web_context.trim().is_empty() {
        prompt.push_str(&format!("\n# Web research\n{web_context}\n"));
    }
    prompt.push_str("\nAnswer the query using the material above.");
    prompt
}

/// Compose a deterministic offline answer when no credential exists.
///
/// A designed fallback, not an error path: the pipeline treats it as a
/// normal answer. Pure function of its inputs.
pub fn offline_synthesis(query: &str, local_context: &str, web_context: &str) -> SynthesisOutput {
    let mut answer = format!(
        "No synthesis credential is configured, so this answer was assembled locally.\n\n\
         Query: {query}\n"
    );
    if !web_context.trim().is_empty() {
        answer.push_str(&format!("\nWeb research findings:\n{web_context}\n"));
    }
    if !local_context.trim().is_empty() {
        answer.push_str(&format!(
            "\nLocal document excerpts were gathered ({} characters) and are summarized above the query in your session trace.\n",
            local_context.len()
        ));
    }
    SynthesisOutput {
        answer,
        usage: None,
    }
}

fn map_send_error(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            timeout_secs: timeout.as_secs(),
        }
    } else if err.is_connect() {
        TransportError::Connection {
            message: err.to_string(),
        }
    } else {
        TransportError::ApiRequest {
            message: err.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Anthropic Messages API
// ---------------------------------------------------------------------------

/// Synthesis via the Anthropic Messages API.
pub struct AnthropicSynthesizer {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: usize,
    temperature: f32,
    timeout: Duration,
}

impl AnthropicSynthesizer {
    pub fn new(config: &SynthesisConfig, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_BASE_URL.to_string()),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn parse_response(body: &Value) -> Result<SynthesisOutput, TransportError> {
        let answer = body
            .get("content")
            .and_then(|c| c.get(0))
            .and_then(|b| b.get("text"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| TransportError::ResponseParse {
                message: "missing content[0].text".to_string(),
            })?
            .to_string();
        let usage = body.get("usage").map(|u| TokenUsage {
            input_tokens: u.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as usize,
            output_tokens: u
                .get("output_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as usize,
        });
        Ok(SynthesisOutput { answer, usage })
    }
}

#[async_trait]
impl SynthesisAdapter for AnthropicSynthesizer {
    async fn synthesize(
        &self,
        query: &str,
        local_context: &str,
        web_context: &str,
    ) -> Result<SynthesisOutput, TransportError> {
        let Some(ref api_key) = self.api_key else {
            warn!("No synthesis credential; composing offline answer");
            return Ok(offline_synthesis(query, local_context, web_context));
        };

        let url = format!("{}/messages", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "system": SYNTHESIS_SYSTEM_PROMPT,
            "messages": [{
                "role": "user",
                "content": build_user_prompt(query, local_context, web_context),
            }],
        });

        debug!(model = self.model.as_str(), "Sending synthesis request");
        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout))?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| TransportError::ResponseParse {
                message: format!("failed to read response body: {e}"),
            })?;
        if !status.is_success() {
            return Err(TransportError::ServerError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body: Value =
            serde_json::from_str(&body_text).map_err(|e| TransportError::ResponseParse {
                message: format!("invalid JSON in response: {e}"),
            })?;
        Self::parse_response(&body)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible chat completions
// ---------------------------------------------------------------------------

/// Synthesis via an OpenAI-compatible chat completions endpoint.
pub struct OpenAiSynthesizer {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: usize,
    temperature: f32,
    timeout: Duration,
}

impl OpenAiSynthesizer {
    pub fn new(config: &SynthesisConfig, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn parse_response(body: &Value) -> Result<SynthesisOutput, TransportError> {
        let answer = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| TransportError::ResponseParse {
                message: "missing choices[0].message.content".to_string(),
            })?
            .to_string();
        let usage = body.get("usage").map(|u| TokenUsage {
            input_tokens: u
                .get("prompt_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as usize,
            output_tokens: u
                .get("completion_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as usize,
        });
        Ok(SynthesisOutput { answer, usage })
    }
}

#[async_trait]
impl SynthesisAdapter for OpenAiSynthesizer {
    async fn synthesize(
        &self,
        query: &str,
        local_context: &str,
        web_context: &str,
    ) -> Result<SynthesisOutput, TransportError> {
        let Some(ref api_key) = self.api_key else {
            warn!("No synthesis credential; composing offline answer");
            return Ok(offline_synthesis(query, local_context, web_context));
        };

        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": [
                {"role": "system", "content": SYNTHESIS_SYSTEM_PROMPT},
                {"role": "user", "content": build_user_prompt(query, local_context, web_context)},
            ],
        });

        debug!(model = self.model.as_str(), "Sending synthesis request");
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .header("content-type", "application/json")
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout))?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| TransportError::ResponseParse {
                message: format!("failed to read response body: {e}"),
            })?;
        if !status.is_success() {
            return Err(TransportError::ServerError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body: Value =
            serde_json::from_str(&body_text).map_err(|e| TransportError::ResponseParse {
                message: format!("invalid JSON in response: {e}"),
            })?;
        Self::parse_response(&body)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Create the synthesis adapter for the configured model family.
///
/// Resolves the API key from the configured environment variable; a
/// missing key produces an adapter that composes offline answers.
pub fn create_synthesizer(config: &SynthesisConfig) -> Arc<dyn SynthesisAdapter> {
    let api_key = std::env::var(&config.api_key_env).ok();
    match config.provider.as_str() {
        "anthropic" => Arc::new(AnthropicSynthesizer::new(config, api_key)),
        _ => Arc::new(OpenAiSynthesizer::new(config, api_key)),
    }
}

/// A scripted synthesizer for testing.
///
/// Returns queued outcomes in order and records every call.
#[derive(Default)]
pub struct MockSynthesizer {
    outcomes: std::sync::Mutex<Vec<Result<SynthesisOutput, TransportError>>>,
    calls: std::sync::Mutex<Vec<(String, String, String)>>,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, outcome: Result<SynthesisOutput, TransportError>) {
        self.outcomes.lock().unwrap().push(outcome);
    }

    pub fn answer(text: &str) -> SynthesisOutput {
        SynthesisOutput {
            answer: text.to_string(),
            usage: None,
        }
    }

    /// Calls observed as `(query, local_context, web_context)` tuples.
    pub fn calls(&self) -> Vec<(String, String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SynthesisAdapter for MockSynthesizer {
    async fn synthesize(
        &self,
        query: &str,
        local_context: &str,
        web_context: &str,
    ) -> Result<SynthesisOutput, TransportError> {
        self.calls.lock().unwrap().push((
            query.to_string(),
            local_context.to_string(),
            web_context.to_string(),
        ));
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            // Behave like an offline adapter when nothing is queued.
            Ok(offline_synthesis(query, local_context, web_context))
        } else {
            outcomes.remove(0)
        }
    }

    fn model_name(&self) -> &str {
        "mock-synthesizer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_synthesis_includes_web_findings() {
        let out = offline_synthesis("quantum computing", "", "[simulated] derived overview");
        assert!(out.answer.contains("quantum computing"));
        assert!(out.answer.contains("[simulated] derived overview"));
        assert!(out.usage.is_none());
    }

    #[test]
    fn test_offline_synthesis_deterministic() {
        let a = offline_synthesis("q", "local", "web");
        let b = offline_synthesis("q", "local", "web");
        assert_eq!(a, b);
    }

    #[test]
    fn test_user_prompt_omits_empty_sections() {
        let prompt = build_user_prompt("q", "", "");
        assert!(!prompt.contains("# Local documents"));
        assert!(!prompt.contains("# Web research"));

        let prompt = build_user_prompt("q", "docs", "research");
        assert!(prompt.contains("# Local documents"));
        assert!(prompt.contains("# Web research"));
    }

    #[test]
    fn test_anthropic_parse_response() {
        let body = serde_json::json!({
            "content": [{"type": "text", "text": "final answer"}],
            "usage": {"input_tokens": 10, "output_tokens": 20}
        });
        let out = AnthropicSynthesizer::parse_response(&body).unwrap();
        assert_eq!(out.answer, "final answer");
        assert_eq!(
            out.usage,
            Some(TokenUsage {
                input_tokens: 10,
                output_tokens: 20
            })
        );
    }

    #[test]
    fn test_openai_parse_response() {
        let body = serde_json::json!({
            "choices": [{"message": {"content": "final answer"}}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 7}
        });
        let out = OpenAiSynthesizer::parse_response(&body).unwrap();
        assert_eq!(out.answer, "final answer");
    }

    #[tokio::test]
    async fn test_adapter_without_credential_degrades() {
        let adapter = AnthropicSynthesizer::new(&SynthesisConfig::default(), None);
        let out = adapter.synthesize("q", "", "web text").await.unwrap();
        assert!(out.answer.contains("No synthesis credential"));
    }

    #[tokio::test]
    async fn test_mock_records_context() {
        let mock = MockSynthesizer::new();
        mock.queue(Ok(MockSynthesizer::answer("done")));
        let out = mock.synthesize("q", "local", "web").await.unwrap();
        assert_eq!(out.answer, "done");
        assert_eq!(
            mock.calls(),
            vec![("q".to_string(), "local".to_string(), "web".to_string())]
        );
    }
}
