//! HTTP transport for the research answer-engine API.
//!
//! Executes exactly one outbound call per `send` with a bounded timeout.
//! Retry, fallback, and degradation decisions belong to the resilience
//! engine in [`super::engine`]; this layer only classifies failures.
//!
//! The wire format is the answer engine's chat-completions shape: POST
//! `{base_url}/chat/completions` with bearer auth, responses carrying the
//! answer in `choices[0].message.content`.

use crate::error::TransportError;
use crate::types::{CompletionRequest, RawCompletion, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// The default research API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";

/// Abstraction over the single-call research transport.
#[async_trait]
pub trait ResearchTransport: Send + Sync {
    /// Perform one completion call with the given credential.
    ///
    /// Returns the raw parsed response body on HTTP 2xx; otherwise a
    /// classified [`TransportError`]. Never retries.
    async fn send(
        &self,
        credential: &str,
        request: &CompletionRequest,
    ) -> Result<RawCompletion, TransportError>;
}

/// Production transport speaking HTTP to the research API.
pub struct HttpResearchTransport {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpResearchTransport {
    /// Create a transport for the given base URL (or the default) with a
    /// full-request timeout. Research models can take minutes, so the
    /// timeout is generous.
    pub fn new(base_url: Option<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout,
        }
    }

    /// The base URL this transport targets.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Map a reqwest send failure to a transport error.
    fn map_send_error(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                timeout_secs: self.timeout.as_secs(),
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

    /// Parse a successful response body into a `RawCompletion`.
    fn parse_response(body: &Value) -> Result<RawCompletion, TransportError> {
        let content = body
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

        Ok(RawCompletion { content, usage })
    }
}

#[async_trait]
impl ResearchTransport for HttpResearchTransport {
    async fn send(
        &self,
        credential: &str,
        request: &CompletionRequest,
    ) -> Result<RawCompletion, TransportError> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!(
            model = request.model.as_str(),
            url = url.as_str(),
            "Sending research completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(credential)
            .header("content-type", "application/json")
            .json(request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

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
}

/// A mock transport for testing and development.
///
/// Returns queued outcomes in order and records every request it saw,
/// so tests can assert both call counts and payload contents.
#[derive(Default)]
pub struct MockResearchTransport {
    outcomes: std::sync::Mutex<Vec<Result<RawCompletion, TransportError>>>,
    requests: std::sync::Mutex<Vec<CompletionRequest>>,
}

impl MockResearchTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outcome for the next `send` call.
    pub fn queue(&self, outcome: Result<RawCompletion, TransportError>) {
        self.outcomes.lock().unwrap().push(outcome);
    }

    /// A simple successful completion for tests.
    pub fn completion(content: &str) -> RawCompletion {
        RawCompletion {
            content: content.to_string(),
            usage: Some(TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            }),
        }
    }

    /// Number of `send` calls observed.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Copy of the requests observed, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResearchTransport for MockResearchTransport {
    async fn send(
        &self,
        _credential: &str,
        request: &CompletionRequest,
    ) -> Result<RawCompletion, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            // Unqueued mocks behave like an unreachable provider.
            Err(TransportError::Timeout { timeout_secs: 240 })
        } else {
            outcomes.remove(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "sonar-pro".into(),
            messages: vec![ChatMessage::user("q")],
            temperature: None,
            max_tokens: None,
        }
    }

    #[test]
    fn test_parse_response_extracts_content_and_usage() {
        let body = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "the answer"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 34}
        });
        let parsed = HttpResearchTransport::parse_response(&body).unwrap();
        assert_eq!(parsed.content, "the answer");
        assert_eq!(
            parsed.usage,
            Some(TokenUsage {
                input_tokens: 12,
                output_tokens: 34
            })
        );
    }

    #[test]
    fn test_parse_response_missing_content() {
        let body = serde_json::json!({"choices": []});
        let err = HttpResearchTransport::parse_response(&body).unwrap_err();
        assert!(matches!(err, TransportError::ResponseParse { .. }));
    }

    #[test]
    fn test_parse_response_without_usage() {
        let body = serde_json::json!({
            "choices": [{"message": {"content": "ok"}}]
        });
        let parsed = HttpResearchTransport::parse_response(&body).unwrap();
        assert_eq!(parsed.content, "ok");
        assert!(parsed.usage.is_none());
    }

    #[tokio::test]
    async fn test_mock_transport_queues_in_order() {
        let mock = MockResearchTransport::new();
        mock.queue(Ok(MockResearchTransport::completion("first")));
        mock.queue(Err(TransportError::Timeout { timeout_secs: 1 }));

        let first = mock.send("key", &request()).await.unwrap();
        assert_eq!(first.content, "first");
        assert!(mock.send("key", &request()).await.is_err());
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_transport_records_payloads() {
        let mock = MockResearchTransport::new();
        mock.queue(Ok(MockResearchTransport::completion("x")));
        let mut req = request();
        req.model = "sonar-reasoning".into();
        mock.send("key", &req).await.unwrap();
        assert_eq!(mock.requests()[0].model, "sonar-reasoning");
    }

    #[test]
    fn test_default_base_url() {
        let transport = HttpResearchTransport::new(None, Duration::from_secs(240));
        assert_eq!(transport.base_url(), DEFAULT_BASE_URL);
    }
}
