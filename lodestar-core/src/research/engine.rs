//! Research resilience engine.
//!
//! Wraps the single-call transport with the full degradation policy:
//! credential pre-checks, model allow-list substitution, connectivity-gated
//! retry, bounded attempt counts, and fallback to a deterministic locally
//! synthesized placeholder when the real call is unavailable.
//!
//! `research()` never fails its caller unless `force_real` is set — every
//! other outcome resolves to a well-formed [`ResearchResult`] whose tagged
//! outcome conveys degradation.

use super::extract::{extract_references, strip_references_section};
use super::probe::{ConnectivityProbe, HttpProber, ProbeOutcome};
use super::transport::{HttpResearchTransport, ResearchTransport, DEFAULT_BASE_URL};
use crate::config::ResearchConfig;
use crate::error::TransportError;
use crate::types::{
    ChatMessage, CompletionRequest, DegradeReason, Reference, ResearchOutcome, ResearchResult,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Model identifiers the research API accepts.
pub const KNOWN_MODELS: [&str; 4] = [
    "sonar",
    "sonar-pro",
    "sonar-reasoning",
    "sonar-deep-research",
];

/// Substituted for any model identifier not on the allow-list.
pub const DEFAULT_MODEL: &str = "sonar-pro";

/// Expected credential prefix; anything else fails the cheap format check.
pub const CREDENTIAL_PREFIX: &str = "pplx-";

/// Marker prefixed to every locally synthesized placeholder answer.
pub const PLACEHOLDER_MARKER: &str = "[simulated]";

const SYSTEM_PROMPT: &str = "You are a research assistant that provides comprehensive, factual, \
     and up-to-date information. Format citations at the end as a numbered list with titles, \
     snippets, and URLs.";

/// Per-call attempt bookkeeping; scoped to one resolve-or-exhaust cycle.
struct ResearchAttemptState {
    attempt: u32,
    force_real: bool,
    events: Vec<String>,
}

impl ResearchAttemptState {
    fn new(force_real: bool) -> Self {
        Self {
            attempt: 0,
            force_real,
            events: Vec::new(),
        }
    }

    fn log(&mut self, event: impl Into<String>) {
        self.events.push(event.into());
    }
}

/// The resilience engine wrapping transport and prober.
pub struct ResearchEngine {
    transport: Arc<dyn ResearchTransport>,
    prober: Arc<dyn ConnectivityProbe>,
    config: ResearchConfig,
}

impl ResearchEngine {
    /// Create an engine over explicit transport and prober implementations.
    pub fn new(
        transport: Arc<dyn ResearchTransport>,
        prober: Arc<dyn ConnectivityProbe>,
        config: ResearchConfig,
    ) -> Self {
        Self {
            transport,
            prober,
            config,
        }
    }

    /// Create an engine with the production HTTP transport and prober.
    pub fn from_config(config: ResearchConfig) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let transport = Arc::new(HttpResearchTransport::new(
            Some(base_url.clone()),
            Duration::from_secs(config.timeout_secs),
        ));
        let prober = Arc::new(HttpProber::new(
            base_url,
            Duration::from_secs(config.probe_timeout_secs),
        ));
        Self::new(transport, prober, config)
    }

    /// Resolve the model to use: the requested one if on the allow-list,
    /// else the configured one if valid, else the documented default.
    pub fn resolve_model(&self, requested: Option<&str>) -> String {
        let candidate = requested.unwrap_or(&self.config.model);
        if KNOWN_MODELS.contains(&candidate) {
            candidate.to_string()
        } else {
            debug!(
                requested = candidate,
                substituted = DEFAULT_MODEL,
                "Unknown research model, substituting default"
            );
            DEFAULT_MODEL.to_string()
        }
    }

    /// Perform a research call with the full resilience policy.
    ///
    /// Returns `Err` only when `force_real` is set and every attempt has
    /// been exhausted (or no credential exists to attempt with); all other
    /// failures degrade to a placeholder result.
    pub async fn research(
        &self,
        query: &str,
        credential: Option<&str>,
        model: Option<&str>,
        force_real: bool,
    ) -> Result<ResearchResult, TransportError> {
        let model = self.resolve_model(model);
        let mut state = ResearchAttemptState::new(force_real);

        // Credential gate: the placeholder path is a designed fallback,
        // not an error path, and performs no network I/O.
        let credential = match credential {
            None => {
                if force_real {
                    return Err(TransportError::MissingCredential {
                        provider: "research".to_string(),
                    });
                }
                state.log("no credential; returning placeholder");
                info!(query, "Research degraded: no credential");
                return Ok(placeholder_result(
                    query,
                    DegradeReason::MissingCredential,
                    None,
                    state.events,
                ));
            }
            Some(c) => c,
        };

        if !credential.starts_with(CREDENTIAL_PREFIX) && !state.force_real {
            state.log(format!(
                "credential failed format pre-check (expected '{CREDENTIAL_PREFIX}' prefix)"
            ));
            warn!("Research degraded: credential format check failed");
            return Ok(placeholder_result(
                query,
                DegradeReason::InvalidCredential,
                Some(format!(
                    "credential does not match the expected format (prefix '{CREDENTIAL_PREFIX}')"
                )),
                state.events,
            ));
        }

        // Connectivity gate, first attempt only and never under force-real.
        if !state.force_real {
            let outcome = self.probe_with_retry(&mut state).await;
            if !outcome.reachable {
                state.log(format!("provider unreachable: {}", outcome.detail));
                warn!(detail = %outcome.detail, "Research degraded: provider unreachable");
                return Ok(placeholder_result(
                    query,
                    DegradeReason::Unreachable,
                    Some(format!("connectivity probe failed: {}", outcome.detail)),
                    state.events,
                ));
            }
        }

        let request = self.build_request(query, &model);
        let max_attempts = if state.force_real {
            self.config.retry.force_real_total_attempts.max(1)
        } else {
            1 + self.config.retry.transient_retries
        };

        let mut last_err: Option<TransportError> = None;
        while state.attempt < max_attempts {
            state.log(format!(
                "transport attempt {} of {max_attempts}",
                state.attempt + 1
            ));
            match self.transport.send(credential, &request).await {
                Ok(raw) => {
                    state.log("transport attempt succeeded");
                    let answer = strip_references_section(&raw.content);
                    let references = extract_references(&raw.content);
                    info!(
                        attempts = state.attempt + 1,
                        references = references.len(),
                        "Research completed"
                    );
                    return Ok(ResearchResult {
                        answer,
                        references,
                        outcome: ResearchOutcome::Real,
                        trace: state.events,
                    });
                }
                Err(e) => {
                    state.log(format!(
                        "attempt {} failed: {e}{}",
                        state.attempt + 1,
                        if e.is_transient() { " (transient)" } else { "" }
                    ));
                    warn!(attempt = state.attempt + 1, error = %e, "Research attempt failed");
                    state.attempt += 1;

                    // Without force-real only transient failures earn a
                    // retry; force-real keeps going to the attempt cap.
                    if !state.force_real && !e.is_transient() {
                        last_err = Some(e);
                        break;
                    }
                    last_err = Some(e);
                    if state.attempt < max_attempts && self.config.retry.backoff_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(self.config.retry.backoff_ms))
                            .await;
                    }
                }
            }
        }

        let err = last_err.unwrap_or(TransportError::Connection {
            message: "no transport attempts were made".to_string(),
        });

        if state.force_real {
            // force_real is an explicit opt-out of the degradation net.
            return Err(err);
        }

        state.log("retries exhausted; returning placeholder");
        Ok(placeholder_result(
            query,
            DegradeReason::RetriesExhausted,
            Some(err.to_string()),
            state.events,
        ))
    }

    /// Probe the provider, retrying up to the configured number of rounds.
    async fn probe_with_retry(&self, state: &mut ResearchAttemptState) -> ProbeOutcome {
        let rounds = self.config.retry.probe_rounds.max(1);
        let mut outcome = self.prober.probe().await;
        state.log(format!("probe round 1: {}", outcome.detail));
        let mut round = 1;
        while !outcome.reachable && round < rounds {
            outcome = self.prober.probe().await;
            round += 1;
            state.log(format!("probe round {round}: {}", outcome.detail));
        }
        outcome
    }

    /// Build the completion request with the documented prompt pair.
    fn build_request(&self, query: &str, model: &str) -> CompletionRequest {
        CompletionRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(format!("Research this topic thoroughly with citations: {query}")),
            ],
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
        }
    }
}

/// Compose a deterministic placeholder result for a query.
///
/// A pure function of the query text: repeated calls with the same query
/// produce identical content, so degraded sessions are stable and
/// testable. Performs no I/O and reads no clocks.
pub fn placeholder_result(
    query: &str,
    reason: DegradeReason,
    error: Option<String>,
    trace: Vec<String>,
) -> ResearchResult {
    let keywords = topic_keywords(query);
    let topic = if keywords.is_empty() {
        query.trim().to_string()
    } else {
        keywords.join(", ")
    };

    let mut answer = format!(
        "{PLACEHOLDER_MARKER} Live web research was unavailable ({reason}); \
         this overview was composed locally from the query alone.\n\n\
         Topic focus: {topic}.\n"
    );
    for keyword in &keywords {
        answer.push_str(&format!(
            "\n- \"{keyword}\" is a central term of this query; consult primary sources for current developments."
        ));
    }

    let references = keywords
        .iter()
        .take(3)
        .map(|keyword| Reference {
            title: format!("Overview of {keyword}"),
            snippet: format!("Background reading related to {keyword}."),
            url: format!("https://en.wikipedia.org/wiki/{}", keyword.replace(' ', "_")),
        })
        .collect();

    ResearchResult {
        answer,
        references,
        outcome: ResearchOutcome::Degraded { reason, error },
        trace,
    }
}

/// Extract up to five topic keywords from a query.
///
/// Lowercases, splits on non-alphanumerics, drops stopwords and short
/// tokens, and keeps first-seen order so extraction is deterministic.
pub fn topic_keywords(query: &str) -> Vec<String> {
    const STOPWORDS: &[&str] = &[
        "the", "a", "an", "of", "in", "on", "for", "to", "and", "or", "is", "are", "was", "were",
        "what", "when", "where", "which", "who", "how", "why", "with", "about", "does", "do",
        "did", "can", "could", "should", "would", "will", "be", "been", "being", "it", "its",
        "this", "that", "these", "those", "between", "into", "from",
    ];

    let lowered = query.to_lowercase();
    let mut seen = Vec::new();
    for token in lowered.split(|c: char| !c.is_alphanumeric()) {
        if token.len() < 3 || STOPWORDS.contains(&token) {
            continue;
        }
        if !seen.iter().any(|s: &String| s == token) {
            seen.push(token.to_string());
        }
        if seen.len() == 5 {
            break;
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::probe::{MockProbe, ProbeDetail};
    use crate::research::transport::MockResearchTransport;
    use pretty_assertions::assert_eq;

    fn engine_with(
        transport: MockResearchTransport,
        prober: MockProbe,
    ) -> (ResearchEngine, Arc<MockResearchTransport>, Arc<MockProbe>) {
        let transport = Arc::new(transport);
        let prober = Arc::new(prober);
        let mut config = ResearchConfig::default();
        config.retry.backoff_ms = 0; // keep tests fast
        let engine = ResearchEngine::new(transport.clone(), prober.clone(), config);
        (engine, transport, prober)
    }

    #[tokio::test]
    async fn test_no_credential_returns_placeholder_without_network() {
        let (engine, transport, prober) =
            engine_with(MockResearchTransport::new(), MockProbe::always_reachable());

        let result = engine
            .research("quantum computing", None, None, false)
            .await
            .unwrap();

        assert!(result.simulated());
        assert!(matches!(
            result.outcome,
            ResearchOutcome::Degraded {
                reason: DegradeReason::MissingCredential,
                ..
            }
        ));
        assert!(result.answer.contains(PLACEHOLDER_MARKER));
        assert_eq!(transport.call_count(), 0);
        assert_eq!(prober.call_count(), 0);
    }

    #[tokio::test]
    async fn test_placeholder_is_idempotent() {
        let (engine, _, _) =
            engine_with(MockResearchTransport::new(), MockProbe::always_reachable());

        let first = engine
            .research("quantum computing hardware", None, None, false)
            .await
            .unwrap();
        let second = engine
            .research("quantum computing hardware", None, None, false)
            .await
            .unwrap();

        assert_eq!(first.answer, second.answer);
        assert_eq!(first.references, second.references);
    }

    #[tokio::test]
    async fn test_bad_format_credential_degrades_with_format_error() {
        let (engine, transport, _) =
            engine_with(MockResearchTransport::new(), MockProbe::always_reachable());

        let result = engine
            .research("rust async", Some("sk-wrong-prefix"), None, false)
            .await
            .unwrap();

        assert!(result.simulated());
        assert!(result.error().unwrap().contains("format"));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_model_substituted_before_transport() {
        let transport = MockResearchTransport::new();
        transport.queue(Ok(MockResearchTransport::completion("answer text")));
        let (engine, transport, _) = engine_with(transport, MockProbe::always_reachable());

        let result = engine
            .research("q", Some("pplx-abc"), Some("gpt-4o"), false)
            .await
            .unwrap();

        assert!(!result.simulated());
        assert_eq!(transport.requests()[0].model, DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn test_known_model_passes_through() {
        let transport = MockResearchTransport::new();
        transport.queue(Ok(MockResearchTransport::completion("a")));
        let (engine, transport, _) = engine_with(transport, MockProbe::always_reachable());

        engine
            .research("q", Some("pplx-abc"), Some("sonar-deep-research"), false)
            .await
            .unwrap();

        assert_eq!(transport.requests()[0].model, "sonar-deep-research");
    }

    #[tokio::test]
    async fn test_request_carries_prompt_pair() {
        let transport = MockResearchTransport::new();
        transport.queue(Ok(MockResearchTransport::completion("a")));
        let (engine, transport, _) = engine_with(transport, MockProbe::always_reachable());

        engine
            .research("rust borrow checker", Some("pplx-abc"), None, false)
            .await
            .unwrap();

        let messages = &transport.requests()[0].messages;
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("research assistant"));
        assert!(messages[1]
            .content
            .contains("Research this topic thoroughly with citations: rust borrow checker"));
    }

    #[tokio::test]
    async fn test_unreachable_provider_probes_twice_then_degrades() {
        let (engine, transport, prober) = engine_with(
            MockResearchTransport::new(),
            MockProbe::always_unreachable(),
        );

        let result = engine
            .research("q", Some("pplx-abc"), None, false)
            .await
            .unwrap();

        assert!(result.simulated());
        assert!(matches!(
            result.outcome,
            ResearchOutcome::Degraded {
                reason: DegradeReason::Unreachable,
                ..
            }
        ));
        assert_eq!(prober.call_count(), 2);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_probe_recovers_on_second_round() {
        let transport = MockResearchTransport::new();
        transport.queue(Ok(MockResearchTransport::completion("recovered")));
        let prober = MockProbe::scripted(vec![
            ProbeOutcome::unreachable(ProbeDetail::Timeout),
            ProbeOutcome::reachable(),
        ]);
        let (engine, transport, _) = engine_with(transport, prober);

        let result = engine
            .research("q", Some("pplx-abc"), None, false)
            .await
            .unwrap();

        assert!(!result.simulated());
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_retried_once_then_degrades() {
        let transport = MockResearchTransport::new();
        transport.queue(Err(TransportError::Timeout { timeout_secs: 1 }));
        transport.queue(Err(TransportError::Connection {
            message: "reset".into(),
        }));
        let (engine, transport, _) = engine_with(transport, MockProbe::always_reachable());

        let result = engine
            .research("q", Some("pplx-abc"), None, false)
            .await
            .unwrap();

        assert!(result.simulated());
        assert!(matches!(
            result.outcome,
            ResearchOutcome::Degraded {
                reason: DegradeReason::RetriesExhausted,
                ..
            }
        ));
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_transient_failure_then_success() {
        let transport = MockResearchTransport::new();
        transport.queue(Err(TransportError::Timeout { timeout_secs: 1 }));
        transport.queue(Ok(MockResearchTransport::completion("second try")));
        let (engine, _, _) = engine_with(transport, MockProbe::always_reachable());

        let result = engine
            .research("q", Some("pplx-abc"), None, false)
            .await
            .unwrap();

        assert!(!result.simulated());
        assert_eq!(result.answer, "second try");
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let transport = MockResearchTransport::new();
        transport.queue(Err(TransportError::ServerError {
            status: 401,
            body: "unauthorized".into(),
        }));
        let (engine, transport, _) = engine_with(transport, MockProbe::always_reachable());

        let result = engine
            .research("q", Some("pplx-abc"), None, false)
            .await
            .unwrap();

        assert!(result.simulated());
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_force_real_attempts_three_times_then_errors() {
        let transport = MockResearchTransport::new();
        for _ in 0..5 {
            transport.queue(Err(TransportError::Timeout { timeout_secs: 1 }));
        }
        let (engine, transport, prober) = engine_with(transport, MockProbe::always_reachable());

        let result = engine
            .research("q", Some("pplx-abc"), None, true)
            .await;

        assert!(matches!(result, Err(TransportError::Timeout { .. })));
        assert_eq!(transport.call_count(), 3);
        // force-real skips the connectivity gate entirely
        assert_eq!(prober.call_count(), 0);
    }

    #[tokio::test]
    async fn test_force_real_without_credential_is_terminal() {
        let (engine, transport, _) =
            engine_with(MockResearchTransport::new(), MockProbe::always_reachable());

        let result = engine.research("q", None, None, true).await;
        assert!(matches!(
            result,
            Err(TransportError::MissingCredential { .. })
        ));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_force_real_ignores_credential_format_check() {
        let transport = MockResearchTransport::new();
        transport.queue(Ok(MockResearchTransport::completion("went through")));
        let (engine, _, _) = engine_with(transport, MockProbe::always_reachable());

        let result = engine
            .research("q", Some("sk-not-pplx"), None, true)
            .await
            .unwrap();
        assert_eq!(result.answer, "went through");
    }

    #[tokio::test]
    async fn test_success_strips_references_and_extracts() {
        let transport = MockResearchTransport::new();
        transport.queue(Ok(MockResearchTransport::completion(
            "Qubits are fragile.\n\nReferences:\n1. Paper - about qubits - https://p.example\n",
        )));
        let (engine, _, _) = engine_with(transport, MockProbe::always_reachable());

        let result = engine
            .research("qubits", Some("pplx-abc"), None, false)
            .await
            .unwrap();

        assert_eq!(result.answer, "Qubits are fragile.");
        assert_eq!(result.references.len(), 1);
        assert_eq!(result.references[0].url, "https://p.example");
    }

    #[test]
    fn test_topic_keywords_deterministic_and_filtered() {
        let kws = topic_keywords("What is the impact of quantum computing on cryptography?");
        assert_eq!(kws, vec!["impact", "quantum", "computing", "cryptography"]);
        assert_eq!(
            kws,
            topic_keywords("What is the impact of quantum computing on cryptography?")
        );
    }

    #[test]
    fn test_topic_keywords_caps_at_five() {
        let kws = topic_keywords("alpha beta gamma delta epsilon zeta eta");
        assert_eq!(kws.len(), 5);
    }

    #[test]
    fn test_placeholder_handles_stopword_only_query() {
        let result = placeholder_result("is it?", DegradeReason::MissingCredential, None, vec![]);
        assert!(result.answer.contains(PLACEHOLDER_MARKER));
        assert!(result.references.is_empty());
    }
}
