//! Core type definitions for the Lodestar pipeline.
//!
//! Defines the data structures shared across stages: chat messages for the
//! research and synthesis APIs, research results with their provenance,
//! trace steps, local file candidates, and persisted results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Represents a participant role in an API conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single chat message sent to the research or synthesis API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A completion request as handed to the transport layer.
///
/// The transport does not validate `model`; the resilience engine
/// substitutes the default for unknown identifiers before building this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
}

/// Token usage counters reported by a provider, when available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// The raw parsed body of a successful completion call.
#[derive(Debug, Clone)]
pub struct RawCompletion {
    /// Text content of the first choice's message.
    pub content: String,
    /// Usage counters, if the provider reported them.
    pub usage: Option<TokenUsage>,
}

/// A single citation extracted from research output.
///
/// `url` may be a best-effort heuristic extraction and is not guaranteed
/// to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

/// Why a research call degraded to a locally synthesized placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradeReason {
    /// No credential was supplied.
    MissingCredential,
    /// The credential failed the cheap format pre-check.
    InvalidCredential,
    /// The provider host could not be reached.
    Unreachable,
    /// All transport attempts failed.
    RetriesExhausted,
    /// The user skipped the research branch.
    Skipped,
}

impl std::fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DegradeReason::MissingCredential => write!(f, "missing credential"),
            DegradeReason::InvalidCredential => write!(f, "invalid credential format"),
            DegradeReason::Unreachable => write!(f, "provider unreachable"),
            DegradeReason::RetriesExhausted => write!(f, "retries exhausted"),
            DegradeReason::Skipped => write!(f, "skipped by user"),
        }
    }
}

/// Provenance of a research result.
///
/// Modeled as a tagged variant rather than a boolean so callers cannot
/// forget to handle degradation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResearchOutcome {
    /// The answer came from a live provider call.
    Real,
    /// The answer is a locally synthesized placeholder.
    Degraded {
        reason: DegradeReason,
        /// Human-readable message from the failure that triggered
        /// degradation, when one exists.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Output of the research resilience engine.
///
/// Always well-formed: a degraded result is a designed fallback and must
/// be usable downstream without special-casing beyond labeling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    /// The answer text with any trailing references section stripped.
    pub answer: String,
    /// Citations in the order they appeared.
    pub references: Vec<Reference>,
    /// Real vs. degraded provenance.
    pub outcome: ResearchOutcome,
    /// Time-ordered attempt events, for diagnostics.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<String>,
}

impl ResearchResult {
    /// Whether this result is a locally synthesized placeholder.
    pub fn simulated(&self) -> bool {
        matches!(self.outcome, ResearchOutcome::Degraded { .. })
    }

    /// The degradation error message, if any.
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ResearchOutcome::Degraded { error, .. } => error.as_deref(),
            ResearchOutcome::Real => None,
        }
    }

    /// An empty result used when the user skips the research branch.
    pub fn skipped() -> Self {
        Self {
            answer: String::new(),
            references: Vec::new(),
            outcome: ResearchOutcome::Degraded {
                reason: DegradeReason::Skipped,
                error: None,
            },
            trace: Vec::new(),
        }
    }
}

/// Kind of a trace step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// An intermediate pipeline action.
    Process,
    /// The outcome of a stage.
    Result,
    /// The final answer.
    Answer,
}

/// An immutable, append-only trace entry within a search session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub kind: StepKind,
    pub created_at: DateTime<Utc>,
}

impl ReasoningStep {
    pub fn new(title: impl Into<String>, content: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            content: content.into(),
            kind,
            created_at: Utc::now(),
        }
    }
}

/// One hit from the local file index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFile {
    /// Absolute path; the natural key.
    pub path: PathBuf,
    /// Display name (file name without directory).
    pub name: String,
    /// Lowercased extension, empty if none.
    pub extension: String,
    /// Whether the extension is on the priority allow-list.
    pub priority: bool,
    /// Last modification time.
    pub modified: DateTime<Utc>,
}

/// Snapshot of a selected local file captured in a saved result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedFileSnapshot {
    pub name: String,
    pub path: PathBuf,
    pub extension: String,
    /// Leading slice of the file content, for display.
    pub content_preview: String,
}

/// A persisted record of a completed search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedResult {
    pub id: Uuid,
    pub query: String,
    pub answer: String,
    /// Source references, web and local.
    pub sources: Vec<Reference>,
    pub files: Vec<SavedFileSnapshot>,
    pub created_at: DateTime<Utc>,
}

/// Output of a synthesis adapter call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisOutput {
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_constructors() {
        let msg = ChatMessage::system("be helpful");
        assert_eq!(msg.role, Role::System);
        assert_eq!(msg.content, "be helpful");

        let msg = ChatMessage::user("what is rust?");
        assert_eq!(msg.role, Role::User);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::System.to_string(), "system");
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }

    #[test]
    fn test_research_result_simulated() {
        let real = ResearchResult {
            answer: "a".into(),
            references: Vec::new(),
            outcome: ResearchOutcome::Real,
            trace: Vec::new(),
        };
        assert!(!real.simulated());
        assert!(real.error().is_none());

        let degraded = ResearchResult {
            answer: "a".into(),
            references: Vec::new(),
            outcome: ResearchOutcome::Degraded {
                reason: DegradeReason::MissingCredential,
                error: Some("no key".into()),
            },
            trace: Vec::new(),
        };
        assert!(degraded.simulated());
        assert_eq!(degraded.error(), Some("no key"));
    }

    #[test]
    fn test_research_outcome_serde_round_trip() {
        let outcome = ResearchOutcome::Degraded {
            reason: DegradeReason::RetriesExhausted,
            error: Some("timeout".into()),
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("degraded"));
        assert!(json.contains("retries_exhausted"));
        let back: ResearchOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back, outcome);
    }

    #[test]
    fn test_completion_request_omits_empty_params() {
        let req = CompletionRequest {
            model: "sonar-pro".into(),
            messages: vec![ChatMessage::user("q")],
            temperature: None,
            max_tokens: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("temperature"));
        assert!(!json.contains("max_tokens"));
    }
}
