//! Search session state.
//!
//! A `SearchSession` is the unit of work for one user query. It owns all
//! cross-stage state and is mutated exclusively by the pipeline
//! coordinator; every other component is stateless per call.

use crate::types::{CandidateFile, ReasoningStep, ResearchResult, SavedFileSnapshot, StepKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Current stage of a search session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// No query in flight.
    Idle,
    /// Querying the local file index (research already started).
    LocalIndexQuery,
    /// Suspended: waiting for the user's file selection.
    AwaitingFileSelection,
    /// Extracting text from images.
    Ocr,
    /// Building context from selected local files.
    LocalRetrieval,
    /// Waiting on the concurrent research branch.
    ResearchWait,
    /// Suspended: waiting for the user's approval.
    Approval,
    /// Generating the final answer.
    Synthesis,
    /// Finished; answer and trace are immutable.
    Complete,
    /// Terminal failure.
    Error,
    /// Cancelled by the user.
    Cancelled,
}

impl Stage {
    /// Whether this stage waits on an external (user) signal.
    pub fn is_suspension(&self) -> bool {
        matches!(
            self,
            Stage::AwaitingFileSelection | Stage::ResearchWait | Stage::Approval
        )
    }

    /// Whether the session can no longer advance.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Complete | Stage::Error | Stage::Cancelled)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::LocalIndexQuery => "local_index_query",
            Stage::AwaitingFileSelection => "awaiting_file_selection",
            Stage::Ocr => "ocr",
            Stage::LocalRetrieval => "local_retrieval",
            Stage::ResearchWait => "research_wait",
            Stage::Approval => "approval",
            Stage::Synthesis => "synthesis",
            Stage::Complete => "complete",
            Stage::Error => "error",
            Stage::Cancelled => "cancelled",
        };
        write!(f, "{name}")
    }
}

/// The unit of work for one user query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSession {
    pub id: Uuid,
    pub query: String,
    pub stage: Stage,
    /// True while the session sits at a suspension point.
    pub paused: bool,
    /// Candidates offered at the file selection gate.
    pub candidates: Vec<CandidateFile>,
    /// Paths the user selected.
    pub selected: Vec<PathBuf>,
    /// Assembled local document context.
    pub local_context: String,
    /// Snapshots of files that contributed local context.
    pub file_snapshots: Vec<SavedFileSnapshot>,
    /// Result of the research branch, once observed.
    pub web_research: Option<ResearchResult>,
    /// Append-only trace of stage outcomes.
    pub steps: Vec<ReasoningStep>,
    /// Final synthesized answer.
    pub answer: Option<String>,
    /// Message of a terminal failure.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SearchSession {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            stage: Stage::Idle,
            paused: false,
            candidates: Vec::new(),
            selected: Vec::new(),
            local_context: String::new(),
            file_snapshots: Vec::new(),
            web_research: None,
            steps: Vec::new(),
            answer: None,
            error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Move to a new stage, maintaining the paused flag.
    pub fn transition(&mut self, stage: Stage) {
        self.stage = stage;
        self.paused = stage.is_suspension();
        self.updated_at = Utc::now();
    }

    /// Append a trace step.
    pub fn add_step(
        &mut self,
        title: impl Into<String>,
        content: impl Into<String>,
        kind: StepKind,
    ) {
        self.steps.push(ReasoningStep::new(title, content, kind));
        self.updated_at = Utc::now();
    }

    /// Record a terminal failure.
    pub fn fail(&mut self, stage_name: &str, message: impl Into<String>) {
        let message = message.into();
        self.error = Some(format!("{stage_name}: {message}"));
        self.transition(Stage::Error);
    }

    /// Discard in-flight state and return to idle after a cancellation.
    pub fn reset_to_idle(&mut self) {
        self.candidates.clear();
        self.selected.clear();
        self.local_context.clear();
        self.file_snapshots.clear();
        self.web_research = None;
        self.answer = None;
        self.error = None;
        self.transition(Stage::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_starts_idle() {
        let session = SearchSession::new("what is rust?");
        assert_eq!(session.stage, Stage::Idle);
        assert!(!session.paused);
        assert!(session.steps.is_empty());
    }

    #[test]
    fn test_transition_tracks_paused_flag() {
        let mut session = SearchSession::new("q");
        session.transition(Stage::LocalIndexQuery);
        assert!(!session.paused);

        session.transition(Stage::AwaitingFileSelection);
        assert!(session.paused);

        session.transition(Stage::LocalRetrieval);
        assert!(!session.paused);
    }

    #[test]
    fn test_stage_classification() {
        assert!(Stage::ResearchWait.is_suspension());
        assert!(Stage::Approval.is_suspension());
        assert!(!Stage::Synthesis.is_suspension());

        assert!(Stage::Complete.is_terminal());
        assert!(Stage::Error.is_terminal());
        assert!(Stage::Cancelled.is_terminal());
        assert!(!Stage::ResearchWait.is_terminal());
    }

    #[test]
    fn test_fail_records_stage_and_cause() {
        let mut session = SearchSession::new("q");
        session.transition(Stage::Synthesis);
        session.fail("synthesis", "provider returned 500");
        assert_eq!(session.stage, Stage::Error);
        assert_eq!(
            session.error.as_deref(),
            Some("synthesis: provider returned 500")
        );
    }

    #[test]
    fn test_reset_to_idle_discards_state() {
        let mut session = SearchSession::new("q");
        session.local_context = "ctx".into();
        session.answer = Some("a".into());
        session.transition(Stage::Approval);

        session.reset_to_idle();
        assert_eq!(session.stage, Stage::Idle);
        assert!(session.local_context.is_empty());
        assert!(session.answer.is_none());
        assert!(!session.paused);
    }

    #[test]
    fn test_stage_serde_snake_case() {
        let json = serde_json::to_string(&Stage::AwaitingFileSelection).unwrap();
        assert_eq!(json, "\"awaiting_file_selection\"");
    }

    #[test]
    fn test_steps_append_in_order() {
        let mut session = SearchSession::new("q");
        session.add_step("one", "", StepKind::Process);
        session.add_step("two", "", StepKind::Result);
        let titles: Vec<&str> = session.steps.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["one", "two"]);
    }
}
