//! Pipeline coordinator.
//!
//! Drives one `SearchSession` through the stage machine of
//! [`super::session::Stage`], owning all cross-stage state and every
//! collaborator handle. The research branch runs as a concurrent task
//! spawned at `start()`; local stages proceed independently of it and the
//! two meet at `ResearchWait`.
//!
//! All session mutation happens behind one mutex, so a multi-threaded
//! runtime cannot interleave stage updates. The three suspension points
//! (`AwaitingFileSelection`, `ResearchWait`, `Approval`) are plain
//! returns; callers resume with the matching signal method and any
//! mismatched signal is rejected as an invalid transition.

use super::session::{SearchSession, Stage};
use crate::config::LodestarConfig;
use crate::error::{PipelineError, TransportError};
use crate::index::{FileIndex, HomeDirIndex};
use crate::ocr::{OcrProcessor, StubOcrProcessor};
use crate::rag::{ChunkingContextBuilder, ContextBuilder};
use crate::research::engine::{placeholder_result, ResearchEngine};
use crate::synthesis::{create_synthesizer, SynthesisAdapter};
use crate::types::{
    CandidateFile, DegradeReason, ResearchOutcome, ResearchResult, SavedResult, StepKind,
};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// Where the pipeline stands after a driving call returns.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineStatus {
    /// Suspended: the user must select files (or confirm an empty
    /// selection) via [`PipelineCoordinator::resume_with_selection`].
    AwaitingFileSelection { candidates: Vec<CandidateFile> },
    /// Suspended: the research branch has not resolved. Wait with
    /// [`PipelineCoordinator::await_research`] or abandon it with
    /// [`PipelineCoordinator::skip_research`].
    AwaitingResearch,
    /// Suspended: approval required before synthesis.
    AwaitingApproval,
    /// The session finished with an answer.
    Complete { answer: String },
    /// The session failed terminally.
    Failed { message: String },
    /// The session was cancelled and reset.
    Cancelled,
}

/// State of the concurrent research branch.
enum ResearchBranch {
    Idle,
    Running(JoinHandle<Result<ResearchResult, TransportError>>),
    /// Abandoned by the user; a late result must never reach the session.
    Skipped,
    Delivered,
}

struct CoordinatorState {
    session: Option<SearchSession>,
    research: ResearchBranch,
}

/// The pipeline coordinator. One instance drives one session at a time.
pub struct PipelineCoordinator {
    ocr_enabled: bool,
    require_approval: bool,
    index: Arc<dyn FileIndex>,
    context_builder: Arc<dyn ContextBuilder>,
    ocr: Arc<dyn OcrProcessor>,
    synthesizer: Arc<dyn SynthesisAdapter>,
    engine: Arc<ResearchEngine>,
    credential: Option<String>,
    state: Mutex<CoordinatorState>,
}

impl PipelineCoordinator {
    /// Create a coordinator over explicit collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ocr_enabled: bool,
        require_approval: bool,
        index: Arc<dyn FileIndex>,
        context_builder: Arc<dyn ContextBuilder>,
        ocr: Arc<dyn OcrProcessor>,
        synthesizer: Arc<dyn SynthesisAdapter>,
        engine: Arc<ResearchEngine>,
        credential: Option<String>,
    ) -> Self {
        Self {
            ocr_enabled,
            require_approval,
            index,
            context_builder,
            ocr,
            synthesizer,
            engine,
            credential,
            state: Mutex::new(CoordinatorState {
                session: None,
                research: ResearchBranch::Idle,
            }),
        }
    }

    /// Create a coordinator with production collaborators, resolving the
    /// research credential from the configured environment variable.
    pub fn from_config(config: &LodestarConfig) -> Self {
        let home = crate::index::home_dir();
        let credential = std::env::var(&config.research.api_key_env).ok();
        Self::new(
            config.pipeline.ocr_enabled,
            config.pipeline.require_approval,
            Arc::new(HomeDirIndex::new(&config.index)),
            Arc::new(ChunkingContextBuilder::new(home, config.rag.clone())),
            Arc::new(StubOcrProcessor::new(Duration::from_millis(
                config.pipeline.ocr_delay_ms,
            ))),
            create_synthesizer(&config.synthesis),
            Arc::new(ResearchEngine::from_config(config.research.clone())),
            credential,
        )
    }

    /// Start a session for a query.
    ///
    /// Spawns the research branch, queries the local index, and either
    /// suspends at the file selection gate or — when the index comes back
    /// empty — proceeds directly toward retrieval with no local files.
    pub async fn start(&self, query: &str) -> Result<PipelineStatus, PipelineError> {
        let mut state = self.state.lock().await;

        // A restart abandons any previous branch outright.
        if let ResearchBranch::Running(handle) =
            std::mem::replace(&mut state.research, ResearchBranch::Idle)
        {
            handle.abort();
        }

        let mut session = SearchSession::new(query);
        session.transition(Stage::LocalIndexQuery);
        info!(session = %session.id, query, "Pipeline started");

        let engine = self.engine.clone();
        let credential = self.credential.clone();
        let research_query = query.to_string();
        state.research = ResearchBranch::Running(tokio::spawn(async move {
            engine
                .research(&research_query, credential.as_deref(), None, false)
                .await
        }));

        let candidates = self.index.search(query).await;
        session.add_step(
            "Local index",
            format!("{} candidate file(s) matched the query", candidates.len()),
            StepKind::Result,
        );

        if candidates.is_empty() {
            state.session = Some(session);
            return self.advance_after_selection(&mut state, Vec::new()).await;
        }

        session.candidates = candidates.clone();
        session.transition(Stage::AwaitingFileSelection);
        state.session = Some(session);
        Ok(PipelineStatus::AwaitingFileSelection { candidates })
    }

    /// Resume from the file selection gate with the user's selection.
    ///
    /// An intentionally empty selection is valid and yields an empty
    /// local context.
    pub async fn resume_with_selection(
        &self,
        paths: Vec<PathBuf>,
    ) -> Result<PipelineStatus, PipelineError> {
        let mut state = self.state.lock().await;
        self.expect_stage(&state, Stage::AwaitingFileSelection)?;
        self.advance_after_selection(&mut state, paths).await
    }

    /// Block until the research branch resolves, then continue.
    pub async fn await_research(&self) -> Result<PipelineStatus, PipelineError> {
        let mut state = self.state.lock().await;
        self.expect_stage(&state, Stage::ResearchWait)?;

        let result = match std::mem::replace(&mut state.research, ResearchBranch::Delivered) {
            ResearchBranch::Running(handle) => self.join_research(handle).await,
            // Defensive: ResearchWait with no live branch behaves like an
            // exhausted engine rather than wedging the session.
            _ => self.fallback_research_result(&state, "research branch was not running"),
        };
        self.deliver_research(&mut state, result).await
    }

    /// Abandon the research branch and continue with local context only.
    ///
    /// The branch task is aborted; once marked skipped, a late-arriving
    /// result has no path back into the session.
    pub async fn skip_research(&self) -> Result<PipelineStatus, PipelineError> {
        let mut state = self.state.lock().await;
        self.expect_stage(&state, Stage::ResearchWait)?;

        if let ResearchBranch::Running(handle) =
            std::mem::replace(&mut state.research, ResearchBranch::Skipped)
        {
            handle.abort();
        }
        info!("Research branch skipped by user");

        let session = self.session_mut(&mut state)?;
        session.web_research = Some(ResearchResult::skipped());
        session.add_step(
            "Web research",
            "skipped by user; continuing with local context only",
            StepKind::Result,
        );
        self.advance_past_research(&mut state).await
    }

    /// Approve synthesis at the approval gate.
    pub async fn approve(&self) -> Result<PipelineStatus, PipelineError> {
        let mut state = self.state.lock().await;
        self.expect_stage(&state, Stage::Approval)?;
        self.run_synthesis(&mut state).await
    }

    /// Cancel at any suspension point: discard in-flight state, abort the
    /// research branch, persist nothing.
    pub async fn cancel(&self) -> Result<PipelineStatus, PipelineError> {
        let mut state = self.state.lock().await;
        let session = self.session_mut(&mut state)?;
        if !session.stage.is_suspension() {
            return Err(PipelineError::InvalidStateTransition {
                stage: session.stage.to_string(),
                expected: "a suspension point".to_string(),
            });
        }
        info!(session = %session.id, stage = %session.stage, "Session cancelled");
        session.reset_to_idle();

        if let ResearchBranch::Running(handle) =
            std::mem::replace(&mut state.research, ResearchBranch::Idle)
        {
            handle.abort();
        }
        Ok(PipelineStatus::Cancelled)
    }

    /// Snapshot of the current session, if any.
    pub async fn session(&self) -> Option<SearchSession> {
        self.state.lock().await.session.clone()
    }

    /// Build the persistable record of a completed session.
    pub async fn saved_result(&self) -> Result<SavedResult, PipelineError> {
        let state = self.state.lock().await;
        let session = state.session.as_ref().ok_or(PipelineError::NoSession)?;
        if session.stage != Stage::Complete {
            return Err(PipelineError::InvalidStateTransition {
                stage: session.stage.to_string(),
                expected: "complete".to_string(),
            });
        }
        Ok(SavedResult {
            id: Uuid::new_v4(),
            query: session.query.clone(),
            answer: session.answer.clone().unwrap_or_default(),
            sources: session
                .web_research
                .as_ref()
                .map(|r| r.references.clone())
                .unwrap_or_default(),
            files: session.file_snapshots.clone(),
            created_at: Utc::now(),
        })
    }

    // -----------------------------------------------------------------
    // Internal stage drivers (all called with the state lock held)
    // -----------------------------------------------------------------

    async fn advance_after_selection(
        &self,
        state: &mut CoordinatorState,
        paths: Vec<PathBuf>,
    ) -> Result<PipelineStatus, PipelineError> {
        let ocr_enabled = self.ocr_enabled;
        let session = self.session_mut(state)?;
        session.selected = paths.clone();

        if ocr_enabled && !paths.is_empty() {
            session.transition(Stage::Ocr);
            let ocr_text = self.ocr.extract(&paths).await;
            let session = self.session_mut(state)?;
            session.add_step(
                "OCR",
                format!("extracted {} character(s) of image text", ocr_text.len()),
                StepKind::Process,
            );
            if !ocr_text.is_empty() {
                session.local_context.push_str(&ocr_text);
                session.local_context.push('\n');
            }
        }

        let session = self.session_mut(state)?;
        session.transition(Stage::LocalRetrieval);

        if paths.is_empty() {
            session.add_step(
                "Local retrieval",
                "no files selected; continuing with empty local context",
                StepKind::Result,
            );
        } else {
            let query = session.query.clone();
            match self.context_builder.build_context(&query, &paths).await {
                Ok(built) => {
                    let session = self.session_mut(state)?;
                    session.local_context.push_str(&built.text);
                    session.file_snapshots = built.files;
                    session.add_step(
                        "Local retrieval",
                        format!(
                            "built context from {} of {} selected file(s)",
                            session.file_snapshots.len(),
                            paths.len()
                        ),
                        StepKind::Result,
                    );
                }
                Err(e) => {
                    // Recoverable: the pipeline continues with what it has.
                    warn!(error = %e, "Local retrieval failed; continuing with empty context");
                    let session = self.session_mut(state)?;
                    session.add_step(
                        "Local retrieval",
                        format!("context building failed ({e}); continuing with empty local context"),
                        StepKind::Result,
                    );
                }
            }
        }

        self.enter_research_wait(state).await
    }

    async fn enter_research_wait(
        &self,
        state: &mut CoordinatorState,
    ) -> Result<PipelineStatus, PipelineError> {
        let session = self.session_mut(state)?;
        session.transition(Stage::ResearchWait);

        let running = matches!(&state.research, ResearchBranch::Running(_));
        let finished = matches!(&state.research, ResearchBranch::Running(h) if h.is_finished());

        if running && !finished {
            // Suspend: the caller chooses between waiting and skipping.
            return Ok(PipelineStatus::AwaitingResearch);
        }

        let result = if running {
            let ResearchBranch::Running(handle) =
                std::mem::replace(&mut state.research, ResearchBranch::Delivered)
            else {
                unreachable!("branch state checked under the lock");
            };
            self.join_research(handle).await
        } else {
            // Defensive: a missing branch degrades rather than wedging.
            self.fallback_research_result(state, "no research branch available")
        };
        self.deliver_research(state, result).await
    }

    /// Join a finished (or still running) research task into a result.
    async fn join_research(
        &self,
        handle: JoinHandle<Result<ResearchResult, TransportError>>,
    ) -> ResearchResult {
        match handle.await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                // The engine only errors under force-real, which the
                // coordinator never sets; degrade just in case.
                warn!(error = %e, "Research branch returned an error");
                placeholder_result(
                    "",
                    DegradeReason::RetriesExhausted,
                    Some(e.to_string()),
                    Vec::new(),
                )
            }
            Err(e) => {
                warn!(error = %e, "Research task failed to join");
                placeholder_result(
                    "",
                    DegradeReason::RetriesExhausted,
                    Some(format!("research task failed: {e}")),
                    Vec::new(),
                )
            }
        }
    }

    fn fallback_research_result(&self, state: &CoordinatorState, cause: &str) -> ResearchResult {
        let query = state
            .session
            .as_ref()
            .map(|s| s.query.clone())
            .unwrap_or_default();
        placeholder_result(
            &query,
            DegradeReason::RetriesExhausted,
            Some(cause.to_string()),
            Vec::new(),
        )
    }

    async fn deliver_research(
        &self,
        state: &mut CoordinatorState,
        result: ResearchResult,
    ) -> Result<PipelineStatus, PipelineError> {
        let session = self.session_mut(state)?;
        let summary = match &result.outcome {
            ResearchOutcome::Real => {
                format!("{} reference(s) gathered", result.references.len())
            }
            ResearchOutcome::Degraded { reason, .. } => format!("degraded result ({reason})"),
        };
        session.web_research = Some(result);
        session.add_step("Web research", summary, StepKind::Result);
        self.advance_past_research(state).await
    }

    async fn advance_past_research(
        &self,
        state: &mut CoordinatorState,
    ) -> Result<PipelineStatus, PipelineError> {
        if self.require_approval {
            let session = self.session_mut(state)?;
            session.transition(Stage::Approval);
            session.add_step(
                "Approval",
                "awaiting user approval before synthesis",
                StepKind::Process,
            );
            return Ok(PipelineStatus::AwaitingApproval);
        }
        self.run_synthesis(state).await
    }

    async fn run_synthesis(
        &self,
        state: &mut CoordinatorState,
    ) -> Result<PipelineStatus, PipelineError> {
        let session = self.session_mut(state)?;
        session.transition(Stage::Synthesis);
        let query = session.query.clone();
        let local_context = session.local_context.clone();
        let web_context = session
            .web_research
            .as_ref()
            .map(format_web_context)
            .unwrap_or_default();

        match self
            .synthesizer
            .synthesize(&query, &local_context, &web_context)
            .await
        {
            Ok(output) => {
                let session = self.session_mut(state)?;
                session.answer = Some(output.answer.clone());
                session.add_step("Answer", output.answer.clone(), StepKind::Answer);
                session.transition(Stage::Complete);
                info!(session = %session.id, "Pipeline complete");
                Ok(PipelineStatus::Complete {
                    answer: output.answer,
                })
            }
            Err(e) => {
                // Terminal: synthesis is never retried automatically.
                let session = self.session_mut(state)?;
                session.add_step(
                    "Answer",
                    format!("synthesis failed: {e}"),
                    StepKind::Result,
                );
                session.fail("synthesis", e.to_string());
                let message = session.error.clone().unwrap_or_default();
                warn!(message = %message, "Pipeline failed");
                Ok(PipelineStatus::Failed { message })
            }
        }
    }

    fn expect_stage(
        &self,
        state: &CoordinatorState,
        expected: Stage,
    ) -> Result<(), PipelineError> {
        let session = state.session.as_ref().ok_or(PipelineError::NoSession)?;
        if session.stage != expected {
            return Err(PipelineError::InvalidStateTransition {
                stage: session.stage.to_string(),
                expected: expected.to_string(),
            });
        }
        Ok(())
    }

    fn session_mut<'a>(
        &self,
        state: &'a mut CoordinatorState,
    ) -> Result<&'a mut SearchSession, PipelineError> {
        state.session.as_mut().ok_or(PipelineError::NoSession)
    }
}

/// Render a research result as synthesis context text.
fn format_web_context(result: &ResearchResult) -> String {
    let mut text = result.answer.clone();
    if !result.references.is_empty() {
        text.push_str("\n\nSources:\n");
        for (i, reference) in result.references.iter().enumerate() {
            text.push_str(&format!(
                "{}. {} - {} - {}\n",
                i + 1,
                reference.title,
                reference.snippet,
                reference.url
            ));
        }
    }
    text
}
