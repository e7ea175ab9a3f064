//! # Lodestar Core
//!
//! Core library for the Lodestar research assistant. Provides the
//! pipeline coordinator, the research resilience engine with its
//! transport and connectivity prober, reference extraction, local file
//! collaborators (index, fetch, RAG context), synthesis adapters, and
//! saved-result persistence.

pub mod config;
pub mod error;
pub mod fetch;
pub mod index;
pub mod ocr;
pub mod pipeline;
pub mod rag;
pub mod research;
pub mod store;
pub mod synthesis;
pub mod types;

// Re-export commonly used types at the crate root.
pub use config::{load_config, LodestarConfig};
pub use error::{LodestarError, Result};
pub use pipeline::{PipelineCoordinator, PipelineStatus, SearchSession, Stage};
pub use research::{ResearchEngine, PLACEHOLDER_MARKER};
pub use store::SavedResultStore;
pub use types::{
    CandidateFile, ChatMessage, CompletionRequest, DegradeReason, RawCompletion, ReasoningStep,
    Reference, ResearchOutcome, ResearchResult, Role, SavedFileSnapshot, SavedResult, StepKind,
    SynthesisOutput, TokenUsage,
};
