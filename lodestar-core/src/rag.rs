//! RAG context assembly from selected local files.
//!
//! Chunks each file's content into fixed-size overlapping character
//! windows and concatenates chunks under a token budget measured with the
//! cl100k tokenizer. Individual file failures are skipped; the call fails
//! only when zero files could be read.

use crate::config::RagConfig;
use crate::error::FetchError;
use crate::fetch;
use crate::types::SavedFileSnapshot;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Characters of file content kept as the saved-result preview.
const PREVIEW_CHARS: usize = 240;

/// Assembled context plus snapshots of the files that contributed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuiltContext {
    pub text: String,
    pub files: Vec<SavedFileSnapshot>,
}

/// Abstraction over local context assembly.
#[async_trait]
pub trait ContextBuilder: Send + Sync {
    /// Build context text for a query from the selected paths.
    ///
    /// Skips unreadable files; fails only if every file fails.
    async fn build_context(
        &self,
        query: &str,
        paths: &[PathBuf],
    ) -> Result<BuiltContext, FetchError>;
}

/// Production builder chunking file content under a token budget.
pub struct ChunkingContextBuilder {
    home_root: PathBuf,
    config: RagConfig,
    bpe: tiktoken_rs::CoreBPE,
}

impl ChunkingContextBuilder {
    pub fn new(home_root: PathBuf, config: RagConfig) -> Self {
        let bpe = tiktoken_rs::cl100k_base().expect("cl100k_base should be available");
        Self {
            home_root,
            config,
            bpe,
        }
    }

    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

#[async_trait]
impl ContextBuilder for ChunkingContextBuilder {
    async fn build_context(
        &self,
        query: &str,
        paths: &[PathBuf],
    ) -> Result<BuiltContext, FetchError> {
        if paths.is_empty() {
            return Ok(BuiltContext::default());
        }

        let mut text = format!("Local documents related to: {query}\n");
        let mut budget = self
            .config
            .token_budget
            .saturating_sub(self.count_tokens(&text));
        let mut files = Vec::new();

        for path in paths {
            let fetched = match fetch::read_file(&self.home_root, path, self.config.max_file_bytes)
            {
                Ok(f) => f,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable file");
                    continue;
                }
            };

            let name = fetched
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| fetched.path.display().to_string());
            files.push(SavedFileSnapshot {
                name: name.clone(),
                path: fetched.path.clone(),
                extension: fetched
                    .path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("")
                    .to_lowercase(),
                content_preview: fetched.content.chars().take(PREVIEW_CHARS).collect(),
            });

            if budget == 0 {
                continue; // keep collecting snapshots, stop adding text
            }

            let header = format!("\n--- {name} ---\n");
            let header_tokens = self.count_tokens(&header);
            if header_tokens > budget {
                budget = 0;
                continue;
            }
            text.push_str(&header);
            budget -= header_tokens;

            for chunk in chunk_text(
                &fetched.content,
                self.config.chunk_size,
                self.config.chunk_overlap,
            ) {
                let chunk_tokens = self.count_tokens(&chunk);
                if chunk_tokens > budget {
                    budget = 0;
                    break;
                }
                text.push_str(&chunk);
                text.push('\n');
                budget -= chunk_tokens;
            }
        }

        if files.is_empty() {
            return Err(FetchError::NoReadableFiles {
                attempted: paths.len(),
            });
        }

        debug!(
            files = files.len(),
            tokens_left = budget,
            "Built local context"
        );
        Ok(BuiltContext { text, files })
    }
}

/// Split text into fixed-size overlapping character windows.
///
/// The step is `size - overlap`, clamped to at least one character so the
/// loop always advances.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || size == 0 {
        return Vec::new();
    }
    let step = size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// A scripted context builder for testing.
///
/// Records the paths of every call so tests can assert exactly which
/// selection reached retrieval.
pub struct MockContextBuilder {
    outcome: std::sync::Mutex<Option<Result<BuiltContext, FetchError>>>,
    calls: std::sync::Mutex<Vec<Vec<PathBuf>>>,
}

impl MockContextBuilder {
    /// A builder returning the given text once (failing afterwards).
    pub fn with_text(text: &str) -> Self {
        Self {
            outcome: std::sync::Mutex::new(Some(Ok(BuiltContext {
                text: text.to_string(),
                files: Vec::new(),
            }))),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// A builder that fails every call.
    pub fn failing() -> Self {
        Self {
            outcome: std::sync::Mutex::new(None),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// The path lists observed, in call order.
    pub fn calls(&self) -> Vec<Vec<PathBuf>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContextBuilder for MockContextBuilder {
    async fn build_context(
        &self,
        _query: &str,
        paths: &[PathBuf],
    ) -> Result<BuiltContext, FetchError> {
        self.calls.lock().unwrap().push(paths.to_vec());
        match self.outcome.lock().unwrap().take() {
            Some(outcome) => outcome,
            None => Err(FetchError::NoReadableFiles {
                attempted: paths.len(),
            }),
        }
    }
}
