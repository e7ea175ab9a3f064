//! Local file index.
//!
//! Finds candidate files for a query by walking the user's home directory
//! (never outside it) and matching query keywords against file names.
//! The index never errors its caller: any failure yields an empty list.

use crate::config::IndexConfig;
use crate::types::CandidateFile;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Cap on directory entries visited per query, so a huge home directory
/// cannot stall the pipeline.
const WALK_BUDGET: usize = 50_000;

/// Abstraction over the local file index.
#[async_trait]
pub trait FileIndex: Send + Sync {
    /// Find candidate files for a query. Infallible; empty on failure.
    async fn search(&self, query: &str) -> Vec<CandidateFile>;
}

/// Production index walking the home directory.
pub struct HomeDirIndex {
    root: PathBuf,
    max_results: usize,
    priority_extensions: Vec<String>,
}

impl HomeDirIndex {
    /// Build an index from configuration. The configured root is used only
    /// if it stays inside the home directory; otherwise the home directory
    /// itself is the scope.
    pub fn new(config: &IndexConfig) -> Self {
        let home = home_dir();
        let root = match &config.root {
            Some(root) if root.starts_with(&home) => root.clone(),
            Some(other) => {
                warn!(
                    requested = %other.display(),
                    "Index root outside the home directory; falling back to home"
                );
                home
            }
            None => home,
        };
        Self {
            root,
            max_results: config.max_results,
            priority_extensions: config.priority_extensions.clone(),
        }
    }

    /// Index over an explicit root, for tests.
    pub fn with_root(root: PathBuf, config: &IndexConfig) -> Self {
        Self {
            root,
            max_results: config.max_results,
            priority_extensions: config.priority_extensions.clone(),
        }
    }

    fn candidate_for(&self, path: &Path) -> Option<CandidateFile> {
        let name = path.file_name()?.to_str()?.to_string();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        let modified = path
            .metadata()
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Some(CandidateFile {
            path: path.to_path_buf(),
            priority: self.priority_extensions.contains(&extension),
            name,
            extension,
            modified,
        })
    }
}

#[async_trait]
impl FileIndex for HomeDirIndex {
    async fn search(&self, query: &str) -> Vec<CandidateFile> {
        let keywords: Vec<String> = query
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= 3)
            .map(|t| t.to_string())
            .collect();
        if keywords.is_empty() {
            return Vec::new();
        }

        let root = self.root.clone();
        let max_results = self.max_results;
        let this_root = root.clone();

        // The walk is blocking work; keep it off the async executor.
        let found = tokio::task::spawn_blocking(move || {
            let mut matches: Vec<PathBuf> = Vec::new();
            let mut visited = 0usize;
            for entry in WalkBuilder::new(&this_root).hidden(true).build() {
                visited += 1;
                if visited > WALK_BUDGET || matches.len() >= max_results * 4 {
                    break;
                }
                let Ok(entry) = entry else { continue };
                if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_lowercase();
                if keywords.iter().any(|k| name.contains(k.as_str())) {
                    matches.push(entry.into_path());
                }
            }
            matches
        })
        .await;

        let paths = match found {
            Ok(paths) => paths,
            Err(e) => {
                warn!(error = %e, "Index walk failed; returning no candidates");
                return Vec::new();
            }
        };

        let mut candidates: Vec<CandidateFile> = paths
            .iter()
            .filter_map(|p| self.candidate_for(p))
            .collect();

        // Priority types first, then alphabetical by display name.
        candidates.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        candidates.truncate(self.max_results);

        debug!(
            query,
            root = %root.display(),
            results = candidates.len(),
            "Local index query complete"
        );
        candidates
    }
}

/// The user's home directory, with a cwd fallback for odd environments.
pub fn home_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// A scripted index for testing.
pub struct MockFileIndex {
    candidates: Vec<CandidateFile>,
}

impl MockFileIndex {
    pub fn with_candidates(candidates: Vec<CandidateFile>) -> Self {
        Self { candidates }
    }

    pub fn empty() -> Self {
        Self {
            candidates: Vec::new(),
        }
    }
}

#[async_trait]
impl FileIndex for MockFileIndex {
    async fn search(&self, _query: &str) -> Vec<CandidateFile> {
        self.candidates.clone()
    }
}
