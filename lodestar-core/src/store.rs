//! Append-only persistence for saved results.
//!
//! Each saved result is one JSON file named by its id under
//! `<data_dir>/saved/`. Writes go to a `.tmp` sibling first and are
//! renamed into place, so a crash never leaves a half-written record.
//! The core neither updates nor deletes records.

use crate::error::Result;
use crate::types::SavedResult;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Filesystem-backed store of saved results.
pub struct SavedResultStore {
    dir: PathBuf,
}

impl SavedResultStore {
    /// Create a store under `data_dir` (the `saved/` subdirectory is
    /// created lazily on first save).
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("saved"),
        }
    }

    /// Persist a result; returns its id.
    pub fn save(&self, result: &SavedResult) -> Result<Uuid> {
        let path = self.dir.join(format!("{}.json", result.id));
        let json = serde_json::to_string_pretty(result)?;
        atomic_write(&path, json.as_bytes())?;
        debug!(id = %result.id, path = %path.display(), "Saved result");
        Ok(result.id)
    }

    /// List all saved results, newest first.
    ///
    /// Unreadable or malformed records are skipped with a warning rather
    /// than failing the listing.
    pub fn list(&self) -> Vec<SavedResult> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };

        let mut results = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e == "json") != Some(true) {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|data| serde_json::from_str::<SavedResult>(&data).map_err(|e| e.to_string()))
            {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable saved result");
                }
            }
        }

        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        results
    }

    /// Load one saved result by id.
    pub fn load(&self, id: &Uuid) -> Result<SavedResult> {
        let path = self.dir.join(format!("{id}.json"));
        let data = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

/// Write bytes to a `.tmp` sibling, then rename into place.
fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
