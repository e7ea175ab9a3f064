//! Local file content retrieval.
//!
//! Reads selected files for context building under three hard rules:
//! paths must stay inside the home directory, known binary extensions are
//! refused without attempting to decode them, and content beyond the size
//! cap is truncated with the truncation reported to the caller.

use crate::error::FetchError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extensions refused outright; decoding them as text is never useful.
const BINARY_EXTENSIONS: &[&str] = &[
    "exe", "dll", "so", "dylib", "bin", "dat", "o", "a", "class", "png", "jpg", "jpeg", "gif",
    "bmp", "ico", "webp", "zip", "tar", "gz", "bz2", "xz", "7z", "rar", "iso", "mp3", "wav",
    "flac", "mp4", "avi", "mov", "mkv", "pdf", "doc", "docx", "ppt", "pptx", "xls", "xlsx",
    "sqlite", "db",
];

/// A fetched file's text content.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedFile {
    pub path: PathBuf,
    pub content: String,
    /// True when the content was cut at the size cap.
    pub truncated: bool,
}

/// Whether an extension is on the binary refusal list.
pub fn is_binary_extension(extension: &str) -> bool {
    BINARY_EXTENSIONS.contains(&extension.to_lowercase().as_str())
}

/// Read a file's text content for context building.
///
/// `home_root` is the containment boundary (normally the user's home
/// directory); `max_bytes` the truncation cap.
pub fn read_file(home_root: &Path, path: &Path, max_bytes: usize) -> Result<FetchedFile, FetchError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if is_binary_extension(&extension) {
        return Err(FetchError::BinaryFile {
            path: path.to_path_buf(),
        });
    }

    // Canonicalize both sides so symlinks cannot escape the boundary.
    let root = home_root
        .canonicalize()
        .unwrap_or_else(|_| home_root.to_path_buf());
    let canonical = path.canonicalize().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => FetchError::NotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => FetchError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => FetchError::NotFound {
            path: path.to_path_buf(),
        },
    })?;
    if !canonical.starts_with(&root) {
        return Err(FetchError::OutsideHome {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(&canonical).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => FetchError::NotFound { path: canonical.clone() },
        std::io::ErrorKind::PermissionDenied => FetchError::PermissionDenied {
            path: canonical.clone(),
        },
        // Undeclared binary content fails UTF-8 decoding.
        _ => FetchError::BinaryFile {
            path: canonical.clone(),
        },
    })?;

    let truncated = content.len() > max_bytes;
    let content = if truncated {
        let mut cut = max_bytes;
        while !content.is_char_boundary(cut) {
            cut -= 1;
        }
        content[..cut].to_string()
    } else {
        content
    };

    debug!(
        path = %canonical.display(),
        bytes = content.len(),
        truncated,
        "Fetched local file"
    );
    Ok(FetchedFile {
        path: canonical,
        content,
        truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_reads_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        fs::write(&path, "hello world").unwrap();

        let fetched = read_file(dir.path(), &path, 1024).unwrap();
        assert_eq!(fetched.content, "hello world");
        assert!(!fetched.truncated);
    }

    #[test]
    fn test_rejects_binary_extension_without_reading() {
        let dir = tempfile::tempdir().unwrap();
        // The file does not even exist; the extension check comes first.
        let path = dir.path().join("slides.pdf");
        let err = read_file(dir.path(), &path, 1024).unwrap_err();
        assert!(matches!(err, FetchError::BinaryFile { .. }));
    }

    #[test]
    fn test_rejects_path_outside_root() {
        let root = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let path = outside.path().join("secret.txt");
        fs::write(&path, "x").unwrap();

        let err = read_file(root.path(), &path, 1024).unwrap_err();
        assert!(matches!(err, FetchError::OutsideHome { .. }));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_file(dir.path(), &dir.path().join("nope.txt"), 1024).unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
    }

    #[test]
    fn test_truncates_at_cap_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        fs::write(&path, "a".repeat(100)).unwrap();

        let fetched = read_file(dir.path(), &path, 10).unwrap();
        assert_eq!(fetched.content.len(), 10);
        assert!(fetched.truncated);
    }

    #[test]
    fn test_truncation_respects_char_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uni.txt");
        fs::write(&path, "héllo wörld être naïve".repeat(10)).unwrap();

        // A cap landing mid-codepoint must back off, not panic.
        let fetched = read_file(dir.path(), &path, 7).unwrap();
        assert!(fetched.truncated);
        assert!(fetched.content.len() <= 7);
    }

    #[test]
    fn test_undeclared_binary_content_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sneaky.txt");
        fs::write(&path, [0xFFu8, 0xFE, 0x00, 0x01, 0x80]).unwrap();

        let err = read_file(dir.path(), &path, 1024).unwrap_err();
        assert!(matches!(err, FetchError::BinaryFile { .. }));
    }

    #[test]
    fn test_is_binary_extension_case_insensitive() {
        assert!(is_binary_extension("PDF"));
        assert!(is_binary_extension("zip"));
        assert!(!is_binary_extension("md"));
        assert!(!is_binary_extension(""));
    }
}
