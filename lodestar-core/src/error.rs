//! Error types for the Lodestar core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering research transport, local file retrieval, pipeline, and
//! configuration domains.

use std::path::PathBuf;

/// Top-level error type for the Lodestar core library.
#[derive(Debug, thiserror::Error)]
pub enum LodestarError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from a single research or synthesis API call.
///
/// The transport layer performs exactly one outbound request per call and
/// reports every failure as one of these variants. Retry decisions belong
/// to the resilience engine, not here.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Server returned {status}: {body}")]
    ServerError { status: u16, body: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Connection failed: {message}")]
    Connection { message: String },

    #[error("No credential available for {provider}")]
    MissingCredential { provider: String },
}

impl TransportError {
    /// Whether this failure is transient (timeout / connection family) and
    /// worth retrying. Server-side 5xx responses count as transient; 4xx
    /// responses and parse failures do not.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Timeout { .. } | TransportError::Connection { .. } => true,
            TransportError::ApiRequest { .. } => true,
            TransportError::ServerError { status, .. } => *status >= 500,
            TransportError::ResponseParse { .. } | TransportError::MissingCredential { .. } => {
                false
            }
        }
    }
}

/// Errors from local file content retrieval.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("File not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Refusing to read binary file: {path}")]
    BinaryFile { path: PathBuf },

    #[error("Path is outside the home directory: {path}")]
    OutsideHome { path: PathBuf },

    #[error("No readable files among {attempted} selected")]
    NoReadableFiles { attempted: usize },
}

/// Errors from the pipeline coordinator.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid signal for stage {stage}: expected {expected}")]
    InvalidStateTransition { stage: String, expected: String },

    #[error("Session was cancelled")]
    Cancelled,

    #[error("Synthesis failed: {message}")]
    SynthesisFailed { message: String },

    #[error("No active session")]
    NoSession,
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `LodestarError`.
pub type Result<T> = std::result::Result<T, LodestarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_transport() {
        let err = LodestarError::Transport(TransportError::ServerError {
            status: 503,
            body: "overloaded".into(),
        });
        assert_eq!(
            err.to_string(),
            "Transport error: Server returned 503: overloaded"
        );
    }

    #[test]
    fn test_error_display_fetch() {
        let err = LodestarError::Fetch(FetchError::BinaryFile {
            path: PathBuf::from("/home/u/photo.png"),
        });
        assert_eq!(
            err.to_string(),
            "Fetch error: Refusing to read binary file: /home/u/photo.png"
        );
    }

    #[test]
    fn test_error_display_pipeline() {
        let err = LodestarError::Pipeline(PipelineError::InvalidStateTransition {
            stage: "synthesis".into(),
            expected: "awaiting_file_selection".into(),
        });
        assert_eq!(
            err.to_string(),
            "Pipeline error: Invalid signal for stage synthesis: expected awaiting_file_selection"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LodestarError = io_err.into();
        assert!(matches!(err, LodestarError::Io(_)));
    }

    #[test]
    fn test_transient_classification() {
        assert!(TransportError::Timeout { timeout_secs: 240 }.is_transient());
        assert!(TransportError::Connection {
            message: "reset".into()
        }
        .is_transient());
        assert!(TransportError::ServerError {
            status: 502,
            body: String::new()
        }
        .is_transient());
        assert!(!TransportError::ServerError {
            status: 401,
            body: String::new()
        }
        .is_transient());
        assert!(!TransportError::ResponseParse {
            message: "bad json".into()
        }
        .is_transient());
    }
}
