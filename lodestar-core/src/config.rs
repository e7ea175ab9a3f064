//! Configuration system for Lodestar.
//!
//! Uses `figment` for layered configuration: defaults -> config file ->
//! environment. Configuration is loaded from
//! `~/.config/lodestar/config.toml`, then `LODESTAR_`-prefixed environment
//! variables (`__` as the section separator, e.g.
//! `LODESTAR_RESEARCH__MODEL=sonar`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Top-level configuration for Lodestar.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LodestarConfig {
    pub research: ResearchConfig,
    pub synthesis: SynthesisConfig,
    pub index: IndexConfig,
    pub rag: RagConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
}

/// Research provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Model identifier (e.g., "sonar-pro", "sonar-deep-research").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    pub base_url: Option<String>,
    /// Full-request timeout in seconds. Research models are slow, so this
    /// is on the order of minutes.
    pub timeout_secs: u64,
    /// Per-attempt timeout for the connectivity probe, in seconds.
    pub probe_timeout_secs: u64,
    /// Sampling temperature for research requests.
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: usize,
    /// Retry policy for the resilience engine.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            model: "sonar-pro".to_string(),
            api_key_env: "PERPLEXITY_API_KEY".to_string(),
            base_url: None,
            timeout_secs: 240,
            probe_timeout_secs: 10,
            temperature: 0.2,
            max_tokens: 4096,
            retry: RetryPolicy::default(),
        }
    }
}

/// Retry policy for the research resilience engine.
///
/// The counts here are policy, not a hard-coded contract; the defaults
/// match the documented behavior (one transient retry, three total
/// attempts under force-real).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries permitted after a transient failure on the first attempt.
    pub transient_retries: u32,
    /// Total attempts permitted when force-real is set.
    pub force_real_total_attempts: u32,
    /// Probe rounds permitted before declaring the provider unreachable.
    pub probe_rounds: u32,
    /// Delay between attempts, in milliseconds.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            transient_retries: 1,
            force_real_total_attempts: 3,
            probe_rounds: 2,
            backoff_ms: 750,
        }
    }
}

/// Synthesis provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Provider family: "anthropic" or "openai".
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override.
    pub base_url: Option<String>,
    /// Maximum tokens to generate in the final answer.
    pub max_tokens: usize,
    /// Sampling temperature.
    pub temperature: f32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: None,
            max_tokens: 1024,
            temperature: 0.7,
            timeout_secs: 120,
        }
    }
}

/// Local file index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Root directory to search. Defaults to the user's home directory;
    /// the index never searches outside it.
    pub root: Option<PathBuf>,
    /// Maximum number of candidates returned per query.
    pub max_results: usize,
    /// Extensions ranked above others in index results.
    pub priority_extensions: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            root: None,
            max_results: 50,
            priority_extensions: [
                "pdf", "doc", "docx", "ppt", "pptx", "html", "htm", "md", "markdown", "txt",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// RAG context builder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Chunk window size in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive windows, in characters.
    pub chunk_overlap: usize,
    /// Token budget for the assembled context.
    pub token_budget: usize,
    /// Per-file content cap in bytes; longer files are truncated.
    pub max_file_bytes: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1200,
            chunk_overlap: 200,
            token_budget: 8000,
            max_file_bytes: 256 * 1024,
        }
    }
}

/// Pipeline coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Whether the OCR stage runs after file selection.
    pub ocr_enabled: bool,
    /// Whether the approval gate runs before synthesis.
    pub require_approval: bool,
    /// Delay of the stub OCR processor, in milliseconds.
    pub ocr_delay_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ocr_enabled: false,
            require_approval: false,
            ocr_delay_ms: 1500,
        }
    }
}

/// Storage configuration for saved results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory override. Defaults to the platform data dir
    /// (`~/.local/share/lodestar` on Linux).
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the effective data directory.
    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.data_dir {
            return dir.clone();
        }
        directories::ProjectDirs::from("io", "lodestar", "lodestar")
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".lodestar"))
    }
}

impl LodestarConfig {
    /// Validate this config and return any warnings.
    ///
    /// Returns human-readable warning messages for problematic values;
    /// does not error so that a slightly-off config file still loads.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.rag.chunk_overlap >= self.rag.chunk_size {
            warnings.push(format!(
                "rag.chunk_overlap ({}) >= rag.chunk_size ({}); chunking would not advance",
                self.rag.chunk_overlap, self.rag.chunk_size
            ));
        }
        if self.research.retry.force_real_total_attempts == 0 {
            warnings.push("research.retry.force_real_total_attempts is 0; force-real calls would never reach the network".to_string());
        }
        if self.index.max_results == 0 {
            warnings.push("index.max_results is 0; the file selection gate will always be skipped".to_string());
        }
        if !(0.0..=2.0).contains(&self.research.temperature) {
            warnings.push(format!(
                "research.temperature ({}) outside the usual 0.0-2.0 range",
                self.research.temperature
            ));
        }
        warnings
    }
}

/// Path of the user-level config file, if a config dir exists.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("io", "lodestar", "lodestar")
        .map(|d| d.config_dir().join("config.toml"))
}

/// Load the layered configuration.
///
/// Layers, later layers winning: serialized defaults, the user config
/// file (or `config_path` when given), `LODESTAR_`-prefixed environment
/// variables with `__` separating sections.
pub fn load_config(config_path: Option<&Path>) -> Result<LodestarConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(LodestarConfig::default()));

    match config_path {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            figment = figment.merge(Toml::file(path));
        }
        None => {
            if let Some(user_config) = user_config_path() {
                if user_config.exists() {
                    figment = figment.merge(Toml::file(&user_config));
                }
            }
        }
    }

    figment = figment.merge(Env::prefixed("LODESTAR_").split("__"));

    figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}
