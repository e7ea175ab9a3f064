//! Research subsystem.
//!
//! Layered as: a single-call HTTP transport, a connectivity prober, the
//! resilience engine that wraps both with retry and degradation policy,
//! and the pure reference extractor applied to successful output.

pub mod engine;
pub mod extract;
pub mod probe;
pub mod transport;

pub use engine::{
    placeholder_result, topic_keywords, ResearchEngine, CREDENTIAL_PREFIX, DEFAULT_MODEL,
    KNOWN_MODELS, PLACEHOLDER_MARKER,
};
pub use extract::{extract_references, strip_references_section};
pub use probe::{ConnectivityProbe, HttpProber, MockProbe, ProbeDetail, ProbeOutcome};
pub use transport::{
    HttpResearchTransport, MockResearchTransport, ResearchTransport, DEFAULT_BASE_URL,
};
