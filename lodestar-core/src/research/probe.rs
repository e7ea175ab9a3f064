//! Connectivity probing for the research API host.
//!
//! A lightweight reachability check run before committing to a full
//! research request, so the resilience engine can tell "can't reach the
//! provider at all" (degrade fast) apart from "reached the provider but
//! the request failed" (worth retrying).
//!
//! Probing never fails: every failure mode collapses to
//! `reachable = false` with a categorized detail.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Categorized result detail of a probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeDetail {
    /// The host answered.
    Ok,
    /// Neither probe request completed within the timeout.
    Timeout,
    /// The host did not answer at all (DNS, refused connection).
    NoResponse,
    /// The host answered with a server-side error status.
    ServerError { status: u16 },
}

impl std::fmt::Display for ProbeDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeDetail::Ok => write!(f, "ok"),
            ProbeDetail::Timeout => write!(f, "timeout"),
            ProbeDetail::NoResponse => write!(f, "no response"),
            ProbeDetail::ServerError { status } => write!(f, "server error {status}"),
        }
    }
}

/// Outcome of a connectivity probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub reachable: bool,
    pub detail: ProbeDetail,
}

impl ProbeOutcome {
    pub fn reachable() -> Self {
        Self {
            reachable: true,
            detail: ProbeDetail::Ok,
        }
    }

    pub fn unreachable(detail: ProbeDetail) -> Self {
        Self {
            reachable: false,
            detail,
        }
    }
}

/// Abstraction over the reachability check.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Check whether the provider host is reachable. Infallible.
    async fn probe(&self) -> ProbeOutcome;
}

/// Production prober: HEAD against a health-check path, falling back to a
/// minimal GET against the API base path, each with a short timeout.
pub struct HttpProber {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }

    /// Classify one probe response or failure.
    ///
    /// Any HTTP answer below 500 counts as reachable — auth failures and
    /// 404s still prove the host is up.
    fn classify(result: Result<reqwest::Response, reqwest::Error>) -> ProbeOutcome {
        match result {
            Ok(response) => {
                let status = response.status();
                if status.is_server_error() {
                    ProbeOutcome::unreachable(ProbeDetail::ServerError {
                        status: status.as_u16(),
                    })
                } else {
                    ProbeOutcome::reachable()
                }
            }
            Err(e) if e.is_timeout() => ProbeOutcome::unreachable(ProbeDetail::Timeout),
            Err(_) => ProbeOutcome::unreachable(ProbeDetail::NoResponse),
        }
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProber {
    async fn probe(&self) -> ProbeOutcome {
        let health_url = format!("{}/health", self.base_url);
        let head = self
            .client
            .head(&health_url)
            .timeout(self.timeout)
            .send()
            .await;
        let outcome = Self::classify(head);
        if outcome.reachable {
            debug!(url = health_url.as_str(), "Probe ok via health path");
            return outcome;
        }

        // Health path failed; fall back to the API base path.
        let base = self
            .client
            .get(&self.base_url)
            .timeout(self.timeout)
            .send()
            .await;
        let outcome = Self::classify(base);
        debug!(
            url = self.base_url.as_str(),
            reachable = outcome.reachable,
            detail = %outcome.detail,
            "Probe fallback result"
        );
        outcome
    }
}

/// A scripted prober for testing.
pub struct MockProbe {
    outcomes: std::sync::Mutex<Vec<ProbeOutcome>>,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockProbe {
    /// A prober returning the given outcomes in order; the last outcome
    /// repeats once the script is exhausted.
    pub fn scripted(outcomes: Vec<ProbeOutcome>) -> Self {
        Self {
            outcomes: std::sync::Mutex::new(outcomes),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// A prober that always reports the host reachable.
    pub fn always_reachable() -> Self {
        Self::scripted(vec![ProbeOutcome::reachable()])
    }

    /// A prober that always reports the host unreachable.
    pub fn always_unreachable() -> Self {
        Self::scripted(vec![ProbeOutcome::unreachable(ProbeDetail::NoResponse)])
    }

    /// Number of probe calls observed.
    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectivityProbe for MockProbe {
    async fn probe(&self) -> ProbeOutcome {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.len() > 1 {
            outcomes.remove(0)
        } else {
            outcomes
                .first()
                .cloned()
                .unwrap_or_else(ProbeOutcome::reachable)
        }
    }
}
