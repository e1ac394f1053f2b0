//! Ping result model and cause taxonomy (spec §3, §4.1).

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Depth of a probe: shallow checks local reachability, deep verifies
/// end-to-end health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PingDepth {
    Shallow,
    Deep,
}

/// The closed set of coarse failure categories a probe can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PingCause {
    Ok,
    Unstable,
    Overloaded,
    Network,
    Tls,
    Timeout,
    BadResponse,
    AuthFailed,
    BadState,
    Internal,
    Unknown,
}

/// Cluster-facing health status. Always the deterministic projection of a
/// `PingCause` through `PingStatus::from(cause)` — never set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PingStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl From<PingCause> for PingStatus {
    fn from(cause: PingCause) -> Self {
        match cause {
            PingCause::Ok => PingStatus::Healthy,
            PingCause::Unstable | PingCause::Overloaded => PingStatus::Degraded,
            PingCause::Network
            | PingCause::Tls
            | PingCause::Timeout
            | PingCause::BadResponse
            | PingCause::AuthFailed
            | PingCause::BadState
            | PingCause::Internal
            | PingCause::Unknown => PingStatus::Unhealthy,
        }
    }
}

/// The outcome of a single probe against one dependency.
///
/// `status` is private and only ever derived from `cause` via the fixed
/// mapping above, so there is no way to construct a result with a status
/// that disagrees with its cause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResult {
    pub target: String,
    pub depth: PingDepth,
    status: PingStatus,
    pub cause: PingCause,
    pub details: String,
    pub latency: Option<Duration>,
    #[serde(skip)]
    checked_at: Option<Instant>,
}

impl PingResult {
    /// A fresh, healthy result for `target`, recorded `checked_at = now`.
    pub fn new(target: impl Into<String>, depth: PingDepth) -> Self {
        Self {
            target: target.into(),
            depth,
            status: PingStatus::Healthy,
            cause: PingCause::Ok,
            details: String::new(),
            latency: None,
            checked_at: Some(Instant::now()),
        }
    }

    pub fn status(&self) -> PingStatus {
        self.status
    }

    /// Set the cause, re-deriving `status` from it.
    pub fn with_cause(mut self, cause: PingCause, details: impl Into<String>) -> Self {
        self.cause = cause;
        self.status = PingStatus::from(cause);
        self.details = details.into();
        self
    }

    /// Compute elapsed time since construction, store it, and demote the
    /// cause to `unstable` if it exceeds `threshold` (spec §4.1).
    pub fn store_computed_latency(&mut self, threshold: Duration) {
        let elapsed = self
            .checked_at
            .map(|at| at.elapsed())
            .unwrap_or_default();
        self.latency = Some(elapsed);
        if elapsed > threshold && self.cause == PingCause::Ok {
            self.cause = PingCause::Unstable;
            self.status = PingStatus::from(self.cause);
        }
    }
}
