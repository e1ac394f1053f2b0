//! Generic reachability adapter (spec §6 items 6-9, "no core-implemented
//! behavior"): wide-column, search, graph, and consensus stores the
//! platform depends on for features outside this core's scope still need
//! a health signal. Each is probed as a bare TCP connect (shallow) and an
//! HTTP HEAD against its configured address (deep), rather than via a
//! store-specific client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatcore_config::ReachabilityTarget;
use chatcore_domain::{PingCause, PingDepth, PingResult};
use chatcore_health::classifier::{classify, ProbeOutcome};
use chatcore_health::pingable::Pingable;
use chatcore_lifecycle::LifecycleService;
use tokio::net::TcpStream;

const DEEP_LATENCY_THRESHOLD: Duration = Duration::from_millis(500);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

pub struct ReachabilityClient {
    target: ReachabilityTarget,
    http: reqwest::Client,
}

impl ReachabilityClient {
    pub fn new(target: ReachabilityTarget) -> Arc<Self> {
        Arc::new(Self {
            target,
            http: reqwest::Client::builder()
                .timeout(CONNECT_TIMEOUT)
                .build()
                .expect("reqwest client config is static and always valid"),
        })
    }
}

/// Reachability targets don't own a connection to start or stop; the
/// lifecycle hooks are no-ops, present only so they can be registered
/// alongside every other dependency in the same controller.
#[async_trait]
impl LifecycleService for ReachabilityClient {
    async fn start(&self) -> chatcore_common::Result<()> {
        Ok(())
    }

    async fn stop(&self) {}
}

#[async_trait]
impl Pingable for ReachabilityClient {
    /// Cheap liveness check: open and immediately drop a TCP connection.
    async fn ping_shallow(&self) -> PingResult {
        let mut result = PingResult::new(self.target.name.clone(), PingDepth::Shallow);
        match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.target.address)).await {
            Ok(Ok(_stream)) => {}
            Ok(Err(e)) => {
                let cause = classify(&ProbeOutcome::Failed(e.to_string()));
                result = result.with_cause(cause, e.to_string());
            }
            Err(_) => {
                result = result.with_cause(PingCause::Timeout, "tcp connect timed out");
            }
        }
        result.store_computed_latency(DEEP_LATENCY_THRESHOLD);
        result
    }

    /// End-to-end check: an HTTP HEAD against the target's address,
    /// treating any response (even a non-2xx one) as evidence the store
    /// is accepting connections and speaking HTTP.
    async fn ping_deep(&self) -> PingResult {
        let mut result = PingResult::new(self.target.name.clone(), PingDepth::Deep);
        let url = format!("http://{}/", self.target.address);
        match self.http.head(&url).send().await {
            Ok(resp) if resp.status().is_server_error() => {
                result = result.with_cause(
                    PingCause::BadResponse,
                    format!("server error: {}", resp.status()),
                );
            }
            Ok(_) => {}
            Err(e) if e.is_timeout() => {
                result = result.with_cause(PingCause::Timeout, e.to_string());
            }
            Err(e) => {
                let cause = classify(&ProbeOutcome::Failed(e.to_string()));
                result = result.with_cause(cause, e.to_string());
            }
        }
        result.store_computed_latency(DEEP_LATENCY_THRESHOLD);
        result
    }
}
