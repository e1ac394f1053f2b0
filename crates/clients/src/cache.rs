//! Distributed cache cluster adapter (spec §2 item 3, §6 item 4): the
//! health/lifecycle surface over the same Redis Cluster the presence
//! service uses, reusing the connection-manager wrapping idiom from
//! `chatcore-presence`'s `PresenceStore` (see `presence/src/store.rs`)
//! rather than sharing its instance — the health controller must be able
//! to probe the cluster even if the presence service itself is down.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatcore_domain::{PingCause, PingDepth, PingResult};
use chatcore_health::classifier::{classify, ProbeOutcome};
use chatcore_health::pingable::Pingable;
use chatcore_lifecycle::LifecycleService;
use redis::cluster::ClusterClient;
use redis::cluster_async::ClusterConnection;
use tokio::sync::RwLock;
use tracing::info;

const DEEP_LATENCY_THRESHOLD: Duration = Duration::from_millis(150);

pub struct CacheClusterClient {
    urls: Vec<String>,
    conn: RwLock<Option<ClusterConnection>>,
}

impl CacheClusterClient {
    pub fn new(urls: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            urls,
            conn: RwLock::new(None),
        })
    }
}

#[async_trait]
impl LifecycleService for CacheClusterClient {
    async fn start(&self) -> chatcore_common::Result<()> {
        let mut guard = self.conn.write().await;
        if guard.is_some() {
            return Err(chatcore_common::Error::AlreadyStarted);
        }
        let client = ClusterClient::new(self.urls.clone())
            .map_err(|e| chatcore_common::Error::Config(format!("invalid cache cluster urls: {e}")))?;
        let conn = client
            .get_async_connection()
            .await
            .map_err(|e| chatcore_common::Error::Transient(format!("cache cluster connect failed: {e}")))?;
        *guard = Some(conn);
        info!("cache cluster client started");
        Ok(())
    }

    async fn stop(&self) {
        *self.conn.write().await = None;
        info!("cache cluster client stopped");
    }
}

#[async_trait]
impl Pingable for CacheClusterClient {
    /// Cheap liveness check: `PING` one node.
    async fn ping_shallow(&self) -> PingResult {
        let mut result = PingResult::new("cache", PingDepth::Shallow);
        let Some(conn) = self.conn.read().await.clone() else {
            return result.with_cause(PingCause::BadState, "cluster connection not started");
        };
        let mut conn = conn;
        let outcome: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        if let Err(e) = outcome {
            let cause = classify(&ProbeOutcome::Failed(e.to_string()));
            result = result.with_cause(cause, e.to_string());
        }
        result.store_computed_latency(DEEP_LATENCY_THRESHOLD);
        result
    }

    /// End-to-end check: `CLUSTER INFO` and confirm the cluster reports
    /// itself as healthy.
    async fn ping_deep(&self) -> PingResult {
        let mut result = PingResult::new("cache", PingDepth::Deep);
        let Some(conn) = self.conn.read().await.clone() else {
            return result.with_cause(PingCause::BadState, "cluster connection not started");
        };
        let mut conn = conn;
        let info: redis::RedisResult<String> = redis::cmd("CLUSTER")
            .arg("INFO")
            .query_async(&mut conn)
            .await;
        match info {
            Ok(text) if text.contains("cluster_state:ok") => {}
            Ok(text) => {
                result = result.with_cause(PingCause::BadState, format!("cluster not ok: {text}"));
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
