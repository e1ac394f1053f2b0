//! Relational store adapter (spec §2 item 1, §6 item 1): a typed query
//! layer over Postgres, probed but never otherwise special-cased by the
//! core.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatcore_config::DatabaseConfig;
use chatcore_domain::{PingDepth, PingResult};
use chatcore_health::classifier::{classify, ProbeOutcome};
use chatcore_health::pingable::Pingable;
use chatcore_lifecycle::LifecycleService;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::info;

/// Acceptable deep-probe latency for the relational store. Spec §9 Open
/// Question 1 preserves heterogeneous per-target thresholds rather than
/// unifying them; 150ms is this target's value.
const DEEP_LATENCY_THRESHOLD: Duration = Duration::from_millis(150);

pub struct PostgresClient {
    config: DatabaseConfig,
    pool: RwLock<Option<PgPool>>,
}

impl PostgresClient {
    pub fn new(config: DatabaseConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            pool: RwLock::new(None),
        })
    }

    async fn pool(&self) -> Option<PgPool> {
        self.pool.read().await.clone()
    }
}

#[async_trait]
impl LifecycleService for PostgresClient {
    async fn start(&self) -> chatcore_common::Result<()> {
        let mut guard = self.pool.write().await;
        if guard.is_some() {
            return Err(chatcore_common::Error::AlreadyStarted);
        }
        let pool = PgPoolOptions::new()
            .max_connections(self.config.max_connections)
            .min_connections(self.config.min_connections)
            .connect(&self.config.url)
            .await
            .map_err(|e| chatcore_common::Error::Transient(format!("postgres connect failed: {e}")))?;
        *guard = Some(pool);
        info!("postgres client started");
        Ok(())
    }

    async fn stop(&self) {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
        }
        info!("postgres client stopped");
    }
}

#[async_trait]
impl Pingable for PostgresClient {
    /// Cheap liveness check: acquire a connection from the pool without
    /// running a query.
    async fn ping_shallow(&self) -> PingResult {
        let mut result = PingResult::new("postgres", PingDepth::Shallow);
        let Some(pool) = self.pool().await else {
            return result.with_cause(chatcore_domain::PingCause::BadState, "pool not started");
        };
        match pool.acquire().await {
            Ok(_conn) => {}
            Err(e) => {
                let cause = classify(&ProbeOutcome::Failed(e.to_string()));
                result = result.with_cause(cause, e.to_string());
            }
        }
        result.store_computed_latency(DEEP_LATENCY_THRESHOLD);
        result
    }

    /// End-to-end check: a real round-trip query plus the pool's
    /// saturation ratio.
    async fn ping_deep(&self) -> PingResult {
        let mut result = PingResult::new("postgres", PingDepth::Deep);
        let Some(pool) = self.pool().await else {
            return result.with_cause(chatcore_domain::PingCause::BadState, "pool not started");
        };

        match sqlx::query("SELECT 1").fetch_one(&pool).await {
            Ok(_) => {
                let idle = pool.num_idle() as u32;
                let size = pool.size();
                if size > 0 && idle == 0 {
                    result = result.with_cause(
                        chatcore_domain::PingCause::Overloaded,
                        "connection pool fully saturated",
                    );
                }
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
