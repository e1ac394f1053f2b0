//! `PresenceService`: wires the cache store, local caches, heartbeat
//! registry and pub/sub bridge into the operations described in spec
//! §4.4, and exposes a `LifecycleService` impl for the composition root.

use std::sync::Arc;

use async_trait::async_trait;
use chatcore_config::PresenceConfig;
use chatcore_domain::{PresenceStatus, Session};
use chatcore_lifecycle::LifecycleService;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use chatcore_common::Result;

use crate::cache::{LastSeenCache, StatusCache};
use crate::heartbeat::HeartbeatRegistry;
use crate::pubsub::PresenceBus;
use crate::store::PresenceStore;

pub struct PresenceService {
    store: PresenceStore,
    status_cache: StatusCache,
    last_seen_cache: LastSeenCache,
    heartbeats: Arc<HeartbeatRegistry>,
    bus: Arc<PresenceBus>,
    subscriber: Mutex<Option<(CancellationToken, tokio::task::JoinHandle<()>)>>,
    session_ttl_secs: u64,
    session_set_ttl_secs: u64,
    last_seen_ttl_secs: u64,
}

impl PresenceService {
    pub async fn new(config: &PresenceConfig) -> Result<Self> {
        let store = PresenceStore::connect(&config.redis_cluster_urls).await?;
        let status_cache = StatusCache::new(
            config.status_cache_capacity,
            config.status_cache_ttl,
            config.loader_deadline,
            store.clone(),
        );
        let last_seen_cache =
            LastSeenCache::new(config.last_seen_cache_capacity, config.last_seen_cache_ttl, store.clone());
        let heartbeats = Arc::new(HeartbeatRegistry::new(
            store.clone(),
            config.heartbeat_interval,
            config.session_ttl.as_secs(),
            config.session_set_ttl.as_secs(),
        ));
        let bus = Arc::new(PresenceBus::new(
            &config.redis_cluster_urls[0],
            &config.presence_subject,
        )?);

        Ok(Self {
            store,
            status_cache,
            last_seen_cache,
            heartbeats,
            bus,
            subscriber: Mutex::new(None),
            session_ttl_secs: config.session_ttl.as_secs(),
            session_set_ttl_secs: config.session_set_ttl.as_secs(),
            last_seen_ttl_secs: config.last_seen_ttl.as_secs(),
        })
    }

    pub async fn create_session(&self, user: &str, sid: &str, session: Session) -> Result<()> {
        self.store
            .create_session(user, sid, &session, self.session_ttl_secs, self.session_set_ttl_secs)
            .await?;

        self.status_cache.set(user, PresenceStatus::Online).await;
        self.last_seen_cache.set(user, 0).await;
        self.heartbeats.start(user, sid).await;

        if let Err(e) = self.bus.publish(user, PresenceStatus::Online).await {
            tracing::warn!(user, sid, error = %e, "presence publish failed, relying on cache convergence");
        }

        Ok(())
    }

    pub async fn delete_session(&self, user: &str, sid: &str) -> Result<()> {
        self.heartbeats.stop(user, sid).await;

        let outcome = self
            .store
            .delete_session(user, sid, self.last_seen_ttl_secs)
            .await?;

        if outcome.was_last_session {
            let now = chatcore_common::time::epoch_millis_now();
            self.status_cache.set(user, PresenceStatus::Offline).await;
            self.last_seen_cache.set(user, now).await;

            if let Err(e) = self.bus.publish(user, PresenceStatus::Offline).await {
                tracing::warn!(user, sid, error = %e, "presence publish failed, relying on cache convergence");
            }
        }

        Ok(())
    }

    pub async fn status(&self, user: &str) -> Result<PresenceStatus> {
        self.status_cache.get(user).await
    }

    pub async fn last_seen(&self, user: &str) -> Result<i64> {
        self.last_seen_cache.get(user).await
    }

    pub async fn list_sessions(&self, user: &str) -> Result<Vec<String>> {
        self.store.list_sessions(user).await
    }

    pub async fn get_session(&self, user: &str, sid: &str) -> Result<Option<Session>> {
        self.store.get_session(user, sid).await
    }
}

#[async_trait]
impl LifecycleService for PresenceService {
    async fn start(&self) -> chatcore_common::Result<()> {
        let token = CancellationToken::new();
        let bus = Arc::clone(&self.bus);
        let status_cache = self.status_cache.clone();
        let subscriber_token = token.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = bus.run_subscriber(status_cache, subscriber_token).await {
                tracing::error!(error = %e, "presence subscriber exited with error");
            }
        });

        *self.subscriber.lock().await = Some((token, handle));
        info!("presence service started");
        Ok(())
    }

    async fn stop(&self) {
        if let Some((token, handle)) = self.subscriber.lock().await.take() {
            token.cancel();
            let _ = handle.await;
        }
        self.heartbeats.stop_all().await;
        info!("presence service stopped");
    }
}
