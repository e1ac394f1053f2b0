//! Bounded local caches in front of the cache-cluster reads, each with a
//! single-flight loader so a cache stampede collapses into one backing
//! read (spec §4.4).

use std::time::Duration;

use moka::future::Cache;
use tracing::warn;

use chatcore_common::{Error, Result};
use chatcore_domain::PresenceStatus;

use crate::store::PresenceStore;

/// Status cache: on miss, reads the session set cardinality with a
/// tight deadline and derives online/offline from it. No time-to-idle
/// is configured — entries expire on schedule rather than being kept
/// alive by reads, so a replica that stops hearing pub/sub updates
/// still converges within the TTL.
#[derive(Clone)]
pub struct StatusCache {
    cache: Cache<String, PresenceStatus>,
    store: PresenceStore,
    loader_deadline: Duration,
}

impl StatusCache {
    pub fn new(capacity: u64, ttl: Duration, loader_deadline: Duration, store: PresenceStore) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        Self {
            cache,
            store,
            loader_deadline,
        }
    }

    /// Loader-backed read; a loader failure (deadline exceeded or cache
    /// error) surfaces as `Error::CacheMiss`.
    pub async fn get(&self, user: &str) -> Result<PresenceStatus> {
        let store = self.store.clone();
        let deadline = self.loader_deadline;
        let user_owned = user.to_string();

        self.cache
            .try_get_with(user.to_string(), async move {
                tokio::time::timeout(deadline, store.session_count(&user_owned))
                    .await
                    .map_err(|_| Error::CacheMiss)?
                    .map(PresenceStatus::from_live_session_count)
            })
            .await
            .map_err(|_| Error::CacheMiss)
    }

    /// Explicit write used by `CreateSession`/`DeleteSession`, which
    /// already know the new status and should not pay for a reload.
    pub async fn set(&self, user: &str, status: PresenceStatus) {
        self.cache.insert(user.to_string(), status).await;
    }
}

/// Last-seen cache: on miss, reads the last-seen key. Absent key means
/// "never seen in the TTL window" (`0`); a present-but-non-integer value
/// is a cache miss, logged at warn by the loader itself.
#[derive(Clone)]
pub struct LastSeenCache {
    cache: Cache<String, i64>,
    store: PresenceStore,
}

impl LastSeenCache {
    pub fn new(capacity: u64, ttl: Duration, store: PresenceStore) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        Self { cache, store }
    }

    pub async fn get(&self, user: &str) -> Result<i64> {
        let store = self.store.clone();
        let user_owned = user.to_string();

        self.cache
            .try_get_with(user.to_string(), async move {
                match store.last_seen(&user_owned).await {
                    Ok(Some(v)) => Ok(v),
                    Ok(None) => {
                        warn!(user = %user_owned, "malformed last_seen value, treating as cache miss");
                        Err(Error::CacheMiss)
                    }
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(|_| Error::CacheMiss)
    }

    pub async fn set(&self, user: &str, epoch_millis: i64) {
        self.cache.insert(user.to_string(), epoch_millis).await;
    }
}
