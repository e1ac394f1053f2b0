//! Per-`(user, sid)` heartbeat: a background ticker that periodically
//! extends the session's TTLs so it survives as long as the client
//! stays connected (spec §4.4).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::store::PresenceStore;

type Key = (String, String);

/// Tracks one cancellation token per running heartbeat. `start` is
/// idempotent (a second call for the same pair is a warn-and-ignore);
/// `stop` and `stop_all` are safe to call on a pair with no heartbeat.
pub struct HeartbeatRegistry {
    store: PresenceStore,
    interval: Duration,
    session_ttl_secs: u64,
    session_set_ttl_secs: u64,
    tokens: Mutex<HashMap<Key, CancellationToken>>,
}

impl HeartbeatRegistry {
    pub fn new(
        store: PresenceStore,
        interval: Duration,
        session_ttl_secs: u64,
        session_set_ttl_secs: u64,
    ) -> Self {
        Self {
            store,
            interval,
            session_ttl_secs,
            session_set_ttl_secs,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub async fn start(self: &Arc<Self>, user: &str, sid: &str) {
        let key: Key = (user.to_string(), sid.to_string());
        let mut tokens = self.tokens.lock().await;
        if tokens.contains_key(&key) {
            warn!(user, sid, "heartbeat already running; ignoring duplicate start");
            return;
        }

        let token = CancellationToken::new();
        tokens.insert(key.clone(), token.clone());
        drop(tokens);

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            registry.run(key, token).await;
        });
    }

    async fn run(&self, key: Key, token: CancellationToken) {
        let (user, sid) = key;
        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await; // first tick fires immediately; skip it

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!(user = %user, sid = %sid, "heartbeat cancelled");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self
                        .store
                        .extend_session_ttl(&user, &sid, self.session_ttl_secs, self.session_set_ttl_secs)
                        .await
                    {
                        warn!(user = %user, sid = %sid, error = %e, "heartbeat tick failed, retrying next tick");
                    }
                }
            }
        }
    }

    /// Cancels the heartbeat for one pair, if running. Callers must call
    /// this *before* the corresponding `DeleteSession` transaction so the
    /// heartbeat cannot re-extend a TTL the transaction is deleting.
    pub async fn stop(&self, user: &str, sid: &str) {
        let key: Key = (user.to_string(), sid.to_string());
        if let Some(token) = self.tokens.lock().await.remove(&key) {
            token.cancel();
        }
    }

    pub async fn stop_all(&self) {
        let mut tokens = self.tokens.lock().await;
        for (_, token) in tokens.drain() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_equality_is_by_user_and_session() {
        let a: Key = ("u1".into(), "s1".into());
        let b: Key = ("u1".into(), "s1".into());
        let c: Key = ("u1".into(), "s2".into());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
