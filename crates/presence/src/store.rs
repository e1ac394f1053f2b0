//! Cluster-aware cache client wrapper with the presence-specific
//! operations layered on top.
//!
//! Generalises the connection-manager wrapping idiom from the platform's
//! original single-node Redis client (open a `Client`, hand it to a
//! managed connection, clone the connection handle per call) to a Redis
//! Cluster topology, since the presence keyspace is explicitly
//! hash-tagged for cross-key transactions within a slot (spec §4.4).

use std::collections::HashMap;

use redis::cluster::ClusterClient;
use redis::cluster_async::ClusterConnection;
use redis::AsyncCommands;
use tracing::{info, warn};

use chatcore_common::time::epoch_millis_now;
use chatcore_common::{Error, Result};
use chatcore_domain::{Platform, Session};

use crate::keyspace::{last_seen_key, session_key, session_set_key};

const MAX_TRANSACTION_RETRIES: u32 = 5;

/// Outcome of a `DeleteSession` transaction, needed by the caller to
/// decide whether to update the last-seen local cache.
pub struct DeleteOutcome {
    pub was_last_session: bool,
}

/// Cluster cache client used by the presence service. Cheap to clone:
/// `ClusterConnection` shares its inner connection pool, mirroring the
/// original `ConnectionManager` wrapper's clone-per-call usage.
#[derive(Clone)]
pub struct PresenceStore {
    conn: ClusterConnection,
}

impl PresenceStore {
    pub async fn connect(cluster_urls: &[String]) -> Result<Self> {
        info!(nodes = cluster_urls.len(), "connecting to presence cache cluster");
        let client = ClusterClient::new(cluster_urls.to_vec())
            .map_err(|e| Error::Config(format!("invalid presence cache cluster urls: {e}")))?;
        let conn = client
            .get_async_connection()
            .await
            .map_err(|e| Error::Transient(format!("presence cache connect failed: {e}")))?;
        info!("presence cache cluster connection established");
        Ok(Self { conn })
    }

    /// (a) write the session hash with its TTL, (b) add `sid` to the
    /// session set and refresh that set's TTL, (c) delete the last-seen
    /// key. One atomic pipeline; the three keys share a hash tag so this
    /// is a valid cluster-side transaction.
    pub async fn create_session(
        &self,
        user: &str,
        sid: &str,
        session: &Session,
        session_ttl_secs: u64,
        session_set_ttl_secs: u64,
    ) -> Result<()> {
        let skey = session_key(user, sid);
        let set_key = session_set_key(user);
        let lkey = last_seen_key(user);

        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .hset(&skey, "replica_host", &session.replica_host)
            .ignore()
            .hset(&skey, "device_id", &session.device_id)
            .ignore()
            .hset(&skey, "platform", session.platform.as_str())
            .ignore()
            .hset(&skey, "ip", &session.ip)
            .ignore()
            .hset(&skey, "started_at", session.started_at)
            .ignore()
            .expire(&skey, session_ttl_secs as i64)
            .ignore()
            .sadd(&set_key, sid)
            .ignore()
            .expire(&set_key, session_set_ttl_secs as i64)
            .ignore()
            .del(&lkey)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| Error::Transient(format!("create_session failed: {e}")))?;

        Ok(())
    }

    /// Watch/multi/exec loop: read the session-set cardinality before
    /// the transaction, then atomically delete the session hash, remove
    /// `sid` from the set, and — only if the pre-transaction cardinality
    /// was exactly 1 — write the last-seen marker. Retries on watch
    /// contention (another writer touched the set between WATCH and
    /// EXEC), bounded so a pathological hot key cannot loop forever.
    pub async fn delete_session(
        &self,
        user: &str,
        sid: &str,
        last_seen_ttl_secs: u64,
    ) -> Result<DeleteOutcome> {
        let skey = session_key(user, sid);
        let set_key = session_set_key(user);
        let lkey = last_seen_key(user);
        let mut conn = self.conn.clone();

        for attempt in 0..MAX_TRANSACTION_RETRIES {
            redis::cmd("WATCH")
                .arg(&set_key)
                .query_async::<()>(&mut conn)
                .await
                .map_err(|e| Error::Transient(format!("watch failed: {e}")))?;

            let cardinality: u64 = conn
                .scard(&set_key)
                .await
                .map_err(|e| Error::Transient(format!("scard failed: {e}")))?;
            let was_last_session = cardinality == 1;

            let mut pipe = redis::pipe();
            pipe.atomic().del(&skey).ignore().srem(&set_key, sid).ignore();
            if was_last_session {
                pipe.set_ex(&lkey, epoch_millis_now(), last_seen_ttl_secs)
                    .ignore();
            }

            let result: redis::RedisResult<Option<()>> = pipe.query_async(&mut conn).await;
            match result {
                Ok(Some(())) => return Ok(DeleteOutcome { was_last_session }),
                Ok(None) => {
                    warn!(user, sid, attempt, "delete_session watch contention, retrying");
                    continue;
                }
                Err(e) => return Err(Error::Transient(format!("delete_session failed: {e}"))),
            }
        }

        Err(Error::Transient(
            "delete_session exceeded watch-contention retry budget".into(),
        ))
    }

    /// Used by the status cache's loader: cardinality >= 1 means online.
    pub async fn session_count(&self, user: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        conn.scard(session_set_key(user))
            .await
            .map_err(|e| Error::Transient(format!("session_count failed: {e}")))
    }

    /// Used by the last-seen cache's loader. Absent key -> `0` ("never
    /// seen in the TTL window"); a present-but-non-integer value is a
    /// cache miss, logged at warn by the caller.
    pub async fn last_seen(&self, user: &str) -> Result<Option<i64>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(last_seen_key(user))
            .await
            .map_err(|e| Error::Transient(format!("last_seen read failed: {e}")))?;
        match raw {
            None => Ok(Some(0)),
            Some(s) => Ok(chatcore_common::time::parse_epoch_millis(&s)),
        }
    }

    pub async fn list_sessions(&self, user: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.smembers(session_set_key(user))
            .await
            .map_err(|e| Error::Transient(format!("list_sessions failed: {e}")))
    }

    /// Malformed `platform` or `started_at` fields are logged at warn
    /// and replaced with defaults rather than failing the read.
    pub async fn get_session(&self, user: &str, sid: &str) -> Result<Option<Session>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(session_key(user, sid))
            .await
            .map_err(|e| Error::Transient(format!("get_session failed: {e}")))?;
        if fields.is_empty() {
            return Ok(None);
        }

        let platform = match fields.get("platform") {
            Some(raw) => Platform::parse_or_default(raw),
            None => Platform::default(),
        };
        let started_at = match fields.get("started_at").map(|s| s.parse::<i64>()) {
            Some(Ok(v)) => v,
            Some(Err(_)) => {
                warn!(user, sid, "malformed started_at in session hash, defaulting to 0");
                0
            }
            None => 0,
        };

        Ok(Some(Session {
            replica_host: fields.get("replica_host").cloned().unwrap_or_default(),
            device_id: fields.get("device_id").cloned().unwrap_or_default(),
            platform,
            ip: fields.get("ip").cloned().unwrap_or_default(),
            started_at,
        }))
    }

    /// Heartbeat tick: extend the TTL of the session hash and the
    /// session set for one `(user, sid)` pair.
    pub async fn extend_session_ttl(
        &self,
        user: &str,
        sid: &str,
        session_ttl_secs: u64,
        session_set_ttl_secs: u64,
    ) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .expire(session_key(user, sid), session_ttl_secs as i64)
            .ignore()
            .expire(session_set_key(user), session_set_ttl_secs as i64)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Transient(format!("heartbeat extend failed: {e}")))
    }
}
