//! Presence subject pub/sub bridge (spec §4.4).
//!
//! Lets a replica learn of presence changes made on another replica
//! within the status cache's 5 s window. Uses a dedicated single-node
//! connection rather than the cluster client: Redis Cluster pub/sub
//! delivers to subscribers on any node regardless of key slots, so a
//! plain client pointed at one cluster member is sufficient and avoids
//! threading cluster topology concerns through the subscriber loop.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use chatcore_common::{Error, Result};
use chatcore_domain::PresenceStatus;

use crate::cache::StatusCache;

pub struct PresenceBus {
    client: redis::Client,
    subject: String,
}

impl PresenceBus {
    pub fn new(node_url: &str, subject: &str) -> Result<Self> {
        let client = redis::Client::open(node_url)
            .map_err(|e| Error::Config(format!("invalid presence bus url: {e}")))?;
        Ok(Self {
            client,
            subject: subject.to_string(),
        })
    }

    pub async fn publish(&self, user: &str, status: PresenceStatus) -> Result<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::Transient(format!("presence bus connect failed: {e}")))?;
        let payload = format!("{user},{}", status.as_wire_byte());
        redis::AsyncCommands::publish::<_, _, ()>(&mut conn, &self.subject, payload)
            .await
            .map_err(|e| Error::Transient(format!("presence bus publish failed: {e}")))
    }

    /// Runs until `cancel` fires or the underlying connection closes.
    /// Malformed payloads are logged at error and dropped; valid ones
    /// update the status cache directly (bypassing its loader, since we
    /// already know the answer).
    pub async fn run_subscriber(&self, status_cache: StatusCache, cancel: CancellationToken) -> Result<()> {
        let conn = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| Error::Transient(format!("presence bus subscribe connect failed: {e}")))?;
        let mut pubsub = conn;
        pubsub
            .subscribe(&self.subject)
            .await
            .map_err(|e| Error::Transient(format!("presence bus subscribe failed: {e}")))?;

        let mut stream = pubsub.into_on_message();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(subject = %self.subject, "presence subscription closed");
                    return Ok(());
                }
                next = stream.next() => {
                    match next {
                        Some(msg) => {
                            let payload: String = match msg.get_payload() {
                                Ok(p) => p,
                                Err(e) => {
                                    error!(error = %e, "malformed presence bus payload, dropping");
                                    continue;
                                }
                            };
                            match parse_update(&payload) {
                                Some((user, status)) => status_cache.set(&user, status).await,
                                None => error!(payload = %payload, "unparseable presence update, dropping"),
                            }
                        }
                        None => {
                            info!(subject = %self.subject, "presence subscription closed");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

fn parse_update(payload: &str) -> Option<(String, PresenceStatus)> {
    let (user, status_raw) = payload.split_once(',')?;
    let byte: u8 = status_raw.trim().parse().ok()?;
    let status = PresenceStatus::from_wire_byte(byte)?;
    Some((user.to_string(), status))
}
