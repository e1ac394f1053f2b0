//! SMTP endpoint adapter (spec §2 item 5, §6 item 5): health/lifecycle
//! surface over the relay the email dispatch service hands finished
//! messages to. `lettre`'s pooled transport handles its own connection
//! lifecycle, so `start`/`stop` here just hold/drop the transport handle
//! used for probing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatcore_config::EmailConfig;
use chatcore_domain::{PingCause, PingDepth, PingResult};
use chatcore_health::classifier::{classify, ProbeOutcome};
use chatcore_health::pingable::Pingable;
use chatcore_lifecycle::LifecycleService;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tokio::sync::RwLock;
use tracing::info;

const DEEP_LATENCY_THRESHOLD: Duration = Duration::from_millis(500);

pub struct SmtpClient {
    config: EmailConfig,
    transport: RwLock<Option<AsyncSmtpTransport<Tokio1Executor>>>,
}

impl SmtpClient {
    pub fn new(config: EmailConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            transport: RwLock::new(None),
        })
    }

    fn build_transport(&self) -> chatcore_common::Result<AsyncSmtpTransport<Tokio1Executor>> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.smtp_host)
            .map_err(|e| chatcore_common::Error::Config(format!("smtp relay config: {e}")))?
            .port(self.config.smtp_port);
        if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        Ok(builder.build())
    }
}

#[async_trait]
impl LifecycleService for SmtpClient {
    async fn start(&self) -> chatcore_common::Result<()> {
        let mut guard = self.transport.write().await;
        if guard.is_some() {
            return Err(chatcore_common::Error::AlreadyStarted);
        }
        *guard = Some(self.build_transport()?);
        info!("smtp probe client started");
        Ok(())
    }

    async fn stop(&self) {
        *self.transport.write().await = None;
        info!("smtp probe client stopped");
    }
}

#[async_trait]
impl Pingable for SmtpClient {
    /// Cheap liveness check: open (and immediately release) a connection
    /// to the relay without sending anything.
    async fn ping_shallow(&self) -> PingResult {
        let mut result = PingResult::new("smtp", PingDepth::Shallow);
        let Some(transport) = self.transport.read().await.clone() else {
            return result.with_cause(PingCause::BadState, "smtp transport not started");
        };
        match transport.test_connection().await {
            Ok(true) => {}
            Ok(false) => {
                result = result.with_cause(PingCause::BadResponse, "relay refused test connection");
            }
            Err(e) => {
                let cause = classify(&ProbeOutcome::Failed(e.to_string()));
                result = result.with_cause(cause, e.to_string());
            }
        }
        result.store_computed_latency(DEEP_LATENCY_THRESHOLD);
        result
    }

    /// The relay exposes no cheaper end-to-end signal than the
    /// connection handshake itself, so the deep probe repeats the
    /// shallow one; sending a real probe message would leave traces in
    /// recipient inboxes and is deliberately avoided.
    async fn ping_deep(&self) -> PingResult {
        let mut result = self.ping_shallow().await;
        result.depth = PingDepth::Deep;
        result
    }
}
