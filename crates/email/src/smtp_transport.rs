//! The `SmtpSender` implementation backed by `lettre`'s async SMTP
//! transport. Kept as its own thin module so `worker_pool` stays
//! testable against an in-memory recorder without pulling in a real
//! TLS/SMTP stack.

use async_trait::async_trait;
use chatcore_config::EmailConfig;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use thiserror::Error;

use crate::mapping::OutboundMessage;
use crate::worker_pool::SmtpSender;

#[derive(Debug, Error)]
pub enum SmtpTransportError {
    #[error("failed to build SMTP transport: {0}")]
    Build(String),
}

pub struct LettreSmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl LettreSmtpSender {
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpTransportError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| SmtpTransportError::Build(e.to_string()))?
            .port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl SmtpSender for LettreSmtpSender {
    async fn send(&self, message: OutboundMessage) -> Result<(), String> {
        self.transport
            .send_raw(&message.envelope, &message.raw)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
