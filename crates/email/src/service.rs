//! `EmailDispatchService`: wires the send path, delivery path, and
//! worker pool together and exposes a `LifecycleService` for the
//! composition root (spec §4.5).

use std::sync::Arc;

use async_trait::async_trait;
use chatcore_config::EmailConfig;
use chatcore_domain::email::{validate_send_request, Address, EmailSendRequest};
use chatcore_lifecycle::LifecycleService;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::consumer::EmailConsumer;
use crate::mapping::{DkimSigningKey, GlobalHeaders};
use crate::producer::EmailProducer;
use crate::smtp_transport::LettreSmtpSender;
use crate::worker_pool::EmailWorkerPool;

#[derive(Debug, Error)]
pub enum EmailDispatchError {
    #[error(transparent)]
    Validation(#[from] chatcore_domain::email::EmailValidationError),

    #[error(transparent)]
    Produce(#[from] crate::producer::ProduceError),

    #[error(transparent)]
    Config(#[from] chatcore_common::Error),
}

pub struct EmailDispatchService {
    config: EmailConfig,
    producer: EmailProducer,
    consumer: Arc<EmailConsumer>,
    pool: Arc<EmailWorkerPool>,
    consumer_task: Mutex<Option<(CancellationToken, tokio::task::JoinHandle<()>)>>,
}

impl EmailDispatchService {
    pub fn new(config: EmailConfig) -> Result<Self, EmailDispatchError> {
        let pool = Arc::new(EmailWorkerPool::new(
            config.worker_pool_queue_capacity,
            config.worker_pool_size,
            config.smtp_send_timeout,
        ));

        let dkim = if config.dkim_private_key_path.is_empty() {
            None
        } else {
            Some(DkimSigningKey::load(&config).map_err(|e| {
                chatcore_common::Error::Config(format!("loading DKIM key: {e}"))
            })?)
        };

        let globals = GlobalHeaders {
            organization: "Chat Platform".to_string(),
            user_agent: format!("chatcore-email/{}", env!("CARGO_PKG_VERSION")),
        };

        let producer = EmailProducer::new(&config.kafka_brokers, config.kafka_topic.clone())?;
        let consumer = Arc::new(
            EmailConsumer::new(
                &config.kafka_brokers,
                &config.kafka_topic,
                &config.kafka_consumer_group,
                Arc::clone(&pool),
                globals,
                dkim,
            )
            .map_err(|e| chatcore_common::Error::Config(e.to_string()))?,
        );

        Ok(Self {
            config,
            producer,
            consumer,
            pool,
            consumer_task: Mutex::new(None),
        })
    }

    /// Accept a send request: default the sender, validate against the
    /// declarative schema, serialize, and produce to the log. Returns
    /// once the produce call is enqueued (spec §4.5).
    pub fn send(&self, mut req: EmailSendRequest) -> Result<(), EmailDispatchError> {
        if req.from.is_none() {
            req.from = Some(Address {
                email: self.config.default_sender_address.clone(),
                name: String::new(),
            });
        }

        validate_send_request(&req)?;
        self.producer.send(&req)?;
        Ok(())
    }

    /// Number of records the delivery path has dropped (decode/validate/
    /// build failures that never reached the worker pool).
    pub fn dropped_records(&self) -> u64 {
        self.consumer.dropped_records()
    }
}

#[async_trait]
impl LifecycleService for EmailDispatchService {
    async fn start(&self) -> chatcore_common::Result<()> {
        let transport = Arc::new(
            LettreSmtpSender::new(&self.config)
                .map_err(|e| chatcore_common::Error::Config(e.to_string()))?,
        );
        self.pool
            .start(transport)
            .await
            .map_err(|e| chatcore_common::Error::Internal(anyhow::anyhow!(e)))?;

        let token = CancellationToken::new();
        let consumer = Arc::clone(&self.consumer);
        let consumer_token = token.clone();
        let handle = tokio::spawn(async move { consumer.run(consumer_token).await });

        *self.consumer_task.lock().await = Some((token, handle));
        info!("email dispatch service started");
        Ok(())
    }

    async fn stop(&self) {
        if let Some((token, handle)) = self.consumer_task.lock().await.take() {
            token.cancel();
            let _ = handle.await;
        }
        self.pool.stop().await;
        info!("email dispatch service stopped");
    }
}

#[cfg(test)]
mod tests {
    use chatcore_domain::email::{validate_send_request, Address, EmailSendRequest};

    /// Mirrors `EmailDispatchService::send`'s sender-defaulting step
    /// without needing live Kafka/SMTP infrastructure, which the
    /// constructor requires. The full send path is exercised by the
    /// consumer/mapping/worker-pool unit tests instead.
    fn default_sender_if_absent(mut req: EmailSendRequest, default_sender: &str) -> EmailSendRequest {
        if req.from.is_none() {
            req.from = Some(Address {
                email: default_sender.to_string(),
                name: String::new(),
            });
        }
        req
    }

    #[test]
    fn missing_sender_is_defaulted_and_then_validates() {
        let req = EmailSendRequest {
            message_id: "msg-1".into(),
            created_at_epoch_millis: 0,
            from: None,
            to: vec![Address { email: "bob@example.com".into(), name: String::new() }],
            cc: vec![],
            bcc: vec![],
            reply_to: None,
            mdn_to: vec![],
            subject: "Hi".into(),
            content_mode: chatcore_domain::email::ContentMode::Raw as i32,
            raw: Some(chatcore_domain::email::RawContent { text: "Hello".into(), html: String::new() }),
            headers: vec![],
            interaction_mode: chatcore_domain::email::InteractionMode::Automated as i32,
            importance: chatcore_domain::email::Importance::Normal as i32,
            attachments: vec![],
        };

        let req = default_sender_if_absent(req, "noreply@example.com");
        assert_eq!(req.from.as_ref().unwrap().email, "noreply@example.com");
        assert!(validate_send_request(&req).is_ok());
    }
}
