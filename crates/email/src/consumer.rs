//! Delivery path: consume, rebuild, dispatch (spec §4.5, "asynchronous").
//!
//! Grounded on `webhook-delivery/src/consumer.rs`'s blocking-consume-loop
//! idiom, adapted from Redis `BRPOP` to `rdkafka`'s `StreamConsumer`.
//! Records are pulled in batches (`ready_chunks`), each one is
//! deserialized and mapped independently, and the consumer offset is
//! committed once per batch — a single bad record never stops the batch
//! and is never retried by the core (spec §4.5, §7).

use std::sync::Arc;

use chatcore_domain::email::{validate_send_request, EmailSendRequest};
use futures::StreamExt;
use prost::Message as _;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message as _;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::mapping::{build_smtp_message, DkimSigningKey, GlobalHeaders, MappingError};
use crate::worker_pool::EmailWorkerPool;

const BATCH_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum ConsumeError {
    #[error("failed to construct kafka consumer: {0}")]
    ClientConfig(String),

    #[error("failed to subscribe to topic: {0}")]
    Subscribe(String),
}

pub struct EmailConsumer {
    consumer: StreamConsumer,
    pool: Arc<EmailWorkerPool>,
    globals: GlobalHeaders,
    dkim: Option<DkimSigningKey>,
    dropped_records: std::sync::atomic::AtomicU64,
}

impl EmailConsumer {
    pub fn new(
        brokers: &str,
        topic: &str,
        consumer_group: &str,
        pool: Arc<EmailWorkerPool>,
        globals: GlobalHeaders,
        dkim: Option<DkimSigningKey>,
    ) -> Result<Self, ConsumeError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("group.id", consumer_group)
            .set("bootstrap.servers", brokers)
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| ConsumeError::ClientConfig(e.to_string()))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| ConsumeError::Subscribe(e.to_string()))?;

        Ok(Self {
            consumer,
            pool,
            globals,
            dkim,
            dropped_records: std::sync::atomic::AtomicU64::new(0),
        })
    }

    /// Number of records dropped for deserialization/build failures so
    /// far (supplemented visibility metric, see SPEC_FULL.md — no DLQ is
    /// implemented, per spec §9 Open Question 2).
    pub fn dropped_records(&self) -> u64 {
        self.dropped_records.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Run the consume loop until `shutdown` fires. Each batch is fully
    /// processed (record by record) before its offsets are committed.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut batches = self.consumer.stream().ready_chunks(BATCH_SIZE);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("email consumer stopping");
                    break;
                }
                next = batches.next() => {
                    let Some(batch) = next else {
                        warn!("email consumer stream ended");
                        break;
                    };
                    self.handle_batch(batch).await;
                }
            }
        }
    }

    async fn handle_batch(&self, batch: Vec<Result<rdkafka::message::BorrowedMessage<'_>, rdkafka::error::KafkaError>>) {
        for record in &batch {
            match record {
                Ok(msg) => self.handle_record(msg).await,
                Err(e) => error!(error = %e, "kafka consume error, record skipped"),
            }
        }
        if let Err(e) = self.consumer.commit_consumer_state(CommitMode::Async) {
            warn!(error = %e, "failed to commit consumer offsets after batch");
        }
    }

    async fn handle_record(&self, msg: &rdkafka::message::BorrowedMessage<'_>) {
        let Some(payload) = msg.payload() else {
            warn!("email record had no payload, dropping");
            self.dropped_records.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return;
        };

        let req = match EmailSendRequest::decode(payload) {
            Ok(req) => req,
            Err(e) => {
                error!(error = %e, "failed to decode email record, dropping");
                self.dropped_records.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return;
            }
        };

        if let Err(e) = validate_send_request(&req) {
            error!(message_id = %req.message_id, error = %e, "invalid email request in log, dropping");
            self.dropped_records.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return;
        }

        let outbound = match build_smtp_message(&req, &self.globals, self.dkim.as_ref()) {
            Ok(outbound) => outbound,
            Err(e) => {
                self.log_mapping_failure(&req.message_id, &e);
                self.dropped_records.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return;
            }
        };

        // No caller is waiting on this path: the record arrived through
        // the log, not a live producer call, so there is nothing to
        // complete a response channel for. The pool still delivers the
        // send outcome to whichever sink this service installs.
        let (_tx, _rx) = tokio::sync::oneshot::channel();
        if let Err(e) = self.pool.submit(outbound, _tx) {
            warn!(message_id = %req.message_id, error = %e, "worker pool rejected delivered-from-log message");
        }
    }

    fn log_mapping_failure(&self, message_id: &str, error: &MappingError) {
        error!(message_id, error = %error, "failed to build SMTP message from record, dropping");
    }
}
