//! Partitioned log adapter (spec §2 item 2, §6 item 2): health/lifecycle
//! surface over the Kafka cluster the email dispatch service produces to
//! and consumes from. `rdkafka` clients connect lazily, so `start`/`stop`
//! here only own the admin handle used for probing; the actual
//! producer/consumer instances used by `chatcore-email` are constructed
//! and owned separately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatcore_domain::{PingCause, PingDepth, PingResult};
use chatcore_health::classifier::{classify, ProbeOutcome};
use chatcore_health::pingable::Pingable;
use chatcore_lifecycle::LifecycleService;
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use tokio::sync::RwLock;
use tracing::info;

const DEEP_LATENCY_THRESHOLD: Duration = Duration::from_millis(300);
const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

pub struct KafkaClient {
    brokers: String,
    consumer: RwLock<Option<Arc<BaseConsumer<DefaultClientContext>>>>,
}

impl KafkaClient {
    pub fn new(brokers: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            brokers: brokers.into(),
            consumer: RwLock::new(None),
        })
    }
}

#[async_trait]
impl LifecycleService for KafkaClient {
    async fn start(&self) -> chatcore_common::Result<()> {
        let mut guard = self.consumer.write().await;
        if guard.is_some() {
            return Err(chatcore_common::Error::AlreadyStarted);
        }
        let consumer: BaseConsumer<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", "chatcore-health-probe")
            .create()
            .map_err(|e| chatcore_common::Error::Config(format!("kafka client config: {e}")))?;
        *guard = Some(Arc::new(consumer));
        info!("kafka probe client started");
        Ok(())
    }

    async fn stop(&self) {
        *self.consumer.write().await = None;
        info!("kafka probe client stopped");
    }
}

#[async_trait]
impl Pingable for KafkaClient {
    /// Cheap liveness check: fetch broker-only metadata (no topic list).
    async fn ping_shallow(&self) -> PingResult {
        let mut result = PingResult::new("kafka", PingDepth::Shallow);
        let Some(consumer) = self.consumer.read().await.clone() else {
            return result.with_cause(PingCause::BadState, "kafka client not started");
        };
        let outcome =
            tokio::task::spawn_blocking(move || consumer.fetch_metadata(None, METADATA_TIMEOUT)).await;
        match outcome {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                let cause = classify(&ProbeOutcome::Failed(e.to_string()));
                result = result.with_cause(cause, e.to_string());
            }
            Err(e) => {
                result = result.with_cause(PingCause::Internal, format!("probe task panicked: {e}"));
            }
        }
        result.store_computed_latency(DEEP_LATENCY_THRESHOLD);
        result
    }

    /// End-to-end check: fetch full cluster metadata, confirming the
    /// controller broker and topic partitions are reachable.
    async fn ping_deep(&self) -> PingResult {
        let mut result = PingResult::new("kafka", PingDepth::Deep);
        let Some(consumer) = self.consumer.read().await.clone() else {
            return result.with_cause(PingCause::BadState, "kafka client not started");
        };
        let outcome =
            tokio::task::spawn_blocking(move || consumer.fetch_metadata(None, METADATA_TIMEOUT)).await;
        match outcome {
            Ok(Ok(metadata)) => {
                if metadata.brokers().is_empty() {
                    result = result.with_cause(PingCause::Network, "no brokers reported");
                }
            }
            Ok(Err(e)) => {
                let cause = classify(&ProbeOutcome::Failed(e.to_string()));
                result = result.with_cause(cause, e.to_string());
            }
            Err(e) => {
                result = result.with_cause(PingCause::Internal, format!("probe task panicked: {e}"));
            }
        }
        result.store_computed_latency(DEEP_LATENCY_THRESHOLD);
        result
    }
}
