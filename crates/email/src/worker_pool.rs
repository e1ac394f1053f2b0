//! Bounded queue + N workers + graceful drain (spec §4.5 "Worker Pool").
//!
//! Generalises the webhook delivery crate's bounded-mpsc-plus-tasks idiom
//! (`webhook-delivery/src/delivery.rs`, `circuit_breaker.rs`) from HTTP
//! POSTs to SMTP sends, and widens it from a single consumer task to `W`
//! concurrent workers sharing one receiver.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatcore_domain::email::EmailRequest;

use crate::mapping::OutboundMessage;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum WorkerPoolError {
    #[error("email worker pool queue is full")]
    QueueFull,

    #[error("email worker pool already started")]
    AlreadyStarted,
}

/// Abstraction over the SMTP transport so the pool is testable without a
/// live mail server. Production code wires `lettre`'s
/// `AsyncSmtpTransport` behind this; tests use an in-memory recorder.
#[async_trait]
pub trait SmtpSender: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> Result<(), String>;
}

/// A bounded queue of validated, mapped SMTP sends plus `W` worker tasks
/// draining it. `submit` never blocks: a full queue fails fast so the
/// producer can back off or drop, per spec §4.5.
pub struct EmailWorkerPool {
    sender: std::sync::Mutex<Option<mpsc::Sender<(OutboundMessage, tokio::sync::oneshot::Sender<Option<String>>)>>>,
    receiver: Mutex<Option<mpsc::Receiver<(OutboundMessage, tokio::sync::oneshot::Sender<Option<String>>)>>>,
    worker_count: usize,
    send_timeout: Duration,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl EmailWorkerPool {
    pub fn new(queue_capacity: usize, worker_count: usize, send_timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity);
        Self {
            sender: std::sync::Mutex::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
            worker_count,
            send_timeout,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Non-blocking enqueue of an already-built SMTP message. The given
    /// oneshot is guaranteed exactly one completion: either here (queue
    /// full), here (pool already stopped), or by whichever worker
    /// eventually processes the message.
    pub fn submit(
        &self,
        message: OutboundMessage,
        response: tokio::sync::oneshot::Sender<Option<String>>,
    ) -> Result<(), WorkerPoolError> {
        let sender = self.sender.lock().unwrap().clone();
        let Some(sender) = sender else {
            let _ = response.send(Some("email worker pool is not running".to_string()));
            return Err(WorkerPoolError::QueueFull);
        };

        match sender.try_send((message, response)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full((_, response))) => {
                let _ = response.send(Some("email worker pool queue is full".to_string()));
                Err(WorkerPoolError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed((_, response))) => {
                let _ = response.send(Some("email worker pool is not running".to_string()));
                Err(WorkerPoolError::QueueFull)
            }
        }
    }

    /// Convenience wrapper taking the domain `EmailRequest` pair directly.
    pub fn submit_request(
        &self,
        message: OutboundMessage,
        req: EmailRequest,
    ) -> Result<(), WorkerPoolError> {
        self.submit(message, req.response)
    }

    /// Spawn `W` workers that each loop on the shared receiver, perform
    /// the SMTP send under `send_timeout`, and complete the request's
    /// response channel exactly once.
    pub async fn start(&self, transport: Arc<dyn SmtpSender>) -> Result<(), WorkerPoolError> {
        let receiver = self
            .receiver
            .lock()
            .await
            .take()
            .ok_or(WorkerPoolError::AlreadyStarted)?;
        let receiver = Arc::new(Mutex::new(receiver));

        let mut handles = Vec::with_capacity(self.worker_count);
        for id in 0..self.worker_count {
            let receiver = Arc::clone(&receiver);
            let transport = Arc::clone(&transport);
            let timeout = self.send_timeout;
            handles.push(tokio::spawn(async move {
                loop {
                    let next = receiver.lock().await.recv().await;
                    let Some((message, response)) = next else {
                        info!(worker = id, "email worker draining: queue closed");
                        break;
                    };
                    let outcome = tokio::time::timeout(timeout, transport.send(message)).await;
                    let result = match outcome {
                        Ok(Ok(())) => None,
                        Ok(Err(e)) => {
                            warn!(worker = id, error = %e, "smtp send failed");
                            Some(e)
                        }
                        Err(_) => {
                            warn!(worker = id, "smtp send timed out");
                            Some("smtp send timed out".to_string())
                        }
                    };
                    let _ = response.send(result);
                }
            }));
        }

        *self.workers.lock().await = handles;
        Ok(())
    }

    /// Close the queue and wait for every worker to drain in-flight work.
    pub async fn stop(&self) {
        // Taking the sender out and dropping it closes the channel: every
        // worker's `receiver.recv().await` then resolves to `None` once
        // the queued messages are drained, so the loop below terminates.
        self.sender.lock().unwrap().take();

        let handles = std::mem::take(&mut *self.workers.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "email worker task panicked during drain");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Recorder {
        sent: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SmtpSender for Recorder {
        async fn send(&self, _message: OutboundMessage) -> Result<(), String> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl SmtpSender for AlwaysFails {
        async fn send(&self, _message: OutboundMessage) -> Result<(), String> {
            Err("mailbox unavailable".to_string())
        }
    }

    fn test_message() -> OutboundMessage {
        let message = lettre::Message::builder()
            .from("sender@example.com".parse().unwrap())
            .to("bob@example.com".parse().unwrap())
            .subject("hi")
            .body(String::from("hello"))
            .unwrap();
        OutboundMessage {
            envelope: message.envelope().clone(),
            raw: message.formatted(),
        }
    }

    #[tokio::test]
    async fn delivers_and_completes_response_exactly_once() {
        let pool = EmailWorkerPool::new(8, 2, Duration::from_secs(1));
        let sent = Arc::new(AtomicUsize::new(0));
        pool.start(Arc::new(Recorder { sent: sent.clone() })).await.unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel();
        pool.submit(test_message(), tx).unwrap();

        let result = rx.await.unwrap();
        assert_eq!(result, None);

        pool.stop().await;
        assert_eq!(sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn smtp_failure_is_surfaced_on_response_channel() {
        let pool = EmailWorkerPool::new(8, 1, Duration::from_secs(1));
        pool.start(Arc::new(AlwaysFails)).await.unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel();
        pool.submit(test_message(), tx).unwrap();

        let result = rx.await.unwrap();
        assert_eq!(result, Some("mailbox unavailable".to_string()));
        pool.stop().await;
    }

    #[tokio::test]
    async fn full_queue_fails_fast_without_blocking() {
        let pool = EmailWorkerPool::new(1, 0, Duration::from_secs(1));
        let (tx1, _rx1) = tokio::sync::oneshot::channel();
        pool.submit(test_message(), tx1).unwrap();

        let (tx2, rx2) = tokio::sync::oneshot::channel();
        let err = pool.submit(test_message(), tx2).unwrap_err();
        assert!(matches!(err, WorkerPoolError::QueueFull));
        assert!(rx2.await.unwrap().is_some());
    }
}
