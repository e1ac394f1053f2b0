//! Ordered start/stop of a named set of services with partial-start
//! rollback (spec §3, §4.3).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// A capability: `start` is called at most once successfully; `stop` on a
/// never-started or already-stopped service is a safe no-op that logs a
/// warning.
#[async_trait]
pub trait LifecycleService: Send + Sync {
    async fn start(&self) -> chatcore_common::Result<()>;
    async fn stop(&self);
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("lifecycle controller already started (or a start attempt already ran)")]
    AlreadyStarted,

    #[error("service '{name}' failed to start: {source}")]
    StartFailed {
        name: String,
        #[source]
        source: chatcore_common::Error,
    },
}

/// Snapshot of the controller's run state (supplemented accessor, see
/// SPEC_FULL.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NotStarted,
    Started,
    Failed,
    Stopped,
}

struct Entry {
    name: String,
    service: Arc<dyn LifecycleService>,
}

/// Starts a named, ordered set of services, rolling back on partial
/// failure and stopping everything in reverse order on shutdown.
pub struct LifecycleController {
    entries: Vec<Entry>,
    stop_deadline: Duration,
    state: Mutex<LifecycleState>,
    started: Mutex<Vec<usize>>,
}

impl LifecycleController {
    /// `services` is iterated in the order given; that is the start
    /// order, and stop runs in the reverse of it.
    pub fn new(services: Vec<(String, Arc<dyn LifecycleService>)>) -> Self {
        Self::with_stop_deadline(services, Duration::from_secs(5))
    }

    pub fn with_stop_deadline(
        services: Vec<(String, Arc<dyn LifecycleService>)>,
        stop_deadline: Duration,
    ) -> Self {
        Self {
            entries: services
                .into_iter()
                .map(|(name, service)| Entry { name, service })
                .collect(),
            stop_deadline,
            state: Mutex::new(LifecycleState::NotStarted),
            started: Mutex::new(Vec::new()),
        }
    }

    pub async fn status(&self) -> LifecycleState {
        *self.state.lock().await
    }

    /// Start every service in order. On failure, roll back everything
    /// already started (reverse order, bounded stop deadline) and leave
    /// the controller in a terminal `Failed` state — a second `start`
    /// call is always a hard error after that.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        {
            let mut state = self.state.lock().await;
            if *state != LifecycleState::NotStarted {
                return Err(LifecycleError::AlreadyStarted);
            }
            *state = LifecycleState::Started;
        }

        let mut started = self.started.lock().await;
        for (index, entry) in self.entries.iter().enumerate() {
            match entry.service.start().await {
                Ok(()) => {
                    info!(service = %entry.name, "service started");
                    started.push(index);
                }
                Err(source) => {
                    error!(service = %entry.name, error = %source, "service failed to start; rolling back");
                    self.rollback(&started).await;
                    started.clear();
                    *self.state.lock().await = LifecycleState::Failed;
                    return Err(LifecycleError::StartFailed {
                        name: entry.name.clone(),
                        source,
                    });
                }
            }
        }

        Ok(())
    }

    async fn rollback(&self, started: &[usize]) {
        for &index in started.iter().rev() {
            let entry = &self.entries[index];
            match tokio::time::timeout(self.stop_deadline, entry.service.stop()).await {
                Ok(()) => info!(service = %entry.name, "service rolled back"),
                Err(_) => warn!(service = %entry.name, "rollback stop exceeded deadline"),
            }
        }
    }

    /// Stop the started set in reverse order. Idempotent: calling this
    /// again (or calling it after a failed/never-attempted start) is a
    /// safe, warn-logged no-op.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if *state != LifecycleState::Started {
            warn!(state = ?*state, "stop called with nothing running; ignoring");
            return;
        }
        *state = LifecycleState::Stopped;
        drop(state);

        let mut started = self.started.lock().await;
        for &index in started.iter().rev() {
            let entry = &self.entries[index];
            let deadline = self.stop_deadline;
            let service = Arc::clone(&entry.service);
            let name = entry.name.clone();

            let outcome = tokio::spawn(async move {
                tokio::time::timeout(deadline, service.stop()).await
            })
            .await;

            match outcome {
                Ok(Ok(())) => info!(service = %name, "service stopped"),
                Ok(Err(_)) => warn!(service = %name, "stop exceeded deadline"),
                Err(join_error) => {
                    error!(service = %name, error = %join_error, "stop panicked; continuing with remaining services")
                }
            }
        }
        started.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingService {
        name: &'static str,
        fail_start: bool,
        start_order: Arc<Mutex<Vec<&'static str>>>,
        stop_order: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl LifecycleService for RecordingService {
        async fn start(&self) -> chatcore_common::Result<()> {
            if self.fail_start {
                return Err(chatcore_common::Error::Transient(format!(
                    "{} refused to start",
                    self.name
                )));
            }
            self.start_order.lock().await.push(self.name);
            Ok(())
        }

        async fn stop(&self) {
            self.stop_order.lock().await.push(self.name);
        }
    }

    fn service(
        name: &'static str,
        fail_start: bool,
        start_order: Arc<Mutex<Vec<&'static str>>>,
        stop_order: Arc<Mutex<Vec<&'static str>>>,
    ) -> (String, Arc<dyn LifecycleService>) {
        (
            name.to_string(),
            Arc::new(RecordingService {
                name,
                fail_start,
                start_order,
                stop_order,
            }),
        )
    }

    #[tokio::test]
    async fn starts_in_order_and_stops_in_reverse() {
        let start_order = Arc::new(Mutex::new(Vec::new()));
        let stop_order = Arc::new(Mutex::new(Vec::new()));

        let controller = LifecycleController::new(vec![
            service("db", false, start_order.clone(), stop_order.clone()),
            service("cache", false, start_order.clone(), stop_order.clone()),
            service("bus", false, start_order.clone(), stop_order.clone()),
        ]);

        controller.start().await.unwrap();
        assert_eq!(*start_order.lock().await, vec!["db", "cache", "bus"]);
        assert_eq!(controller.status().await, LifecycleState::Started);

        controller.stop().await;
        assert_eq!(*stop_order.lock().await, vec!["bus", "cache", "db"]);
        assert_eq!(controller.status().await, LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn failed_start_rolls_back_already_started_services_in_reverse() {
        let start_order = Arc::new(Mutex::new(Vec::new()));
        let stop_order = Arc::new(Mutex::new(Vec::new()));

        let controller = LifecycleController::new(vec![
            service("db", false, start_order.clone(), stop_order.clone()),
            service("cache", false, start_order.clone(), stop_order.clone()),
            service("bus", true, start_order.clone(), stop_order.clone()),
        ]);

        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, LifecycleError::StartFailed { name, .. } if name == "bus"));
        assert_eq!(*stop_order.lock().await, vec!["cache", "db"]);
        assert_eq!(controller.status().await, LifecycleState::Failed);
    }

    #[tokio::test]
    async fn second_start_is_a_hard_error_even_after_failure() {
        let start_order = Arc::new(Mutex::new(Vec::new()));
        let stop_order = Arc::new(Mutex::new(Vec::new()));
        let controller = LifecycleController::new(vec![service(
            "db", true, start_order, stop_order,
        )]);

        assert!(controller.start().await.is_err());
        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, LifecycleError::AlreadyStarted));
    }

    #[tokio::test]
    async fn stop_without_start_is_a_safe_no_op() {
        let start_order = Arc::new(Mutex::new(Vec::new()));
        let stop_order = Arc::new(Mutex::new(Vec::new()));
        let controller = LifecycleController::new(vec![service(
            "db", false, start_order, stop_order.clone(),
        )]);

        controller.stop().await;
        assert!(stop_order.lock().await.is_empty());
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let start_order = Arc::new(Mutex::new(Vec::new()));
        let stop_order = Arc::new(Mutex::new(Vec::new()));
        let controller = LifecycleController::new(vec![service(
            "db", false, start_order, stop_order.clone(),
        )]);

        controller.start().await.unwrap();
        controller.stop().await;
        controller.stop().await;
        assert_eq!(stop_order.lock().await.len(), 1);
    }
}
