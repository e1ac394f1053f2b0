//! The periodic, two-tier health controller (spec §4.2).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chatcore_config::HealthCheckConfig;
use chatcore_domain::{PingCause, PingDepth, PingResult, PingStatus};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::classifier::{classify, ProbeOutcome};
use crate::pingable::Pingable;

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("target name '{0}' must be 3-30 lowercase ascii letters")]
    InvalidTargetName(String),

    #[error(transparent)]
    Config(#[from] chatcore_common::Error),

    #[error("health controller already started")]
    AlreadyStarted,
}

fn is_valid_target_name(name: &str) -> bool {
    let len = name.len();
    (3..=30).contains(&len) && name.bytes().all(|b| b.is_ascii_lowercase())
}

/// Scheduler bookkeeping (spec §3, "Probing stats").
#[derive(Debug, Clone)]
struct PingingStats {
    last_deep_ping_at: Instant,
    shallow_count: u32,
}

impl PingingStats {
    fn fresh() -> Self {
        Self {
            last_deep_ping_at: Instant::now(),
            shallow_count: 0,
        }
    }

    /// The scheduling rule from spec §4.2.
    fn deep_is_due(&self, config: &HealthCheckConfig) -> bool {
        self.shallow_count >= config.deep_every_nth_shallow
            || self.last_deep_ping_at.elapsed() > config.deep_interval
    }

    fn record(&mut self, depth: PingDepth) {
        match depth {
            PingDepth::Deep => {
                self.shallow_count = 0;
                self.last_deep_ping_at = Instant::now();
            }
            PingDepth::Shallow => self.shallow_count += 1,
        }
    }
}

/// Periodically probes every registered target, caches the latest result
/// per target, and answers aggregate/per-target health queries.
pub struct HealthController {
    targets: HashMap<String, Arc<dyn Pingable>>,
    config: HealthCheckConfig,
    stats: Mutex<PingingStats>,
    cache: RwLock<HashMap<String, PingResult>>,
    shutdown: Mutex<Option<broadcast::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthController {
    pub fn new(
        targets: HashMap<String, Arc<dyn Pingable>>,
        config: HealthCheckConfig,
    ) -> Result<Self, HealthError> {
        for name in targets.keys() {
            if !is_valid_target_name(name) {
                return Err(HealthError::InvalidTargetName(name.clone()));
            }
        }

        Ok(Self {
            targets,
            config,
            stats: Mutex::new(PingingStats::fresh()),
            cache: RwLock::new(HashMap::new()),
            shutdown: Mutex::new(None),
            task: Mutex::new(None),
        })
    }

    /// Immediate deep probe of every target, then a recurring shallow-or-deep
    /// job every `ShallowInterval`.
    pub async fn start(self: &Arc<Self>) -> Result<(), HealthError> {
        let mut shutdown_guard = self.shutdown.lock().await;
        if shutdown_guard.is_some() {
            return Err(HealthError::AlreadyStarted);
        }
        let (tx, _rx) = broadcast::channel(1);
        *shutdown_guard = Some(tx.clone());
        drop(shutdown_guard);

        self.fan_out(PingDepth::Deep).await;
        {
            let mut stats = self.stats.lock().await;
            stats.record(PingDepth::Deep);
        }

        let controller = Arc::clone(self);
        let mut shutdown_rx = tx.subscribe();
        let interval = self.config.shallow_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // consume the immediate first tick
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("health controller scheduler stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let depth = {
                            let stats = controller.stats.lock().await;
                            if stats.deep_is_due(&controller.config) {
                                PingDepth::Deep
                            } else {
                                PingDepth::Shallow
                            }
                        };
                        controller.fan_out(depth).await;
                        let mut stats = controller.stats.lock().await;
                        stats.record(depth);
                    }
                }
            }
        });

        *self.task.lock().await = Some(handle);
        Ok(())
    }

    /// Terminate the scheduler and wait for in-flight probes to exit.
    pub async fn stop(&self) {
        let shutdown_tx = self.shutdown.lock().await.take();
        match shutdown_tx {
            Some(tx) => {
                let _ = tx.send(());
            }
            None => {
                warn!("health controller stop called without a prior start");
                return;
            }
        }
        if let Some(handle) = self.task.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// Force an out-of-schedule probe at the given depth.
    pub async fn ping_now(&self, depth: PingDepth) {
        self.fan_out(depth).await;
        let mut stats = self.stats.lock().await;
        stats.record(depth);
    }

    /// Probe every target concurrently with a bounded lifetime, recovering
    /// from panics, then atomically update the cache.
    async fn fan_out(&self, depth: PingDepth) {
        let timeout = self.config.ping_timeout;
        let mut handles = Vec::with_capacity(self.targets.len());

        for (name, target) in &self.targets {
            let name = name.clone();
            let target = Arc::clone(target);
            handles.push(tokio::spawn(async move {
                let outcome = tokio::time::timeout(timeout, async {
                    match depth {
                        PingDepth::Shallow => target.ping_shallow().await,
                        PingDepth::Deep => target.ping_deep().await,
                    }
                })
                .await;

                match outcome {
                    Ok(result) => (name, result),
                    Err(_) => {
                        let cause = classify(&ProbeOutcome::DeadlineExceeded);
                        (
                            name.clone(),
                            PingResult::new(name, depth).with_cause(cause, "ping timed out"),
                        )
                    }
                }
            }));
        }

        for handle in handles {
            match handle.await {
                Ok((name, result)) => {
                    match result.status() {
                        PingStatus::Degraded => warn!(target = %name, cause = ?result.cause, "dependency degraded"),
                        PingStatus::Unhealthy => error!(target = %name, cause = ?result.cause, "dependency unhealthy"),
                        PingStatus::Healthy => {}
                    }
                    self.cache.write().unwrap().insert(name, result);
                }
                Err(join_error) => {
                    error!(error = %join_error, "probe task panicked; result discarded for this tick");
                }
            }
        }
    }

    /// Snapshot of every cached result, keyed by target name.
    pub fn get_current_health(&self) -> HashMap<String, PingResult> {
        self.cache.read().unwrap().clone()
    }

    /// Latest result for a single target, or a fresh `ok` placeholder if
    /// never probed.
    pub fn get_dependency_health(&self, name: &str) -> PingResult {
        self.cache
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_else(|| PingResult::new(name, PingDepth::Shallow))
    }

    /// True iff every cached result is `healthy`.
    pub fn healthy(&self) -> bool {
        self.cache
            .read()
            .unwrap()
            .values()
            .all(|r| r.status() == PingStatus::Healthy)
    }

    /// True iff at least one cached result is `degraded` and none are
    /// `unhealthy` (supplemented richer view, see SPEC_FULL.md).
    pub fn degraded(&self) -> bool {
        let cache = self.cache.read().unwrap();
        let any_degraded = cache.values().any(|r| r.status() == PingStatus::Degraded);
        let any_unhealthy = cache.values().any(|r| r.status() == PingStatus::Unhealthy);
        any_degraded && !any_unhealthy
    }

    /// JSON Lines snapshot of the current cache, one result per line
    /// (supplemented feature, see SPEC_FULL.md).
    pub fn snapshot_jsonl(&self) -> String {
        let cache = self.cache.read().unwrap();
        let mut lines: Vec<String> = cache
            .values()
            .map(|r| serde_json::to_string(r).expect("PingResult always serializes"))
            .collect();
        lines.sort();
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration as StdDuration;

    struct AlwaysOk {
        latency: StdDuration,
    }

    #[async_trait]
    impl Pingable for AlwaysOk {
        async fn ping_shallow(&self) -> PingResult {
            tokio::time::sleep(self.latency).await;
            PingResult::new("ok-target", PingDepth::Shallow)
        }
        async fn ping_deep(&self) -> PingResult {
            tokio::time::sleep(self.latency).await;
            PingResult::new("ok-target", PingDepth::Deep)
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl Pingable for AlwaysFails {
        async fn ping_shallow(&self) -> PingResult {
            PingResult::new("bad-target", PingDepth::Shallow)
                .with_cause(PingCause::Network, "connection refused")
        }
        async fn ping_deep(&self) -> PingResult {
            self.ping_shallow().await
        }
    }

    struct CountingPanics {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Pingable for CountingPanics {
        async fn ping_shallow(&self) -> PingResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            panic!("boom");
        }
        async fn ping_deep(&self) -> PingResult {
            self.ping_shallow().await
        }
    }

    fn test_config() -> HealthCheckConfig {
        HealthCheckConfig {
            ping_timeout: StdDuration::from_millis(200),
            shallow_interval: StdDuration::from_secs(5),
            deep_interval: StdDuration::from_secs(30),
            deep_every_nth_shallow: 3,
        }
    }

    #[test]
    fn rejects_invalid_target_names() {
        let mut targets: HashMap<String, Arc<dyn Pingable>> = HashMap::new();
        targets.insert("ab".into(), Arc::new(AlwaysOk { latency: StdDuration::ZERO }));
        let err = HealthController::new(targets, test_config()).unwrap_err();
        assert!(matches!(err, HealthError::InvalidTargetName(_)));
    }

    #[tokio::test]
    async fn ping_now_populates_cache_and_healthy_reflects_it() {
        let mut targets: HashMap<String, Arc<dyn Pingable>> = HashMap::new();
        targets.insert(
            "postgres".into(),
            Arc::new(AlwaysOk { latency: StdDuration::ZERO }),
        );
        let controller = HealthController::new(targets, test_config()).unwrap();
        controller.ping_now(PingDepth::Shallow).await;

        assert!(controller.healthy());
        assert_eq!(
            controller.get_dependency_health("postgres").status(),
            PingStatus::Healthy
        );
    }

    #[tokio::test]
    async fn unhealthy_target_makes_fleet_unhealthy_not_degraded() {
        let mut targets: HashMap<String, Arc<dyn Pingable>> = HashMap::new();
        targets.insert("kafka".into(), Arc::new(AlwaysFails));
        let controller = HealthController::new(targets, test_config()).unwrap();
        controller.ping_now(PingDepth::Shallow).await;

        assert!(!controller.healthy());
        assert!(!controller.degraded());
    }

    #[tokio::test]
    async fn timeout_is_classified_and_cached() {
        let mut targets: HashMap<String, Arc<dyn Pingable>> = HashMap::new();
        targets.insert(
            "slow".into(),
            Arc::new(AlwaysOk { latency: StdDuration::from_secs(10) }),
        );
        let controller = HealthController::new(targets, test_config()).unwrap();
        controller.ping_now(PingDepth::Shallow).await;

        let result = controller.get_dependency_health("slow");
        assert_eq!(result.cause, PingCause::Timeout);
    }

    #[tokio::test]
    async fn panicking_probe_does_not_poison_other_targets() {
        let mut targets: HashMap<String, Arc<dyn Pingable>> = HashMap::new();
        targets.insert(
            "flaky".into(),
            Arc::new(CountingPanics { calls: AtomicU32::new(0) }),
        );
        targets.insert(
            "steady".into(),
            Arc::new(AlwaysOk { latency: StdDuration::ZERO }),
        );
        let controller = HealthController::new(targets, test_config()).unwrap();
        controller.ping_now(PingDepth::Shallow).await;

        assert_eq!(
            controller.get_dependency_health("steady").status(),
            PingStatus::Healthy
        );
        // flaky's panic means no cache entry was written for it this tick.
        assert_eq!(
            controller.get_dependency_health("flaky").cause,
            PingCause::Ok
        );
    }

    #[tokio::test]
    async fn deep_is_due_after_nth_shallow() {
        let config = test_config();
        let mut stats = PingingStats::fresh();
        assert!(!stats.deep_is_due(&config));
        stats.record(PingDepth::Shallow);
        stats.record(PingDepth::Shallow);
        assert!(!stats.deep_is_due(&config));
        stats.record(PingDepth::Shallow);
        assert!(stats.deep_is_due(&config));
    }

    #[tokio::test]
    async fn deep_resets_shallow_count() {
        let mut stats = PingingStats::fresh();
        stats.record(PingDepth::Shallow);
        stats.record(PingDepth::Deep);
        assert_eq!(stats.shallow_count, 0);
    }

    #[tokio::test]
    async fn start_twice_is_already_started() {
        let targets: HashMap<String, Arc<dyn Pingable>> = HashMap::new();
        let controller = Arc::new(HealthController::new(targets, test_config()).unwrap());
        controller.start().await.unwrap();
        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, HealthError::AlreadyStarted));
        controller.stop().await;
    }

    #[tokio::test]
    async fn stop_without_start_is_a_safe_no_op() {
        let targets: HashMap<String, Arc<dyn Pingable>> = HashMap::new();
        let controller = HealthController::new(targets, test_config()).unwrap();
        controller.stop().await;
    }
}
