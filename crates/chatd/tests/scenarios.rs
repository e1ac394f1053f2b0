//! Cross-crate scenario tests (spec §8 S1-S3, plus a boot/shutdown
//! ordering scenario mirroring `main.rs`'s composition).
//!
//! `chatd` has no library target — these tests exercise the same
//! `chatcore-health`/`chatcore-lifecycle` composition `main.rs` performs,
//! using fakes in place of real external clients so no live
//! Postgres/Redis/Kafka/SMTP is required.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatcore_common::Result;
use chatcore_config::HealthCheckConfig;
use chatcore_domain::{PingCause, PingDepth, PingResult};
use chatcore_health::{HealthController, Pingable};
use chatcore_lifecycle::{LifecycleController, LifecycleError, LifecycleService};

/// A fake external dependency that is both `Pingable` and
/// `LifecycleService`, the way every real adapter in `crates/clients`
/// is. Shared between the two controllers via `Arc`, exactly as
/// `main.rs` shares one client handle with both.
struct FakeDependency {
    name: &'static str,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    fail_start: bool,
}

impl FakeDependency {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            fail_start: false,
        }
    }

    fn failing(name: &'static str) -> Self {
        Self {
            name,
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            fail_start: true,
        }
    }
}

#[async_trait]
impl Pingable for FakeDependency {
    async fn ping_shallow(&self) -> PingResult {
        PingResult::new(self.name, PingDepth::Shallow)
    }

    async fn ping_deep(&self) -> PingResult {
        PingResult::new(self.name, PingDepth::Deep)
    }
}

#[async_trait]
impl LifecycleService for FakeDependency {
    async fn start(&self) -> Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(chatcore_common::Error::Transient(format!(
                "{} refused to start",
                self.name
            )));
        }
        Ok(())
    }

    async fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn test_health_config() -> HealthCheckConfig {
    HealthCheckConfig {
        ping_timeout: Duration::from_millis(200),
        shallow_interval: Duration::from_secs(5),
        deep_interval: Duration::from_secs(30),
        deep_every_nth_shallow: 3,
    }
}

/// S1 (spec §8): a fleet of always-ok targets is healthy after probing,
/// and each target's cached cause is `ok`.
#[tokio::test]
async fn s1_healthy_fleet_reports_ok_and_healthy() {
    let a = Arc::new(FakeDependency::new("a"));
    let b = Arc::new(FakeDependency::new("b"));

    let mut targets: HashMap<String, Arc<dyn Pingable>> = HashMap::new();
    targets.insert("a".into(), a.clone() as Arc<dyn Pingable>);
    targets.insert("b".into(), b.clone() as Arc<dyn Pingable>);

    let controller = HealthController::new(targets, test_health_config()).unwrap();
    controller.ping_now(PingDepth::Shallow).await;

    assert!(controller.healthy());
    assert_eq!(controller.get_dependency_health("a").cause, PingCause::Ok);
    assert_eq!(controller.get_dependency_health("b").cause, PingCause::Ok);
}

/// S3 (spec §8): a probe that reports `ok` but exceeds the acceptable
/// latency threshold is demoted to `unstable`/`degraded`, and the fleet
/// as a whole is degraded but not unhealthy.
#[tokio::test]
async fn s3_slow_probe_demotes_to_degraded() {
    let mut result = PingResult::new("slow-dep", PingDepth::Shallow);
    tokio::time::sleep(Duration::from_millis(10)).await;
    result.store_computed_latency(Duration::from_millis(1));

    assert_eq!(result.cause, PingCause::Unstable);

    let mut targets: HashMap<String, Arc<dyn Pingable>> = HashMap::new();
    struct PreComputed(PingResult);
    #[async_trait]
    impl Pingable for PreComputed {
        async fn ping_shallow(&self) -> PingResult {
            self.0.clone()
        }
        async fn ping_deep(&self) -> PingResult {
            self.0.clone()
        }
    }
    targets.insert("slow-dep".into(), Arc::new(PreComputed(result)) as Arc<dyn Pingable>);

    let controller = HealthController::new(targets, test_health_config()).unwrap();
    controller.ping_now(PingDepth::Shallow).await;

    assert!(!controller.healthy());
    assert!(controller.degraded());
}

/// Mirrors `main.rs`'s composition: one set of dependency handles shared
/// by a client-level `LifecycleController` and a `HealthController`.
/// Starting clients, then the health controller, then stopping both in
/// reverse leaves every dependency started once and stopped once.
#[tokio::test]
async fn boot_and_shutdown_ordering_matches_composition_root() {
    let postgres = Arc::new(FakeDependency::new("postgres"));
    let cache = Arc::new(FakeDependency::new("cache"));

    let client_lifecycle = LifecycleController::new(vec![
        ("postgres".to_string(), postgres.clone() as Arc<dyn LifecycleService>),
        ("cache".to_string(), cache.clone() as Arc<dyn LifecycleService>),
    ]);

    let mut health_targets: HashMap<String, Arc<dyn Pingable>> = HashMap::new();
    health_targets.insert("postgres".into(), postgres.clone() as Arc<dyn Pingable>);
    health_targets.insert("cache".into(), cache.clone() as Arc<dyn Pingable>);

    client_lifecycle.start().await.unwrap();
    let health_controller = Arc::new(HealthController::new(health_targets, test_health_config()).unwrap());
    health_controller.start().await.unwrap();

    assert!(health_controller.healthy());

    health_controller.stop().await;
    client_lifecycle.stop().await;

    assert_eq!(postgres.start_calls.load(Ordering::SeqCst), 1);
    assert_eq!(postgres.stop_calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.start_calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stop_calls.load(Ordering::SeqCst), 1);
}

/// A dependency that fails to start rolls back everything already
/// started, in reverse order, and never reaches the health controller.
#[tokio::test]
async fn partial_boot_failure_rolls_back_started_clients() {
    let postgres = Arc::new(FakeDependency::new("postgres"));
    let kafka = Arc::new(FakeDependency::failing("kafka"));

    let client_lifecycle = LifecycleController::new(vec![
        ("postgres".to_string(), postgres.clone() as Arc<dyn LifecycleService>),
        ("kafka".to_string(), kafka.clone() as Arc<dyn LifecycleService>),
    ]);

    let err = client_lifecycle.start().await.unwrap_err();
    assert!(matches!(err, LifecycleError::StartFailed { name, .. } if name == "kafka"));

    assert_eq!(postgres.start_calls.load(Ordering::SeqCst), 1);
    assert_eq!(postgres.stop_calls.load(Ordering::SeqCst), 1);
    assert_eq!(kafka.start_calls.load(Ordering::SeqCst), 1);
    assert_eq!(kafka.stop_calls.load(Ordering::SeqCst), 0);
}
