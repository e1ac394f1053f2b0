//! Composition root for the chat platform core (spec §2, §4.3).
//!
//! Boot order: config -> logging -> every external client, registered
//! with a client-level `LifecycleController` and a `HealthController` ->
//! the platform services (presence, email dispatch), registered with a
//! second, service-level `LifecycleController`. Shutdown reverses that:
//! services first, then the health scheduler, then clients.
//!
//! Grounded on `crates/pipeline/src/main.rs`'s `tokio::main` bootstrap:
//! same signal-driven shutdown shape, generalized from three ad hoc
//! workers to the two ordered lifecycle controllers described above.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chatcore_clients::{CacheClusterClient, KafkaClient, PostgresClient, ReachabilityClient, SmtpClient};
use chatcore_config::AppConfig;
use chatcore_email::EmailDispatchService;
use chatcore_health::{HealthController, Pingable};
use chatcore_lifecycle::{LifecycleController, LifecycleService};
use chatcore_logger::{LoggerFactory, LoggerFactoryConfig, RootFields};
use chatcore_presence::PresenceService;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    install_logging(&config)?;

    info!("starting chat platform core");
    info!(version = env!("CARGO_PKG_VERSION"), "chatd build info");

    let postgres = PostgresClient::new(config.database.clone());
    let cache = CacheClusterClient::new(config.presence.redis_cluster_urls.clone());
    let kafka = KafkaClient::new(config.email.kafka_brokers.clone());
    let smtp = SmtpClient::new(config.email.clone());
    let reachability: Vec<(String, Arc<ReachabilityClient>)> = config
        .reachability_targets
        .iter()
        .cloned()
        .map(|target| (target.name.clone(), ReachabilityClient::new(target)))
        .collect();

    let mut client_services: Vec<(String, Arc<dyn LifecycleService>)> = vec![
        ("postgres".to_string(), postgres.clone() as Arc<dyn LifecycleService>),
        ("cache".to_string(), cache.clone() as Arc<dyn LifecycleService>),
        ("kafka".to_string(), kafka.clone() as Arc<dyn LifecycleService>),
        ("smtp".to_string(), smtp.clone() as Arc<dyn LifecycleService>),
    ];
    let mut health_targets: HashMap<String, Arc<dyn Pingable>> = HashMap::new();
    health_targets.insert("postgres".to_string(), postgres.clone() as Arc<dyn Pingable>);
    health_targets.insert("cache".to_string(), cache.clone() as Arc<dyn Pingable>);
    health_targets.insert("kafka".to_string(), kafka.clone() as Arc<dyn Pingable>);
    health_targets.insert("smtp".to_string(), smtp.clone() as Arc<dyn Pingable>);
    for (name, target) in &reachability {
        client_services.push((name.clone(), target.clone() as Arc<dyn LifecycleService>));
        health_targets.insert(name.clone(), target.clone() as Arc<dyn Pingable>);
    }

    let client_lifecycle = LifecycleController::new(client_services);
    client_lifecycle.start().await?;
    info!("external clients started");

    let health_controller = Arc::new(HealthController::new(health_targets, config.health.clone())?);
    health_controller.start().await?;
    info!("health controller started");

    let presence_service = Arc::new(PresenceService::new(&config.presence).await?);
    let email_service = Arc::new(EmailDispatchService::new(config.email.clone())?);

    let service_lifecycle = LifecycleController::new(vec![
        ("presence".to_string(), presence_service.clone() as Arc<dyn LifecycleService>),
        ("email".to_string(), email_service.clone() as Arc<dyn LifecycleService>),
    ]);

    if let Err(e) = service_lifecycle.start().await {
        warn!(error = %e, "platform services failed to start; tearing down clients");
        health_controller.stop().await;
        client_lifecycle.stop().await;
        return Err(e.into());
    }
    info!("platform services started");

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining in reverse order");

    service_lifecycle.stop().await;
    health_controller.stop().await;
    client_lifecycle.stop().await;

    info!("chat platform core shutdown complete");
    Ok(())
}

/// Builds the hierarchical `LoggerFactory` (spec §4.6) from config and
/// installs it as the process's global subscriber, JSON-formatted.
fn install_logging(config: &AppConfig) -> Result<()> {
    let root = RootFields {
        instance_id: std::env::var("INSTANCE_ID").unwrap_or_else(|_| {
            std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
        }),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: option_env!("CHATCORE_COMMIT").unwrap_or("unknown").to_string(),
        build_date: option_env!("CHATCORE_BUILD_DATE").unwrap_or("unknown").to_string(),
    };

    let factory = LoggerFactory::new(
        root,
        LoggerFactoryConfig {
            root_level: config.logger.root_level.clone(),
            literal: config.logger.literal.clone(),
            patterns: config.logger.patterns.clone(),
        },
    )
    .map_err(|e| anyhow::anyhow!("logger factory construction failed: {e}"))?;

    chatcore_logger::install(factory, true);
    Ok(())
}

/// Waits for either Ctrl-C or, on Unix, `SIGTERM` — the two signals a
/// container orchestrator or a local developer actually sends.
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
