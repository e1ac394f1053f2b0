//! Configuration management for the chat platform core.
//!
//! Every section is loaded from environment variables (`.env` first, real
//! environment wins) and validated at construction. A bad value is a
//! bootstrap-fatal `chatcore_common::Error::Config`, never a runtime
//! surprise.

use std::env;
use std::time::Duration;

use chatcore_common::{Error, Result};

fn env_var(key: &str) -> Result<String> {
    env::var(key).map_err(|_| Error::Config(format!("{key} must be set")))
}

fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| Error::Config(format!("{key} is not a valid value: '{raw}'"))),
        Err(_) => Ok(default),
    }
}

/// Bounds on the health controller's probe cadence (spec §4.2).
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    pub ping_timeout: Duration,
    pub shallow_interval: Duration,
    pub deep_interval: Duration,
    pub deep_every_nth_shallow: u32,
}

impl HealthCheckConfig {
    pub fn load() -> Result<Self> {
        let ping_timeout_ms = env_parse_or("HEALTH_PING_TIMEOUT_MS", 1_000u64)?;
        let shallow_interval_ms = env_parse_or("HEALTH_SHALLOW_INTERVAL_MS", 10_000u64)?;
        let deep_interval_ms = env_parse_or("HEALTH_DEEP_INTERVAL_MS", 60_000u64)?;
        let deep_every_nth_shallow = env_parse_or("HEALTH_DEEP_EVERY_NTH_SHALLOW", 5u32)?;

        let config = Self {
            ping_timeout: Duration::from_millis(ping_timeout_ms),
            shallow_interval: Duration::from_millis(shallow_interval_ms),
            deep_interval: Duration::from_millis(deep_interval_ms),
            deep_every_nth_shallow,
        };
        config.validate()?;
        Ok(config)
    }

    /// Range and cross-field checks from spec §4.2. Exposed separately so
    /// tests can construct out-of-range configs directly.
    pub fn validate(&self) -> Result<()> {
        let timeout = self.ping_timeout;
        if !(Duration::from_millis(100)..=Duration::from_secs(3)).contains(&timeout) {
            return Err(Error::Config(
                "PingTimeout must be between 100ms and 3s".into(),
            ));
        }
        if !(Duration::from_secs(5)..=Duration::from_secs(60)).contains(&self.shallow_interval) {
            return Err(Error::Config(
                "ShallowInterval must be between 5s and 60s".into(),
            ));
        }
        if !(Duration::from_secs(30)..=Duration::from_secs(300)).contains(&self.deep_interval) {
            return Err(Error::Config(
                "DeepInterval must be between 30s and 5min".into(),
            ));
        }
        if !(1..=10).contains(&self.deep_every_nth_shallow) {
            return Err(Error::Config(
                "DeepEveryNthShallow must be between 1 and 10".into(),
            ));
        }
        if self.shallow_interval <= self.ping_timeout
            || self.shallow_interval - self.ping_timeout < Duration::from_secs(1)
        {
            return Err(Error::Config(
                "ShallowInterval - PingTimeout must be >= 1s".into(),
            ));
        }
        if self.deep_interval < self.shallow_interval * 2 {
            return Err(Error::Config(
                "DeepInterval must be >= 2 * ShallowInterval".into(),
            ));
        }
        Ok(())
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            ping_timeout: Duration::from_secs(1),
            shallow_interval: Duration::from_secs(10),
            deep_interval: Duration::from_secs(60),
            deep_every_nth_shallow: 5,
        }
    }
}

/// Redis cluster + presence keyspace TTLs (spec §4.4, §6).
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    pub redis_cluster_urls: Vec<String>,
    pub session_ttl: Duration,
    pub session_set_ttl: Duration,
    pub last_seen_ttl: Duration,
    pub heartbeat_interval: Duration,
    pub status_cache_capacity: u64,
    pub status_cache_ttl: Duration,
    pub last_seen_cache_capacity: u64,
    pub last_seen_cache_ttl: Duration,
    pub loader_deadline: Duration,
    pub presence_subject: String,
}

impl PresenceConfig {
    pub fn load() -> Result<Self> {
        let redis_cluster_urls = env_var("REDIS_CLUSTER_URLS")?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        if redis_cluster_urls.is_empty() {
            return Err(Error::Config(
                "REDIS_CLUSTER_URLS must list at least one node".into(),
            ));
        }

        Ok(Self {
            redis_cluster_urls,
            session_ttl: Duration::from_secs(env_parse_or("PRESENCE_SESSION_TTL_SECS", 60u64)?),
            session_set_ttl: Duration::from_secs(env_parse_or(
                "PRESENCE_SESSION_SET_TTL_SECS",
                90u64,
            )?),
            last_seen_ttl: Duration::from_secs(env_parse_or(
                "PRESENCE_LAST_SEEN_TTL_SECS",
                24 * 60 * 60,
            )?),
            heartbeat_interval: Duration::from_secs(env_parse_or(
                "PRESENCE_HEARTBEAT_INTERVAL_SECS",
                30u64,
            )?),
            status_cache_capacity: env_parse_or("PRESENCE_STATUS_CACHE_CAPACITY", 10_000u64)?,
            status_cache_ttl: Duration::from_secs(env_parse_or(
                "PRESENCE_STATUS_CACHE_TTL_SECS",
                5u64,
            )?),
            last_seen_cache_capacity: env_parse_or("PRESENCE_LAST_SEEN_CACHE_CAPACITY", 5_000u64)?,
            last_seen_cache_ttl: Duration::from_secs(env_parse_or(
                "PRESENCE_LAST_SEEN_CACHE_TTL_SECS",
                60u64,
            )?),
            loader_deadline: Duration::from_millis(env_parse_or(
                "PRESENCE_LOADER_DEADLINE_MS",
                100u64,
            )?),
            presence_subject: env_var_or("PRESENCE_SUBJECT", "user.presence.updates"),
        })
    }
}

/// Partitioned-log and SMTP/DKIM configuration for email dispatch (spec §4.5).
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub kafka_brokers: String,
    pub kafka_topic: String,
    pub kafka_consumer_group: String,
    pub default_sender_address: String,
    pub worker_pool_queue_capacity: usize,
    pub worker_pool_size: usize,
    pub smtp_send_timeout: Duration,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub dkim_domain: String,
    pub dkim_selector: String,
    pub dkim_private_key_path: String,
}

impl EmailConfig {
    pub fn load() -> Result<Self> {
        Ok(Self {
            kafka_brokers: env_var("EMAIL_KAFKA_BROKERS")?,
            kafka_topic: env_var_or("EMAIL_KAFKA_TOPIC", "chat.email.outbound"),
            kafka_consumer_group: env_var_or("EMAIL_KAFKA_CONSUMER_GROUP", "email-dispatch"),
            default_sender_address: env_var("EMAIL_DEFAULT_SENDER_ADDRESS")?,
            worker_pool_queue_capacity: env_parse_or("EMAIL_WORKER_QUEUE_CAPACITY", 1_000usize)?,
            worker_pool_size: env_parse_or("EMAIL_WORKER_COUNT", 10usize)?,
            smtp_send_timeout: Duration::from_secs(env_parse_or(
                "EMAIL_SMTP_SEND_TIMEOUT_SECS",
                10u64,
            )?),
            smtp_host: env_var("EMAIL_SMTP_HOST")?,
            smtp_port: env_parse_or("EMAIL_SMTP_PORT", 587u16)?,
            smtp_username: env::var("EMAIL_SMTP_USERNAME").ok(),
            smtp_password: env::var("EMAIL_SMTP_PASSWORD").ok(),
            dkim_domain: env_var("EMAIL_DKIM_DOMAIN")?,
            dkim_selector: env_var_or("EMAIL_DKIM_SELECTOR", "default"),
            dkim_private_key_path: env_var("EMAIL_DKIM_PRIVATE_KEY_PATH")?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_pool_size == 0 {
            return Err(Error::Config("EMAIL_WORKER_COUNT must be >= 1".into()));
        }
        if self.worker_pool_queue_capacity == 0 {
            return Err(Error::Config(
                "EMAIL_WORKER_QUEUE_CAPACITY must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// Connection settings for the relational store client (spec §2 item 1).
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl DatabaseConfig {
    pub fn load() -> Result<Self> {
        Ok(Self {
            url: env_var("DATABASE_URL")?,
            max_connections: env_parse_or("DATABASE_MAX_CONNECTIONS", 20u32)?,
            min_connections: env_parse_or("DATABASE_MIN_CONNECTIONS", 5u32)?,
        })
    }
}

/// Generic reachability targets for the remaining external stores (spec §2
/// items 2-3, 5-7): wide-column, search, graph, consensus. Each is probed
/// over TCP or HTTP only — see `chatcore-clients`.
#[derive(Debug, Clone)]
pub struct ReachabilityTarget {
    pub name: String,
    pub address: String,
}

/// Declarative shape for `chatcore-logger`'s `LoggerFactory` (spec §4.6):
/// a root level plus literal and ordered-pattern overrides, read from the
/// environment so the factory itself stays config-crate-agnostic.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub root_level: String,
    /// `LOG_LEVEL_LITERAL="health=debug,email=warn"`.
    pub literal: std::collections::HashMap<String, String>,
    /// `LOG_LEVEL_PATTERNS="^health::.*=trace;^email::consumer$=debug"`,
    /// semicolon-separated since a regex may itself contain commas.
    pub patterns: Vec<(String, String)>,
}

impl LoggerConfig {
    pub fn load() -> Self {
        let root_level = env_var_or("LOG_LEVEL", "info");

        let literal = env::var("LOG_LEVEL_LITERAL")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .filter_map(|entry| {
                        let (name, level) = entry.trim().split_once('=')?;
                        Some((name.to_string(), level.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let patterns = env::var("LOG_LEVEL_PATTERNS")
            .ok()
            .map(|raw| {
                raw.split(';')
                    .filter_map(|entry| {
                        let (pattern, level) = entry.trim().split_once('=')?;
                        Some((pattern.to_string(), level.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            root_level,
            literal,
            patterns,
        }
    }
}

/// Top-level configuration tree assembled at process startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub health: HealthCheckConfig,
    pub presence: PresenceConfig,
    pub email: EmailConfig,
    pub database: DatabaseConfig,
    pub reachability_targets: Vec<ReachabilityTarget>,
    pub logger: LoggerConfig,
}

impl AppConfig {
    /// Load `.env` (if present) and every section, failing fast on the
    /// first invalid one.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let email = EmailConfig::load()?;
        email.validate()?;

        Ok(Self {
            health: HealthCheckConfig::load()?,
            presence: PresenceConfig::load()?,
            email,
            database: DatabaseConfig::load()?,
            reachability_targets: Self::load_reachability_targets(),
            logger: LoggerConfig::load(),
        })
    }

    /// `NAME=host:port` pairs, comma-separated, e.g.
    /// `CHATCORE_REACHABILITY_TARGETS=search:es.internal:9200,graph:neo.internal:7687`.
    fn load_reachability_targets() -> Vec<ReachabilityTarget> {
        env::var("CHATCORE_REACHABILITY_TARGETS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .filter_map(|entry| {
                        let entry = entry.trim();
                        let (name, address) = entry.split_once(':')?;
                        Some(ReachabilityTarget {
                            name: name.to_string(),
                            address: address.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
