//! Thin `Pingable`/`LifecycleService` adapters for every external
//! dependency the core composes (spec §2, §6): the relational store, the
//! partitioned log, the distributed cache cluster, the SMTP relay, and a
//! generic reachability probe for the stores the core never talks to
//! directly (wide-column, search, graph, consensus).
//!
//! None of these types know about each other; `chatcore-chatd` wires
//! them into a `LifecycleController` and a `HealthController` at startup.

pub mod cache;
pub mod kafka;
pub mod postgres;
pub mod reachability;
pub mod smtp;

pub use cache::CacheClusterClient;
pub use kafka::KafkaClient;
pub use postgres::PostgresClient;
pub use reachability::ReachabilityClient;
pub use smtp::SmtpClient;
