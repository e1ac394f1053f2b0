//! Session-backed presence tracking: a hash-tagged cache keyspace,
//! bounded local caches with single-flight loaders, a per-session
//! heartbeat, and a pub/sub bridge for cross-replica convergence
//! (spec §4.4).

pub mod cache;
pub mod heartbeat;
pub mod keyspace;
pub mod pubsub;
pub mod service;
pub mod store;

pub use cache::{LastSeenCache, StatusCache};
pub use heartbeat::HeartbeatRegistry;
pub use pubsub::PresenceBus;
pub use service::PresenceService;
pub use store::{DeleteOutcome, PresenceStore};
