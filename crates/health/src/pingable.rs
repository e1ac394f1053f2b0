//! The `Pingable` capability (spec §3, §4.1).

use async_trait::async_trait;
use chatcore_domain::PingResult;

/// Two-level probe capability every dependency exposes. Both operations
/// must be idempotent and safe to call concurrently; the caller applies
/// the deadline (via `tokio::time::timeout`), not the implementor.
#[async_trait]
pub trait Pingable: Send + Sync {
    /// Cheap liveness check: verify reachable state without a round-trip
    /// to a remote coordinator.
    async fn ping_shallow(&self) -> PingResult;

    /// End-to-end correctness check: a real query, cluster metadata,
    /// disk-usage ratios, or similar.
    async fn ping_deep(&self) -> PingResult;
}
