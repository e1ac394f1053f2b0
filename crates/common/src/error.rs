//! Error taxonomy shared by every platform crate.
//!
//! Mirrors the propagation policy in the spec: configuration errors are
//! fatal at bootstrap, transient dependency errors are logged and
//! surfaced to callers, and a handful of sentinel conditions (already
//! started, already stopped, queue full, cache miss) are compared by
//! identity rather than by message text.

use thiserror::Error;

/// Errors common to the platform layer.
///
/// Per-crate errors (health, lifecycle, presence, email) wrap or convert
/// into this where they cross a crate boundary; within a crate they keep
/// their own narrower enum.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration failed to validate at construction time.
    #[error("configuration error: {0}")]
    Config(String),

    /// A dependency call failed transiently; the caller may retry.
    #[error("transient dependency error: {0}")]
    Transient(String),

    /// A service's `Start` was called while already started.
    #[error("already started")]
    AlreadyStarted,

    /// A bounded queue was at capacity.
    #[error("queue full")]
    QueueFull,

    /// A local cache loader failed and no value could be produced.
    #[error("cache miss")]
    CacheMiss,

    /// Serialization/deserialization failure.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Catch-all for bootstrap-time fatal errors.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Result alias for platform operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_errors_compare_by_identity_not_text() {
        let a = Error::AlreadyStarted;
        assert!(matches!(a, Error::AlreadyStarted));
    }

    #[test]
    fn config_error_renders_context() {
        let err = Error::Config("ShallowInterval - PingTimeout < 1s".to_string());
        assert_eq!(
            err.to_string(),
            "configuration error: ShallowInterval - PingTimeout < 1s"
        );
    }
}
