//! Two-tier health probing: classify probe failures, fan out shallow/deep
//! checks on a schedule, and answer aggregate and per-target queries
//! (spec §4.1, §4.2).

pub mod classifier;
pub mod controller;
pub mod pingable;

pub use classifier::{classify, ProbeOutcome};
pub use controller::{HealthController, HealthError};
pub use pingable::Pingable;
