//! # Chat Platform Common Library
//!
//! Shared infrastructure used by every platform crate (health, lifecycle,
//! presence, email) and by the `chatd` composition root:
//! - the common error taxonomy and sentinel errors
//! - structured logging bootstrap (compact + JSON)
//! - epoch-millisecond time helpers

pub mod error;
pub mod logging;
pub mod time;

pub use error::{Error, Result};
pub use logging::{compact_fmt_layer, init_tracing, init_tracing_json, json_fmt_layer};
