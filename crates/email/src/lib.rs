//! Email dispatch service (spec §4.5): a synchronous send path that
//! validates and produces to a partitioned log, and an asynchronous
//! delivery path that consumes, rebuilds SMTP messages, and dispatches
//! them through a bounded worker pool.

pub mod consumer;
pub mod mapping;
pub mod producer;
pub mod service;
pub mod smtp_transport;
pub mod worker_pool;

pub use service::{EmailDispatchError, EmailDispatchService};
pub use worker_pool::{EmailWorkerPool, SmtpSender, WorkerPoolError};
