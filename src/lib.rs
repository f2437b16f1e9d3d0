// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod dedup;
pub mod events;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod relevance;

pub use crate::api::router;
pub use crate::ingest::scheduler::{spawn_poller, CycleReport, Poller, PollerCfg};
