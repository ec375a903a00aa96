// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod enrich;
pub mod error;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod signals;

// ---- Re-exports for stable public API ----
pub use crate::config::BotConfig;
pub use crate::error::{ConfigError, FetchError};
pub use crate::history::{SignalHistory, SignalStore};
pub use crate::pipeline::{ItemOutcome, LogSink, OutcomeSink, Pipeline, PipelineStats};
pub use crate::signals::{Direction, RejectReason, Rejection, Signal, SignalFactory};
