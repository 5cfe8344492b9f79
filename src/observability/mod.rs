//! Observability module for the case simulator client.
//!
//! Structured logging setup and ingestion stream metrics.

mod logging;
mod metrics;

pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use metrics::{
    DefaultStreamMetrics, NoopStreamMetrics, StreamMetrics, StreamMetricsSnapshot, StreamOutcome,
};
