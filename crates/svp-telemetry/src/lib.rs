//! Prometheus metrics and structured logging for the confluence monitor.
//!
//! - Prometheus counters and gauges for ingestion, ticks, signals and gating
//! - Structured logging with tracing (pretty in development, JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::{Metrics, MetricsSummary};
