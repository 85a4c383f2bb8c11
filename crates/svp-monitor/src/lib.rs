//! Spot-vs-perp order-flow confluence monitor.
//!
//! Main application that orchestrates all components:
//! - Trade streams feeding per-venue CVD accumulators
//! - REST pollers for funding, open interest, liquidations and sentiment
//! - Spike detection, multi-horizon deltas and confluence scoring
//! - Snapshot persistence and gated alert delivery

pub mod app;
pub mod config;
pub mod error;

pub use app::{AlertOutcome, Application, TickReport};
pub use config::{AppConfig, MarketConfig, TelemetryConfig};
pub use error::{AppError, AppResult};
