//! Order-flow signal detection.
//!
//! Turns per-market CVD readings into:
//! - a rolling net-delta spike check ([`SpikeDetector`])
//! - percent change over several horizons ([`MultiTimeframeMemory`])
//! - a weighted spot/perp confluence score ([`ConfluenceScorer`])
//! - a named signal from an ordered rule list ([`SignalRuleSet`])

pub mod config;
pub mod confluence;
pub mod error;
pub mod rolling;
pub mod rules;
pub mod timeframe;

pub use config::{DetectorConfig, Horizon, SpikeConfig};
pub use confluence::{ConfluenceLabel, ConfluenceResult, ConfluenceScorer, HorizonVote, MAX_SCORE};
pub use error::{DetectorError, DetectorResult};
pub use rolling::{RollingSeries, SpikeDetector, SpikeReport};
pub use rules::{SignalKind, SignalReadings, SignalRule, SignalRuleSet};
pub use timeframe::{
    percent_change, HorizonDeltas, MetricId, MultiTimeframeMemory, TimeframeDeltas,
    TimeframeSnapshot,
};
