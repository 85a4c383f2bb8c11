//! Core domain types for the spot-vs-perp confluence monitor.
//!
//! This crate provides fundamental types used throughout the system:
//! - `MarketKey`: Venue + market type + asset role of a trade stream
//! - `Price`, `Size`: Precision-safe numeric types
//! - `TradeTick`: A validated aggressor trade
//! - Reading snapshots pulled from REST collaborators (funding, OI, liquidations, sentiment)

pub mod decimal;
pub mod error;
pub mod market;
pub mod readings;
pub mod trade;

pub use decimal::{round_dp, Price, Size};
pub use error::{CoreError, Result};
pub use market::{AssetRole, MarketKey, MarketType, Venue};
pub use readings::{
    Bias, FundingReading, LiquidationSide, LiquidationSnapshot, MarketReadings, OiDirection,
    OiSnapshot, SentimentBadge, SentimentSnapshot,
};
pub use trade::{AggressorSide, TradeTick};
