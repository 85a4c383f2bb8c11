//! Scalar readings pulled from REST collaborators.
//!
//! These are opaque to the scoring pipeline except where the signal rules
//! consult them. Every reading has a neutral `Default` so that a missing or
//! failed fetch degrades to "no bias" rather than an error.

use crate::decimal::round_dp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Positioning bias derived from a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    Long,
    Short,
    #[default]
    Neutral,
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

/// Latest funding rates per venue, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FundingReading {
    pub bybit_pct: Decimal,
    pub binance_pct: Decimal,
}

impl FundingReading {
    /// Average of the non-zero venue rates, rounded to 4 dp. Zero if none.
    ///
    /// A zero rate is treated as "not fetched yet" rather than a real zero.
    pub fn average(&self) -> Decimal {
        let valid: Vec<Decimal> = [self.bybit_pct, self.binance_pct]
            .into_iter()
            .filter(|r| !r.is_zero())
            .collect();
        if valid.is_empty() {
            return Decimal::ZERO;
        }
        let sum: Decimal = valid.iter().copied().sum();
        round_dp(sum / Decimal::from(valid.len()), 4)
    }
}

/// Direction of the last open-interest move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OiDirection {
    Up,
    Down,
    #[default]
    Flat,
}

/// Open-interest snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OiSnapshot {
    /// Latest open interest, `None` until the first successful fetch.
    pub oi: Option<Decimal>,
    pub oi_delta: Decimal,
    pub direction: OiDirection,
    pub spike: bool,
    pub bias: Bias,
}

/// Which side was liquidated more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidationSide {
    Longs,
    #[default]
    Shorts,
}

/// Liquidation snapshot over the venue's recent liquidation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LiquidationSnapshot {
    pub longs: Decimal,
    pub shorts: Decimal,
    pub dominant: LiquidationSide,
    pub bias: Bias,
    pub spike: bool,
}

impl LiquidationSnapshot {
    /// Derive dominance, bias and spike from totals.
    ///
    /// Heavy long liquidations mean forced selling, so the bias is short
    /// (and vice versa). A spike is a total exceeding `previous_total *
    /// spike_multiplier`; no spike is reported without a positive previous total.
    pub fn from_totals(
        longs: Decimal,
        shorts: Decimal,
        previous_total: Decimal,
        spike_multiplier: Decimal,
    ) -> Self {
        let dominant = if longs > shorts {
            LiquidationSide::Longs
        } else {
            LiquidationSide::Shorts
        };
        let bias = match dominant {
            LiquidationSide::Longs => Bias::Short,
            LiquidationSide::Shorts => Bias::Long,
        };
        let total = longs + shorts;
        let spike = previous_total > Decimal::ZERO && total > previous_total * spike_multiplier;

        Self {
            longs: round_dp(longs, 2),
            shorts: round_dp(shorts, 2),
            dominant,
            bias,
            spike,
        }
    }

    pub fn total(&self) -> Decimal {
        self.longs + self.shorts
    }
}

/// Coarse sentiment classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentBadge {
    Hot,
    Warm,
    #[default]
    Flat,
}

/// Opaque social sentiment reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SentimentSnapshot {
    pub badge: SentimentBadge,
    pub galaxy_score: Decimal,
    pub mentions: Decimal,
    pub price_score: Decimal,
}

impl SentimentSnapshot {
    pub fn new(galaxy_score: Decimal, mentions: Decimal, price_score: Decimal) -> Self {
        let badge = if galaxy_score > Decimal::from(70) {
            SentimentBadge::Hot
        } else if galaxy_score > Decimal::from(50) {
            SentimentBadge::Warm
        } else {
            SentimentBadge::Flat
        };
        Self {
            badge,
            galaxy_score,
            mentions,
            price_score,
        }
    }
}

/// All pulled readings at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MarketReadings {
    pub funding: FundingReading,
    pub oi: OiSnapshot,
    pub liquidations: LiquidationSnapshot,
    pub sentiment: SentimentSnapshot,
}
