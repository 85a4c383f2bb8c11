//! Spot/perp confluence scoring.
//!
//! Pure and deterministic: each horizon votes for the side (spot or perp)
//! whose percent change leads, votes are weighted by horizon, and the
//! winning weight share becomes a 0..=10 score.

use crate::config::DetectorConfig;
use crate::timeframe::{HorizonDeltas, MetricId, TimeframeDeltas};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use svp_core::round_dp;

/// Maximum confluence score.
pub const MAX_SCORE: u8 = 10;

/// Bias label of a confluence result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfluenceLabel {
    SpotDominant,
    PerpDominant,
    #[default]
    Neutral,
    Mixed,
}

impl ConfluenceLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpotDominant => "spot_dominant",
            Self::PerpDominant => "perp_dominant",
            Self::Neutral => "neutral",
            Self::Mixed => "mixed",
        }
    }
}

impl fmt::Display for ConfluenceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score and label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ConfluenceResult {
    /// 0..=10
    pub score: u8,
    pub label: ConfluenceLabel,
}

/// Vote of one horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizonVote {
    Spot,
    Perp,
    Neutral,
    /// All metrics zero (warm-up); the horizon does not vote.
    Abstain,
}

/// Weighted-vote scorer.
#[derive(Debug, Clone)]
pub struct ConfluenceScorer {
    weights: BTreeMap<String, u32>,
    high_score: u8,
    min_divergence_pct: Decimal,
}

impl ConfluenceScorer {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            weights: config.horizon_weights.clone(),
            high_score: config.high_score,
            min_divergence_pct: config.min_divergence_pct,
        }
    }

    fn weight_of(&self, label: &str) -> u32 {
        self.weights.get(label).copied().unwrap_or(1)
    }

    /// Vote of a single horizon.
    ///
    /// Spot side is the mean of the spot metrics, perp side is Binance perp.
    /// Missing metrics read as 0.
    pub fn vote(&self, deltas: &HorizonDeltas) -> HorizonVote {
        let get = |m: MetricId| deltas.get(&m).copied().unwrap_or_default();
        let (cb, spot, perp) = (
            get(MetricId::CbCvd),
            get(MetricId::BinSpot),
            get(MetricId::BinPerp),
        );

        if cb.is_zero() && spot.is_zero() && perp.is_zero() {
            return HorizonVote::Abstain;
        }

        let spot_side = (cb + spot) / Decimal::TWO;
        let diff = spot_side - perp;
        if diff.abs() < self.min_divergence_pct {
            HorizonVote::Neutral
        } else if diff > Decimal::ZERO {
            HorizonVote::Spot
        } else {
            HorizonVote::Perp
        }
    }

    /// Score every horizon and fuse the votes.
    pub fn score(&self, deltas: &TimeframeDeltas) -> ConfluenceResult {
        let mut spot_w = 0u32;
        let mut perp_w = 0u32;
        let mut total_w = 0u32;
        let mut voted = false;

        for (label, horizon) in deltas.iter() {
            let weight = self.weight_of(label);
            total_w += weight;
            match self.vote(horizon) {
                HorizonVote::Spot => {
                    spot_w += weight;
                    voted = true;
                }
                HorizonVote::Perp => {
                    perp_w += weight;
                    voted = true;
                }
                HorizonVote::Neutral => voted = true,
                HorizonVote::Abstain => {}
            }
        }

        if !voted || total_w == 0 {
            return ConfluenceResult::default();
        }

        let lead = spot_w.max(perp_w);
        let ratio = Decimal::from(lead) * Decimal::TEN / Decimal::from(total_w);
        let score = round_dp(ratio, 0)
            .to_u8()
            .unwrap_or(MAX_SCORE)
            .min(MAX_SCORE);

        let label = if spot_w == perp_w {
            if spot_w == 0 {
                ConfluenceLabel::Neutral
            } else {
                ConfluenceLabel::Mixed
            }
        } else if score >= self.high_score {
            if spot_w > perp_w {
                ConfluenceLabel::SpotDominant
            } else {
                ConfluenceLabel::PerpDominant
            }
        } else {
            ConfluenceLabel::Mixed
        };

        ConfluenceResult { score, label }
    }
}
