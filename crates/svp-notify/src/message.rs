//! Alert message assembly.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use svp_core::Bias;
use svp_detector::{ConfluenceLabel, ConfluenceResult, HorizonDeltas, MetricId, SignalKind};

/// Rows of the CVD breakdown, in display order.
const BREAKDOWN_ROWS: [(MetricId, &str); 3] = [
    (MetricId::CbCvd, "Coinbase"),
    (MetricId::BinSpot, "Binance Spot"),
    (MetricId::BinPerp, "Binance Perp"),
];

/// Suggested trade direction for an alert.
///
/// The signal's own override wins; otherwise spot dominance reads long and
/// perp dominance reads short.
pub fn suggested_direction(kind: SignalKind, label: ConfluenceLabel) -> Bias {
    kind.direction_override().unwrap_or(match label {
        ConfluenceLabel::SpotDominant => Bias::Long,
        ConfluenceLabel::PerpDominant => Bias::Short,
        ConfluenceLabel::Neutral | ConfluenceLabel::Mixed => Bias::Neutral,
    })
}

fn direction_text(direction: Bias) -> &'static str {
    match direction {
        Bias::Long => "🟢 LONG",
        Bias::Short => "🔴 SHORT",
        Bias::Neutral => "⚠️ NEUTRAL",
    }
}

/// A fully assembled alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertMessage {
    pub asset: String,
    pub kind: SignalKind,
    pub score: u8,
    pub label: ConfluenceLabel,
    pub direction: Bias,
    /// Label of the horizon shown in the breakdown.
    pub breakdown_horizon: String,
    /// Percent change per metric over the breakdown horizon.
    pub breakdown: HorizonDeltas,
    /// Sent by test-alert mode, bypassing the cooldown stage.
    pub test_mode: bool,
}

impl AlertMessage {
    pub fn new(
        asset: impl Into<String>,
        kind: SignalKind,
        result: ConfluenceResult,
        breakdown_horizon: impl Into<String>,
        breakdown: Option<&HorizonDeltas>,
        test_mode: bool,
    ) -> Self {
        Self {
            asset: asset.into(),
            kind,
            score: result.score,
            label: result.label,
            direction: suggested_direction(kind, result.label),
            breakdown_horizon: breakdown_horizon.into(),
            breakdown: breakdown.cloned().unwrap_or_default(),
            test_mode,
        }
    }

    pub fn title(&self) -> String {
        if self.test_mode {
            format!("🧪 **TEST SNIPER SIGNAL ({})**", self.asset)
        } else {
            format!("📈 **HIGH-CONFLUENCE SNIPER SIGNAL ({})**", self.asset)
        }
    }

    fn breakdown_value(&self, metric: MetricId) -> String {
        self.breakdown
            .get(&metric)
            .map(Decimal::to_string)
            .unwrap_or_else(|| "n/a".to_string())
    }

    /// Render as chat text.
    pub fn render(&self) -> String {
        let direction = if self.test_mode {
            format!("{} (Test Mode)", direction_text(self.direction))
        } else {
            direction_text(self.direction).to_string()
        };
        let breakdown_heading = if self.test_mode {
            format!("Simulated {} CVD Δ", self.breakdown_horizon)
        } else {
            format!("{} CVD Δ Breakdown", self.breakdown_horizon)
        };

        let mut text = format!(
            "{}\n{}\n\n🧠 Confidence Score: `{}/10` → `{}`\n🎯 Suggested Trade: **{}**\n📊 {}:\n",
            self.title(),
            self.kind.text(),
            self.score,
            self.label,
            direction,
            breakdown_heading,
        );
        for (metric, name) in BREAKDOWN_ROWS {
            text.push_str(&format!("   • {name}: `{}%`\n", self.breakdown_value(metric)));
        }
        text
    }
}
