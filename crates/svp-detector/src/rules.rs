//! Ordered signal rules.
//!
//! Rules are evaluated in order against the tick's CVD readings; the first
//! matching rule names the signal, and [`SignalKind::NoClearBias`] applies
//! when none match.

use crate::config::DetectorConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use svp_core::Bias;

/// Signal categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    BullTrap,
    ShortSqueeze,
    PerpSpikeSpotSelling,
    SpotLedWithBtc,
    SpotStrongBtcFading,
    PerpLedPump,
    BybitRetailExit,
    OkxAsiaDump,
    CoinbaseBinanceDivergence,
    NoClearBias,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BullTrap => "bull_trap",
            Self::ShortSqueeze => "short_squeeze",
            Self::PerpSpikeSpotSelling => "perp_spike_spot_selling",
            Self::SpotLedWithBtc => "spot_led_with_btc",
            Self::SpotStrongBtcFading => "spot_strong_btc_fading",
            Self::PerpLedPump => "perp_led_pump",
            Self::BybitRetailExit => "bybit_retail_exit",
            Self::OkxAsiaDump => "okx_asia_dump",
            Self::CoinbaseBinanceDivergence => "coinbase_binance_divergence",
            Self::NoClearBias => "no_clear_bias",
        }
    }

    /// Human-readable alert text.
    pub fn text(&self) -> &'static str {
        match self {
            Self::BullTrap => "🔻 Perp pump + spot fade — bull trap forming (short opportunity)",
            Self::ShortSqueeze => "💥 Negative funding + Spot buying — short squeeze trap",
            Self::PerpSpikeSpotSelling => "🔥 Perp delta spike + Spot selling — buyer trap likely",
            Self::SpotLedWithBtc => "✅ Spot-led move with BTC confirmation — strong demand",
            Self::SpotStrongBtcFading => "⚠️ SOL spot strong but BTC fading — possible local top",
            Self::PerpLedPump => "🚨 Perp-led pump — no spot participation (trap)",
            Self::BybitRetailExit => "⚠️ Bybit retail buying, Binance fading — exit risk",
            Self::OkxAsiaDump => "🟡 OKX selling, Binance buying — Asia dump risk",
            Self::CoinbaseBinanceDivergence => {
                "🕣 Coinbase buying, Binance Spot selling — divergence"
            }
            Self::NoClearBias => "📊 No clear bias",
        }
    }

    /// Whether the signal is worth persisting.
    pub fn is_meaningful(&self) -> bool {
        !matches!(self, Self::NoClearBias)
    }

    /// Direction that overrides the confluence label in alerts.
    pub fn direction_override(&self) -> Option<Bias> {
        match self {
            Self::BullTrap => Some(Bias::Short),
            Self::ShortSqueeze => Some(Bias::Long),
            _ => None,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs the rules look at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalReadings {
    /// Coinbase spot CVD.
    pub cb: Decimal,
    pub bin_spot: Decimal,
    pub bin_perp: Decimal,
    pub bybit: Decimal,
    pub okx: Decimal,
    pub btc_spot: Decimal,
    pub btc_perp: Decimal,
    /// Average funding, percent.
    pub funding_pct: Decimal,
    pub spike: bool,
}

type Predicate = Box<dyn Fn(&SignalReadings) -> bool + Send + Sync>;

/// One (predicate, signal) pair.
pub struct SignalRule {
    pub kind: SignalKind,
    predicate: Predicate,
}

impl SignalRule {
    pub fn new(
        kind: SignalKind,
        predicate: impl Fn(&SignalReadings) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            predicate: Box::new(predicate),
        }
    }

    pub fn matches(&self, readings: &SignalReadings) -> bool {
        (self.predicate)(readings)
    }
}

impl fmt::Debug for SignalRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalRule").field("kind", &self.kind).finish()
    }
}

/// Ordered rule list with a default.
#[derive(Debug)]
pub struct SignalRuleSet {
    rules: Vec<SignalRule>,
    default: SignalKind,
}

impl SignalRuleSet {
    pub fn new(rules: Vec<SignalRule>, default: SignalKind) -> Self {
        Self { rules, default }
    }

    /// Standard catalogue, first match wins.
    pub fn standard(config: &DetectorConfig) -> Self {
        let zero = Decimal::ZERO;
        let squeeze_funding = config.squeeze_funding_pct;

        Self::new(
            vec![
                SignalRule::new(SignalKind::BullTrap, move |r| {
                    r.bin_perp > zero && r.cb < zero && r.bin_spot < zero
                }),
                SignalRule::new(SignalKind::ShortSqueeze, move |r| {
                    r.funding_pct < squeeze_funding && r.cb > zero
                }),
                SignalRule::new(SignalKind::PerpSpikeSpotSelling, move |r| {
                    r.spike && r.cb < zero
                }),
                SignalRule::new(SignalKind::SpotLedWithBtc, move |r| {
                    r.cb > zero && r.bin_spot > zero && r.bin_perp < zero && r.btc_spot > zero
                }),
                SignalRule::new(SignalKind::SpotStrongBtcFading, move |r| {
                    r.cb > zero && r.bin_spot > zero && r.btc_spot < zero
                }),
                SignalRule::new(SignalKind::PerpLedPump, move |r| {
                    r.bin_perp > zero && r.cb < zero && r.bin_spot <= zero
                }),
                SignalRule::new(SignalKind::BybitRetailExit, move |r| {
                    r.bybit > zero && r.bin_perp < zero
                }),
                SignalRule::new(SignalKind::OkxAsiaDump, move |r| {
                    r.okx < zero && r.bin_perp > zero
                }),
                SignalRule::new(SignalKind::CoinbaseBinanceDivergence, move |r| {
                    r.cb > zero && r.bin_spot < zero
                }),
            ],
            SignalKind::NoClearBias,
        )
    }

    /// First matching signal, or the default.
    pub fn select(&self, readings: &SignalReadings) -> SignalKind {
        self.rules
            .iter()
            .find(|rule| rule.matches(readings))
            .map(|rule| rule.kind)
            .unwrap_or(self.default)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rules() -> SignalRuleSet {
        SignalRuleSet::standard(&DetectorConfig::default())
    }

    #[test]
    fn test_empty_readings_have_no_bias() {
        assert_eq!(rules().select(&SignalReadings::default()), SignalKind::NoClearBias);
        assert!(!SignalKind::NoClearBias.is_meaningful());
    }

    #[test]
    fn test_bull_trap_wins_over_later_rules() {
        // also satisfies PerpLedPump and OkxAsiaDump
        let readings = SignalReadings {
            cb: dec!(-10),
            bin_spot: dec!(-5),
            bin_perp: dec!(50),
            okx: dec!(-3),
            ..Default::default()
        };
        assert_eq!(rules().select(&readings), SignalKind::BullTrap);
        assert_eq!(SignalKind::BullTrap.direction_override(), Some(Bias::Short));
    }

    #[test]
    fn test_short_squeeze_needs_negative_funding() {
        let mut readings = SignalReadings {
            cb: dec!(10),
            funding_pct: dec!(-0.02),
            ..Default::default()
        };
        assert_eq!(rules().select(&readings), SignalKind::ShortSqueeze);

        // exactly at the threshold is not a squeeze
        readings.funding_pct = dec!(-0.01);
        assert_ne!(rules().select(&readings), SignalKind::ShortSqueeze);
    }

    #[test]
    fn test_spike_with_spot_selling() {
        let readings = SignalReadings {
            cb: dec!(-1),
            bin_spot: dec!(2),
            spike: true,
            ..Default::default()
        };
        assert_eq!(rules().select(&readings), SignalKind::PerpSpikeSpotSelling);
    }

    #[test]
    fn test_btc_confirmation_split() {
        let mut readings = SignalReadings {
            cb: dec!(5),
            bin_spot: dec!(5),
            bin_perp: dec!(-5),
            btc_spot: dec!(1),
            ..Default::default()
        };
        assert_eq!(rules().select(&readings), SignalKind::SpotLedWithBtc);

        readings.btc_spot = dec!(-1);
        assert_eq!(rules().select(&readings), SignalKind::SpotStrongBtcFading);
    }

    #[test]
    fn test_perp_led_pump_with_flat_spot() {
        let readings = SignalReadings {
            cb: dec!(-2),
            bin_spot: Decimal::ZERO,
            bin_perp: dec!(8),
            ..Default::default()
        };
        assert_eq!(rules().select(&readings), SignalKind::PerpLedPump);
    }

    #[test]
    fn test_venue_specific_rules() {
        let bybit = SignalReadings {
            bybit: dec!(3),
            bin_perp: dec!(-1),
            ..Default::default()
        };
        assert_eq!(rules().select(&bybit), SignalKind::BybitRetailExit);

        let okx = SignalReadings {
            okx: dec!(-3),
            bin_perp: dec!(1),
            ..Default::default()
        };
        assert_eq!(rules().select(&okx), SignalKind::OkxAsiaDump);

        let divergence = SignalReadings {
            cb: dec!(1),
            bin_spot: dec!(-1),
            ..Default::default()
        };
        assert_eq!(rules().select(&divergence), SignalKind::CoinbaseBinanceDivergence);
    }

    #[test]
    fn test_custom_rule_set() {
        let set = SignalRuleSet::new(
            vec![SignalRule::new(SignalKind::OkxAsiaDump, |r| r.okx < Decimal::ZERO)],
            SignalKind::NoClearBias,
        );
        assert_eq!(set.len(), 1);
        let readings = SignalReadings {
            okx: dec!(-1),
            ..Default::default()
        };
        assert_eq!(set.select(&readings), SignalKind::OkxAsiaDump);
    }
}
