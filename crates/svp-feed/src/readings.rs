//! Latest pulled readings and their derivation state.
//!
//! Each poller owns one field of the [`ReadingsCell`] and replaces it
//! wholesale; the orchestrator copies the whole cell once per tick.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use svp_core::{
    round_dp, Bias, FundingReading, LiquidationSnapshot, MarketReadings, OiDirection, OiSnapshot,
    SentimentSnapshot,
};
use tracing::{debug, info};

/// Default OI move (percent of previous) counted as a spike.
pub const DEFAULT_OI_SPIKE_PCT: Decimal = dec!(1.0);

/// Default liquidation total multiplier counted as a spike.
pub const DEFAULT_LIQUIDATION_SPIKE_MULTIPLIER: Decimal = dec!(1.5);

/// Shared holder of the latest readings.
#[derive(Debug, Default)]
pub struct ReadingsCell {
    inner: RwLock<MarketReadings>,
}

impl ReadingsCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all readings.
    pub fn snapshot(&self) -> MarketReadings {
        *self.inner.read()
    }

    pub fn set_funding(&self, funding: FundingReading) {
        self.inner.write().funding = funding;
    }

    /// Replace the Bybit funding rate, keeping Binance's.
    pub fn set_bybit_funding(&self, pct: Decimal) {
        self.inner.write().funding.bybit_pct = pct;
    }

    /// Replace the Binance funding rate, keeping Bybit's.
    pub fn set_binance_funding(&self, pct: Decimal) {
        self.inner.write().funding.binance_pct = pct;
    }

    pub fn set_oi(&self, oi: OiSnapshot) {
        self.inner.write().oi = oi;
    }

    pub fn set_liquidations(&self, liquidations: LiquidationSnapshot) {
        self.inner.write().liquidations = liquidations;
    }

    pub fn set_sentiment(&self, sentiment: SentimentSnapshot) {
        self.inner.write().sentiment = sentiment;
    }
}

/// Derives OI delta, spike and bias from successive open-interest values.
#[derive(Debug, Clone)]
pub struct OiTracker {
    last_oi: Option<Decimal>,
    spike_threshold_pct: Decimal,
}

impl OiTracker {
    pub fn new(spike_threshold_pct: Decimal) -> Self {
        Self {
            last_oi: None,
            spike_threshold_pct,
        }
    }

    /// Record a freshly fetched value and derive the snapshot.
    ///
    /// The first observation has no delta. Direction and bias are only
    /// reported for a spike; smaller moves read as flat/neutral.
    pub fn observe(&mut self, current: Decimal) -> OiSnapshot {
        let mut snapshot = OiSnapshot {
            oi: Some(round_dp(current, 2)),
            ..OiSnapshot::default()
        };

        if let Some(last) = self.last_oi {
            let delta = current - last;
            snapshot.oi_delta = round_dp(delta, 2);

            let pct = if last.is_zero() {
                Decimal::ZERO
            } else {
                delta.abs() / last * Decimal::ONE_HUNDRED
            };
            if pct >= self.spike_threshold_pct {
                snapshot.spike = true;
                if delta > Decimal::ZERO {
                    snapshot.direction = OiDirection::Up;
                    snapshot.bias = Bias::Long;
                } else {
                    snapshot.direction = OiDirection::Down;
                    snapshot.bias = Bias::Short;
                }
                info!(oi = %current, delta = %delta, pct = %round_dp(pct, 2), "OI spike");
            }
        }

        self.last_oi = Some(current);
        snapshot
    }

    pub fn last_oi(&self) -> Option<Decimal> {
        self.last_oi
    }
}

impl Default for OiTracker {
    fn default() -> Self {
        Self::new(DEFAULT_OI_SPIKE_PCT)
    }
}

/// Derives liquidation dominance and spikes from successive fetches.
#[derive(Debug, Clone)]
pub struct LiquidationTracker {
    previous_total: Decimal,
    spike_multiplier: Decimal,
}

impl LiquidationTracker {
    pub fn new(spike_multiplier: Decimal) -> Self {
        Self {
            previous_total: Decimal::ZERO,
            spike_multiplier,
        }
    }

    /// Record fetched long/short liquidation volumes.
    pub fn observe(&mut self, longs: Decimal, shorts: Decimal) -> LiquidationSnapshot {
        let snapshot = LiquidationSnapshot::from_totals(
            longs,
            shorts,
            self.previous_total,
            self.spike_multiplier,
        );
        if snapshot.spike {
            debug!(
                total = %(longs + shorts),
                previous = %self.previous_total,
                dominant = ?snapshot.dominant,
                "Liquidation spike"
            );
        }
        self.previous_total = longs + shorts;
        snapshot
    }
}

impl Default for LiquidationTracker {
    fn default() -> Self {
        Self::new(DEFAULT_LIQUIDATION_SPIKE_MULTIPLIER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svp_core::{LiquidationSide, SentimentBadge};

    #[test]
    fn test_cell_defaults_to_neutral() {
        let cell = ReadingsCell::new();
        let readings = cell.snapshot();
        assert_eq!(readings.funding.average(), Decimal::ZERO);
        assert_eq!(readings.oi.bias, Bias::Neutral);
        assert!(readings.oi.oi.is_none());
        assert_eq!(readings.sentiment.badge, SentimentBadge::Flat);
    }

    #[test]
    fn test_cell_funding_fields_are_independent() {
        let cell = ReadingsCell::new();
        cell.set_bybit_funding(dec!(0.01));
        cell.set_binance_funding(dec!(0.03));
        cell.set_bybit_funding(dec!(0.02));

        let funding = cell.snapshot().funding;
        assert_eq!(funding.bybit_pct, dec!(0.02));
        assert_eq!(funding.binance_pct, dec!(0.03));
        assert_eq!(funding.average(), dec!(0.025));
    }

    #[test]
    fn test_oi_first_observation_has_no_delta() {
        let mut tracker = OiTracker::default();
        let snap = tracker.observe(dec!(1000));
        assert_eq!(snap.oi, Some(dec!(1000)));
        assert_eq!(snap.oi_delta, Decimal::ZERO);
        assert!(!snap.spike);
        assert_eq!(snap.direction, OiDirection::Flat);
    }

    #[test]
    fn test_oi_spike_at_threshold() {
        let mut tracker = OiTracker::default();
        tracker.observe(dec!(1000));

        // exactly 1% counts
        let snap = tracker.observe(dec!(1010));
        assert!(snap.spike);
        assert_eq!(snap.direction, OiDirection::Up);
        assert_eq!(snap.bias, Bias::Long);
        assert_eq!(snap.oi_delta, dec!(10));

        let snap = tracker.observe(dec!(990));
        assert!(snap.spike);
        assert_eq!(snap.direction, OiDirection::Down);
        assert_eq!(snap.bias, Bias::Short);
    }

    #[test]
    fn test_oi_small_move_is_flat() {
        let mut tracker = OiTracker::default();
        tracker.observe(dec!(1000));
        let snap = tracker.observe(dec!(1005));
        assert!(!snap.spike);
        assert_eq!(snap.direction, OiDirection::Flat);
        assert_eq!(snap.bias, Bias::Neutral);
        assert_eq!(snap.oi_delta, dec!(5));
        assert_eq!(tracker.last_oi(), Some(dec!(1005)));
    }

    #[test]
    fn test_liquidation_spike_uses_previous_fetch() {
        let mut tracker = LiquidationTracker::default();

        let first = tracker.observe(dec!(100), dec!(0));
        assert!(!first.spike);
        assert_eq!(first.dominant, LiquidationSide::Longs);

        let second = tracker.observe(dec!(100), dec!(100));
        assert!(second.spike);

        let third = tracker.observe(dec!(150), dec!(100));
        assert!(!third.spike);
    }
}
