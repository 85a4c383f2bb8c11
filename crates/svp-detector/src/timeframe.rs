//! Multi-horizon baseline memory.
//!
//! For every (metric, horizon) pair a single baseline is kept and replaced
//! once it is older than the horizon. Percent change is measured from that
//! baseline to the latest value, so memory stays bounded by
//! `metrics × horizons` regardless of tick rate.

use crate::config::Horizon;
use rust_decimal::Decimal;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use svp_core::round_dp;
use tracing::debug;

/// Tracked order-flow metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricId {
    /// Coinbase spot CVD.
    CbCvd,
    /// Binance spot CVD.
    BinSpot,
    /// Binance perp CVD.
    BinPerp,
}

impl MetricId {
    pub const ALL: [MetricId; 3] = [MetricId::CbCvd, MetricId::BinSpot, MetricId::BinPerp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CbCvd => "cb_cvd",
            Self::BinSpot => "bin_spot",
            Self::BinPerp => "bin_perp",
        }
    }

    pub fn is_spot(&self) -> bool {
        matches!(self, Self::CbCvd | Self::BinSpot)
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Baseline of one (metric, horizon) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeframeSnapshot {
    pub horizon: String,
    pub baseline: Decimal,
    pub baseline_ts_ms: i64,
}

/// Percent change of one horizon, per metric.
pub type HorizonDeltas = BTreeMap<MetricId, Decimal>;

/// Percent changes of every horizon, in configured horizon order.
///
/// Serialized as a JSON object keyed by horizon label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeframeDeltas {
    horizons: Vec<(String, HorizonDeltas)>,
}

impl TimeframeDeltas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace one horizon's deltas, keeping first-insert order.
    pub fn insert(&mut self, label: impl Into<String>, deltas: HorizonDeltas) {
        let label = label.into();
        match self.horizons.iter_mut().find(|(l, _)| *l == label) {
            Some((_, existing)) => *existing = deltas,
            None => self.horizons.push((label, deltas)),
        }
    }

    pub fn get(&self, label: &str) -> Option<&HorizonDeltas> {
        self.horizons
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, d)| d)
    }

    /// Delta of one metric in one horizon, if present.
    pub fn value(&self, label: &str, metric: MetricId) -> Option<Decimal> {
        self.get(label).and_then(|d| d.get(&metric).copied())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HorizonDeltas)> {
        self.horizons.iter().map(|(l, d)| (l.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.horizons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.horizons.is_empty()
    }
}

impl Serialize for TimeframeDeltas {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.horizons.len()))?;
        for (label, deltas) in &self.horizons {
            map.serialize_entry(label, deltas)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TimeframeDeltas {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DeltasVisitor;

        impl<'de> Visitor<'de> for DeltasVisitor {
            type Value = TimeframeDeltas;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of horizon label to metric deltas")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut deltas = TimeframeDeltas::new();
                while let Some((label, values)) = access.next_entry::<String, HorizonDeltas>()? {
                    deltas.insert(label, values);
                }
                Ok(deltas)
            }
        }

        deserializer.deserialize_map(DeltasVisitor)
    }
}

/// `(current − baseline) / |baseline| × 100`, 2 dp; 0 for a zero baseline.
pub fn percent_change(current: Decimal, baseline: Decimal) -> Decimal {
    if baseline.is_zero() {
        return Decimal::ZERO;
    }
    round_dp(
        (current - baseline) / baseline.abs() * Decimal::ONE_HUNDRED,
        2,
    )
}

/// Rolling baselines for every tracked metric and horizon.
#[derive(Debug, Clone)]
pub struct MultiTimeframeMemory {
    horizons: Vec<Horizon>,
    snapshots: HashMap<(MetricId, usize), TimeframeSnapshot>,
    current: BTreeMap<MetricId, Decimal>,
}

impl MultiTimeframeMemory {
    pub fn new(horizons: Vec<Horizon>) -> Self {
        Self {
            horizons,
            snapshots: HashMap::new(),
            current: BTreeMap::new(),
        }
    }

    pub fn horizons(&self) -> &[Horizon] {
        &self.horizons
    }

    /// Record the latest values.
    ///
    /// A pair without a baseline takes the current value as its baseline.
    /// A baseline whose age reaches the horizon duration is rotated to the
    /// current value.
    pub fn update(&mut self, values: &BTreeMap<MetricId, Decimal>, now_ms: i64) {
        for (&metric, &value) in values {
            for (idx, horizon) in self.horizons.iter().enumerate() {
                match self.snapshots.get_mut(&(metric, idx)) {
                    None => {
                        self.snapshots.insert(
                            (metric, idx),
                            TimeframeSnapshot {
                                horizon: horizon.label.clone(),
                                baseline: value,
                                baseline_ts_ms: now_ms,
                            },
                        );
                    }
                    Some(snap) if now_ms - snap.baseline_ts_ms >= horizon.duration_ms() => {
                        debug!(
                            metric = %metric,
                            horizon = %horizon.label,
                            old = %snap.baseline,
                            new = %value,
                            "Baseline rotated"
                        );
                        snap.baseline = value;
                        snap.baseline_ts_ms = now_ms;
                    }
                    Some(_) => {}
                }
            }
            self.current.insert(metric, value);
        }
    }

    /// Percent change of every metric over every horizon.
    ///
    /// Metrics never observed read 0.
    pub fn get_all_deltas(&self) -> TimeframeDeltas {
        let mut all = TimeframeDeltas::new();
        for (idx, horizon) in self.horizons.iter().enumerate() {
            let deltas: HorizonDeltas = MetricId::ALL
                .iter()
                .map(|&metric| {
                    let pct = match (self.snapshots.get(&(metric, idx)), self.current.get(&metric)) {
                        (Some(snap), Some(&current)) => percent_change(current, snap.baseline),
                        _ => Decimal::ZERO,
                    };
                    (metric, pct)
                })
                .collect();
            all.insert(horizon.label.clone(), deltas);
        }
        all
    }

    pub fn snapshot(&self, metric: MetricId, horizon: &str) -> Option<&TimeframeSnapshot> {
        let idx = self.horizons.iter().position(|h| h.label == horizon)?;
        self.snapshots.get(&(metric, idx))
    }
}
