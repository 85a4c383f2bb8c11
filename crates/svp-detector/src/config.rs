//! Detector configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// One tracking horizon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horizon {
    /// Label used as the key in delta maps (e.g. "15m").
    pub label: String,
    /// Baseline rotation period in seconds.
    pub duration_secs: u64,
}

impl Horizon {
    pub fn new(label: impl Into<String>, duration_secs: u64) -> Self {
        Self {
            label: label.into(),
            duration_secs,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        (self.duration_secs as i64).saturating_mul(1000)
    }
}

/// Spike detector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpikeConfig {
    /// Samples kept in the rolling series.
    #[serde(default = "default_spike_capacity")]
    pub capacity: usize,
    /// Look-back window in seconds.
    #[serde(default = "default_spike_window_secs")]
    pub window_secs: u64,
    /// Absolute net delta above which a spike is reported.
    #[serde(default = "default_spike_threshold")]
    pub threshold: Decimal,
}

fn default_spike_capacity() -> usize {
    100
}

fn default_spike_window_secs() -> u64 {
    30
}

fn default_spike_threshold() -> Decimal {
    Decimal::from(1000)
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            capacity: default_spike_capacity(),
            window_secs: default_spike_window_secs(),
            threshold: default_spike_threshold(),
        }
    }
}

/// Configuration for timeframe tracking, scoring and signal rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default)]
    pub spike: SpikeConfig,
    /// Horizons in report order.
    #[serde(default = "default_horizons")]
    pub horizons: Vec<Horizon>,
    /// Vote weight per horizon label. Unlisted horizons weigh 1.
    #[serde(default = "default_horizon_weights")]
    pub horizon_weights: BTreeMap<String, u32>,
    /// Minimum score for a `*_dominant` label.
    #[serde(default = "default_high_score")]
    pub high_score: u8,
    /// Spot/perp percent difference below which a horizon votes neutral.
    #[serde(default = "default_min_divergence_pct")]
    pub min_divergence_pct: Decimal,
    /// Average funding (percent) below which spot buying reads as a squeeze.
    #[serde(default = "default_squeeze_funding_pct")]
    pub squeeze_funding_pct: Decimal,
}

fn default_horizons() -> Vec<Horizon> {
    vec![
        Horizon::new("5m", 5 * 60),
        Horizon::new("15m", 15 * 60),
        Horizon::new("1h", 60 * 60),
    ]
}

fn default_horizon_weights() -> BTreeMap<String, u32> {
    BTreeMap::from([
        ("5m".to_string(), 1),
        ("15m".to_string(), 2),
        ("1h".to_string(), 3),
    ])
}

fn default_high_score() -> u8 {
    6
}

fn default_min_divergence_pct() -> Decimal {
    Decimal::new(5, 1) // 0.5%
}

fn default_squeeze_funding_pct() -> Decimal {
    Decimal::new(-1, 2) // -0.01%
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            spike: SpikeConfig::default(),
            horizons: default_horizons(),
            horizon_weights: default_horizon_weights(),
            high_score: default_high_score(),
            min_divergence_pct: default_min_divergence_pct(),
            squeeze_funding_pct: default_squeeze_funding_pct(),
        }
    }
}

impl DetectorConfig {
    /// Validate configuration values.
    ///
    /// Returns Err if:
    /// - no horizons, duplicate labels or a zero duration
    /// - a zero horizon weight
    /// - high_score outside 1..=10
    /// - negative divergence or non-positive spike settings
    pub fn validate(&self) -> Result<(), String> {
        if self.horizons.is_empty() {
            return Err("at least one horizon is required".to_string());
        }

        let mut seen = HashSet::new();
        for horizon in &self.horizons {
            if !seen.insert(horizon.label.as_str()) {
                return Err(format!("duplicate horizon label ({})", horizon.label));
            }
            if horizon.duration_secs == 0 {
                return Err(format!("horizon {} duration must be > 0", horizon.label));
            }
        }

        if let Some((label, _)) = self.horizon_weights.iter().find(|(_, w)| **w == 0) {
            return Err(format!("horizon weight for {label} must be > 0"));
        }

        if self.high_score == 0 || self.high_score > 10 {
            return Err(format!(
                "high_score ({}) must be within 1..=10",
                self.high_score
            ));
        }

        if self.min_divergence_pct.is_sign_negative() {
            return Err(format!(
                "min_divergence_pct ({}) must be non-negative",
                self.min_divergence_pct
            ));
        }

        if self.spike.capacity == 0 || self.spike.window_secs == 0 {
            return Err("spike capacity and window_secs must be > 0".to_string());
        }
        if self.spike.threshold.is_sign_negative() {
            return Err(format!(
                "spike threshold ({}) must be non-negative",
                self.spike.threshold
            ));
        }

        Ok(())
    }

    /// Vote weight of a horizon label.
    pub fn weight_of(&self, label: &str) -> u32 {
        self.horizon_weights.get(label).copied().unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config() {
        let config = DetectorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.horizons.len(), 3);
        assert_eq!(config.weight_of("5m"), 1);
        assert_eq!(config.weight_of("1h"), 3);
        assert_eq!(config.weight_of("4h"), 1);
        assert_eq!(config.spike.threshold, dec!(1000));
        assert_eq!(config.squeeze_funding_pct, dec!(-0.01));
    }

    #[test]
    fn test_validate_rejects_duplicate_horizon() {
        let mut config = DetectorConfig::default();
        config.horizons.push(Horizon::new("5m", 600));
        assert!(config.validate().unwrap_err().contains("duplicate"));
    }

    #[test]
    fn test_validate_rejects_bad_high_score() {
        let config = DetectorConfig {
            high_score: 11,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_weight() {
        let mut config = DetectorConfig::default();
        config.horizon_weights.insert("15m".to_string(), 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial_toml() {
        let config: DetectorConfig = toml::from_str(
            r#"
            high_score = 7

            [spike]
            threshold = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.high_score, 7);
        assert_eq!(config.spike.threshold, dec!(500));
        assert_eq!(config.spike.window_secs, 30);
        assert_eq!(config.horizons.len(), 3);
    }
}
