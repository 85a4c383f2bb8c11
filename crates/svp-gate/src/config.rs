//! Gate configuration.

use crate::cooldown::{CooldownScope, DispatchPolicy};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use svp_detector::ConfluenceLabel;

/// Alert and persistence gating settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Stage A: identical signals within this window are clustered.
    #[serde(default = "default_buffer_window_secs")]
    pub buffer_window_secs: u64,
    /// Stage B: minimum time before the same signal alerts again.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Stage B: minimum confluence score to alert.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: u8,
    /// Stage B: labels allowed to alert.
    #[serde(default = "default_decisive_labels")]
    pub decisive_labels: Vec<ConfluenceLabel>,
    /// Width of a score bucket in fingerprints (1 = exact score).
    #[serde(default = "default_score_bucket_size")]
    pub score_bucket_size: u8,
    /// Minimum time between persisted snapshots.
    #[serde(default = "default_persist_cooldown_secs")]
    pub persist_cooldown_secs: u64,
    /// CVD quantum in persistence fingerprints. 0 drops CVD from the fingerprint.
    #[serde(default = "default_persist_fingerprint_cvd_bucket")]
    pub persist_fingerprint_cvd_bucket: Decimal,
}

fn default_buffer_window_secs() -> u64 {
    60
}

fn default_cooldown_secs() -> u64 {
    300
}

fn default_min_confidence() -> u8 {
    7
}

fn default_decisive_labels() -> Vec<ConfluenceLabel> {
    vec![ConfluenceLabel::SpotDominant, ConfluenceLabel::PerpDominant]
}

fn default_score_bucket_size() -> u8 {
    1
}

fn default_persist_cooldown_secs() -> u64 {
    300
}

fn default_persist_fingerprint_cvd_bucket() -> Decimal {
    Decimal::ONE_HUNDRED
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            buffer_window_secs: default_buffer_window_secs(),
            cooldown_secs: default_cooldown_secs(),
            min_confidence: default_min_confidence(),
            decisive_labels: default_decisive_labels(),
            score_bucket_size: default_score_bucket_size(),
            persist_cooldown_secs: default_persist_cooldown_secs(),
            persist_fingerprint_cvd_bucket: default_persist_fingerprint_cvd_bucket(),
        }
    }
}

impl GateConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.score_bucket_size == 0 {
            return Err("score_bucket_size must be > 0".to_string());
        }
        if self.min_confidence > 10 {
            return Err(format!(
                "min_confidence ({}) must be within 0..=10",
                self.min_confidence
            ));
        }
        if self.decisive_labels.is_empty() {
            return Err("decisive_labels must not be empty".to_string());
        }
        if self.persist_fingerprint_cvd_bucket.is_sign_negative() {
            return Err(format!(
                "persist_fingerprint_cvd_bucket ({}) must be non-negative",
                self.persist_fingerprint_cvd_bucket
            ));
        }
        Ok(())
    }

    /// Stage B policy for alerts.
    pub fn dispatch_policy(&self) -> DispatchPolicy {
        DispatchPolicy {
            require_meaningful: false,
            decisive_labels: Some(self.decisive_labels.clone()),
            min_confidence: self.min_confidence,
            cooldown_secs: self.cooldown_secs,
            scope: CooldownScope::SameFingerprint,
        }
    }

    /// Policy of the snapshot persistence gate: any label, any score,
    /// meaningful signals only. A snapshot needs a new fingerprint and an
    /// elapsed cooldown.
    pub fn persist_policy(&self) -> DispatchPolicy {
        DispatchPolicy {
            require_meaningful: true,
            decisive_labels: None,
            min_confidence: 0,
            cooldown_secs: self.persist_cooldown_secs,
            scope: CooldownScope::Global,
        }
    }
}
