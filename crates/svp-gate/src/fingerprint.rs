//! Signal identity for deduplication.
//!
//! A fingerprint is a tuple of discrete classification fields. Continuous
//! values only enter after quantisation to a coarse bucket.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use svp_detector::{ConfluenceLabel, SignalKind};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Identity of a signal instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalFingerprint {
    pub kind: SignalKind,
    /// `score / score_bucket_size`
    pub score_bucket: u8,
    pub label: ConfluenceLabel,
    /// Quantised CVD values, when the gate tracks them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvd_buckets: Option<Vec<i64>>,
}

impl SignalFingerprint {
    /// Classification-only fingerprint.
    pub fn classify(kind: SignalKind, score: u8, label: ConfluenceLabel, bucket_size: u8) -> Self {
        Self {
            kind,
            score_bucket: score / bucket_size.max(1),
            label,
            cvd_buckets: None,
        }
    }

    /// Extend with CVD values floored to multiples of `bucket`.
    ///
    /// A zero bucket leaves the fingerprint unchanged.
    pub fn with_cvd(mut self, values: &[Decimal], bucket: Decimal) -> Self {
        if bucket.is_zero() {
            return self;
        }
        self.cvd_buckets = Some(
            values
                .iter()
                .map(|v| (*v / bucket).floor().to_i64().unwrap_or(i64::MAX))
                .collect(),
        );
        self
    }

    /// Stable 64-bit FNV-1a digest rendered as hex, for logs.
    pub fn digest(&self) -> String {
        let mut hash = FNV_OFFSET;
        for byte in self.to_string().bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        format!("{hash:016x}")
    }
}

impl fmt::Display for SignalFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.kind, self.score_bucket, self.label)?;
        if let Some(buckets) = &self.cvd_buckets {
            for b in buckets {
                write!(f, "|{b}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_score_bucketing() {
        let a = SignalFingerprint::classify(SignalKind::BullTrap, 7, ConfluenceLabel::PerpDominant, 2);
        let b = SignalFingerprint::classify(SignalKind::BullTrap, 6, ConfluenceLabel::PerpDominant, 2);
        let c = SignalFingerprint::classify(SignalKind::BullTrap, 8, ConfluenceLabel::PerpDominant, 2);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.score_bucket, 3);
    }

    #[test]
    fn test_cvd_jitter_within_bucket_is_same() {
        let base = SignalFingerprint::classify(SignalKind::PerpLedPump, 8, ConfluenceLabel::PerpDominant, 1);
        let a = base.clone().with_cvd(&[dec!(1201.5), dec!(-40)], dec!(100));
        let b = base.clone().with_cvd(&[dec!(1299.9), dec!(-1)], dec!(100));
        let c = base.clone().with_cvd(&[dec!(1300), dec!(-40)], dec!(100));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.cvd_buckets, Some(vec![12, -1]));
        assert_eq!(base.clone().with_cvd(&[dec!(5)], Decimal::ZERO), base);
    }

    #[test]
    fn test_digest_is_stable() {
        let fp = SignalFingerprint::classify(SignalKind::NoClearBias, 0, ConfluenceLabel::Neutral, 1);
        assert_eq!(fp.digest(), fp.clone().digest());
        assert_eq!(fp.digest().len(), 16);
        assert_eq!(fp.to_string(), "no_clear_bias|0|neutral");

        let other = SignalFingerprint::classify(SignalKind::NoClearBias, 1, ConfluenceLabel::Neutral, 1);
        assert_ne!(fp.digest(), other.digest());
    }
}
