//! Stage A: burst clustering.
//!
//! An unchanged signal repeats at tick cadence. The buffer lets the first
//! instance of a group through and absorbs repeats until the fingerprint
//! changes or the buffer window elapses.

use crate::fingerprint::SignalFingerprint;
use chrono::Utc;
use serde::Serialize;
use svp_detector::{ConfluenceLabel, SignalKind};
use tracing::debug;

/// Stage A outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterDecision {
    /// First of a new group.
    Send,
    /// Repeat of the active group.
    Suppress,
}

impl ClusterDecision {
    pub fn is_send(&self) -> bool {
        matches!(self, Self::Send)
    }
}

/// Snapshot of the active group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterInfo {
    /// Signals seen in the active group, the sent one included.
    pub duplicates: u32,
    pub last_sent_ms: Option<i64>,
    pub fingerprint: Option<SignalFingerprint>,
}

/// Burst-clustering buffer.
#[derive(Debug, Clone)]
pub struct ClusterBuffer {
    window_ms: i64,
    score_bucket_size: u8,
    fingerprint: Option<SignalFingerprint>,
    last_sent_ms: Option<i64>,
    suppressed: u32,
}

impl ClusterBuffer {
    pub fn new(window_secs: u64, score_bucket_size: u8) -> Self {
        Self {
            window_ms: (window_secs as i64).saturating_mul(1000),
            score_bucket_size,
            fingerprint: None,
            last_sent_ms: None,
            suppressed: 0,
        }
    }

    pub fn should_send(
        &mut self,
        kind: SignalKind,
        score: u8,
        label: ConfluenceLabel,
    ) -> ClusterDecision {
        self.should_send_at(kind, score, label, Utc::now().timestamp_millis())
    }

    /// Decide at `now_ms`.
    ///
    /// A new fingerprint or a group older than the window (strictly) starts a
    /// new group and sends; anything else is suppressed.
    pub fn should_send_at(
        &mut self,
        kind: SignalKind,
        score: u8,
        label: ConfluenceLabel,
        now_ms: i64,
    ) -> ClusterDecision {
        let fingerprint = SignalFingerprint::classify(kind, score, label, self.score_bucket_size);

        let is_new = self.fingerprint.as_ref() != Some(&fingerprint);
        let expired = self
            .last_sent_ms
            .map_or(true, |last| now_ms - last > self.window_ms);

        if is_new || expired {
            debug!(
                fingerprint = %fingerprint.digest(),
                previous_group = self.suppressed,
                "Cluster group started"
            );
            self.fingerprint = Some(fingerprint);
            self.last_sent_ms = Some(now_ms);
            self.suppressed = 1;
            return ClusterDecision::Send;
        }

        self.suppressed += 1;
        ClusterDecision::Suppress
    }

    pub fn info(&self) -> ClusterInfo {
        ClusterInfo {
            duplicates: self.suppressed,
            last_sent_ms: self.last_sent_ms,
            fingerprint: self.fingerprint.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    fn buffer() -> ClusterBuffer {
        ClusterBuffer::new(60, 1)
    }

    #[test]
    fn test_first_signal_sends() {
        let mut buf = buffer();
        let decision =
            buf.should_send_at(SignalKind::BullTrap, 8, ConfluenceLabel::PerpDominant, T0);
        assert_eq!(decision, ClusterDecision::Send);

        let info = buf.info();
        assert_eq!(info.duplicates, 1);
        assert_eq!(info.last_sent_ms, Some(T0));
        assert_eq!(info.fingerprint.unwrap().kind, SignalKind::BullTrap);
    }

    #[test]
    fn test_repeat_within_window_is_suppressed() {
        let mut buf = buffer();
        buf.should_send_at(SignalKind::BullTrap, 8, ConfluenceLabel::PerpDominant, T0);
        let decision = buf.should_send_at(
            SignalKind::BullTrap,
            8,
            ConfluenceLabel::PerpDominant,
            T0 + 10_000,
        );

        assert_eq!(decision, ClusterDecision::Suppress);
        assert_eq!(buf.info().duplicates, 2);
        assert_eq!(buf.info().last_sent_ms, Some(T0));
    }

    #[test]
    fn test_changed_signal_sends_immediately() {
        let mut buf = buffer();
        buf.should_send_at(SignalKind::BullTrap, 8, ConfluenceLabel::PerpDominant, T0);
        buf.should_send_at(SignalKind::BullTrap, 8, ConfluenceLabel::PerpDominant, T0 + 1_000);

        let decision =
            buf.should_send_at(SignalKind::BullTrap, 9, ConfluenceLabel::PerpDominant, T0 + 2_000);
        assert!(decision.is_send());
        assert_eq!(buf.info().duplicates, 1);
    }

    #[test]
    fn test_window_boundary_is_strict() {
        let mut buf = buffer();
        buf.should_send_at(SignalKind::OkxAsiaDump, 5, ConfluenceLabel::Mixed, T0);

        let at_window =
            buf.should_send_at(SignalKind::OkxAsiaDump, 5, ConfluenceLabel::Mixed, T0 + 60_000);
        assert_eq!(at_window, ClusterDecision::Suppress);

        let past_window =
            buf.should_send_at(SignalKind::OkxAsiaDump, 5, ConfluenceLabel::Mixed, T0 + 60_001);
        assert_eq!(past_window, ClusterDecision::Send);
        assert_eq!(buf.info().last_sent_ms, Some(T0 + 60_001));
    }

    #[test]
    fn test_tick_cadence_burst() {
        let mut buf = buffer();
        let sends = (0..12)
            .filter(|i| {
                buf.should_send_at(
                    SignalKind::PerpLedPump,
                    7,
                    ConfluenceLabel::PerpDominant,
                    T0 + i * 5_000,
                )
                .is_send()
            })
            .count();
        assert_eq!(sends, 1);
        assert_eq!(buf.info().duplicates, 12);
    }
}
