//! Stage B: cooldown dispatch.
//!
//! Only decisive, confident signals go out, and a signal is not repeated
//! within the cooldown. State is committed when the decision is made, so a
//! failed delivery still starts the cooldown.

use crate::fingerprint::SignalFingerprint;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use svp_detector::ConfluenceLabel;
use tracing::debug;

/// What the cooldown window applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownScope {
    /// Only a repeat of the last dispatched fingerprint waits out the
    /// cooldown; a different fingerprint goes straight through.
    SameFingerprint,
    /// Every dispatch waits out the cooldown, and the last fingerprint is
    /// never accepted twice in a row.
    Global,
}

/// Acceptance rules of a dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchPolicy {
    /// Reject signals without a meaningful kind.
    pub require_meaningful: bool,
    /// Labels allowed through; `None` accepts any.
    pub decisive_labels: Option<Vec<ConfluenceLabel>>,
    pub min_confidence: u8,
    pub cooldown_secs: u64,
    pub scope: CooldownScope,
}

/// Why a signal was not dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    NotMeaningful,
    NotDecisive,
    LowConfidence,
    Duplicate,
    Cooldown,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotMeaningful => "not_meaningful",
            Self::NotDecisive => "not_decisive",
            Self::LowConfidence => "low_confidence",
            Self::Duplicate => "duplicate",
            Self::Cooldown => "cooldown",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage B outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchDecision {
    Dispatch,
    Skip(SkipReason),
}

impl DispatchDecision {
    pub fn is_dispatch(&self) -> bool {
        matches!(self, Self::Dispatch)
    }
}

/// Cooldown-gated dispatcher.
#[derive(Debug, Clone)]
pub struct CooldownDispatcher {
    policy: DispatchPolicy,
    last_fingerprint: Option<SignalFingerprint>,
    last_dispatch_ms: Option<i64>,
}

impl CooldownDispatcher {
    pub fn new(policy: DispatchPolicy) -> Self {
        Self {
            policy,
            last_fingerprint: None,
            last_dispatch_ms: None,
        }
    }

    pub fn evaluate(&mut self, fingerprint: &SignalFingerprint, score: u8) -> DispatchDecision {
        self.evaluate_at(fingerprint, score, Utc::now().timestamp_millis())
    }

    /// Decide at `now_ms`. Checks run in order: meaningful, decisive label,
    /// confidence, then the cooldown for the policy's scope. The cooldown
    /// has passed once strictly more than `cooldown_secs` elapsed.
    pub fn evaluate_at(
        &mut self,
        fingerprint: &SignalFingerprint,
        score: u8,
        now_ms: i64,
    ) -> DispatchDecision {
        let decision = self.check(fingerprint, score, now_ms);
        match decision {
            DispatchDecision::Dispatch => {
                self.last_fingerprint = Some(fingerprint.clone());
                self.last_dispatch_ms = Some(now_ms);
                debug!(fingerprint = %fingerprint.digest(), score, "Dispatch accepted");
            }
            DispatchDecision::Skip(reason) => {
                debug!(fingerprint = %fingerprint.digest(), score, %reason, "Dispatch skipped");
            }
        }
        decision
    }

    fn check(&self, fingerprint: &SignalFingerprint, score: u8, now_ms: i64) -> DispatchDecision {
        if self.policy.require_meaningful && !fingerprint.kind.is_meaningful() {
            return DispatchDecision::Skip(SkipReason::NotMeaningful);
        }
        if let Some(labels) = &self.policy.decisive_labels {
            if !labels.contains(&fingerprint.label) {
                return DispatchDecision::Skip(SkipReason::NotDecisive);
            }
        }
        if score < self.policy.min_confidence {
            return DispatchDecision::Skip(SkipReason::LowConfidence);
        }

        let repeat = self.last_fingerprint.as_ref() == Some(fingerprint);
        let cooling = self.last_dispatch_ms.is_some_and(|last| {
            now_ms - last <= (self.policy.cooldown_secs as i64).saturating_mul(1000)
        });
        match self.policy.scope {
            CooldownScope::SameFingerprint if repeat && cooling => {
                DispatchDecision::Skip(SkipReason::Cooldown)
            }
            CooldownScope::Global if repeat => DispatchDecision::Skip(SkipReason::Duplicate),
            CooldownScope::Global if cooling => DispatchDecision::Skip(SkipReason::Cooldown),
            _ => DispatchDecision::Dispatch,
        }
    }

    pub fn last_dispatch_ms(&self) -> Option<i64> {
        self.last_dispatch_ms
    }

    pub fn last_fingerprint(&self) -> Option<&SignalFingerprint> {
        self.last_fingerprint.as_ref()
    }
}
