//! Bounded rolling series and net-delta spike detection.

use crate::config::SpikeConfig;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Fixed-capacity FIFO of timestamped samples.
///
/// Pushing past capacity evicts the oldest sample.
#[derive(Debug, Clone)]
pub struct RollingSeries {
    capacity: usize,
    samples: VecDeque<(i64, Decimal)>,
}

impl RollingSeries {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, timestamp_ms: i64, value: Decimal) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((timestamp_ms, value));
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples strictly younger than `window_ms` at `now_ms`.
    pub fn within(&self, now_ms: i64, window_ms: i64) -> impl Iterator<Item = &(i64, Decimal)> {
        self.samples
            .iter()
            .filter(move |(t, _)| now_ms - t < window_ms)
    }
}

/// Result of a spike check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpikeReport {
    pub spike: bool,
    /// Sum of the samples inside the window.
    pub net_delta: Decimal,
    pub sample_count: usize,
    /// Seconds since the last spike (since epoch 0 before the first one).
    pub seconds_since_last_spike: f64,
}

/// Flags a burst when the net of recent samples exceeds a threshold.
#[derive(Debug, Clone)]
pub struct SpikeDetector {
    window_ms: i64,
    threshold: Decimal,
    series: RollingSeries,
    last_spike_ms: i64,
}

impl SpikeDetector {
    pub fn new(config: &SpikeConfig) -> Self {
        Self {
            window_ms: (config.window_secs as i64).saturating_mul(1000),
            threshold: config.threshold,
            series: RollingSeries::new(config.capacity),
            last_spike_ms: 0,
        }
    }

    /// Append a sample at the current wall-clock time.
    pub fn add(&mut self, value: Decimal) {
        self.add_at(value, Utc::now().timestamp_millis());
    }

    pub fn add_at(&mut self, value: Decimal, now_ms: i64) {
        self.series.push(now_ms, value);
    }

    /// Check the window ending at the current wall-clock time.
    pub fn check(&mut self) -> SpikeReport {
        self.check_at(Utc::now().timestamp_millis())
    }

    /// Check the window ending at `now_ms`.
    ///
    /// A spike is `|net_delta| > threshold`; it stamps `last_spike_ms`.
    pub fn check_at(&mut self, now_ms: i64) -> SpikeReport {
        let (net_delta, sample_count) = self
            .series
            .within(now_ms, self.window_ms)
            .fold((Decimal::ZERO, 0usize), |(sum, n), (_, v)| (sum + v, n + 1));

        let spike = net_delta.abs() > self.threshold;
        if spike {
            self.last_spike_ms = now_ms;
            debug!(net_delta = %net_delta, samples = sample_count, "Delta spike");
        }

        SpikeReport {
            spike,
            net_delta,
            sample_count,
            seconds_since_last_spike: (now_ms - self.last_spike_ms) as f64 / 1000.0,
        }
    }

    pub fn last_spike_ms(&self) -> i64 {
        self.last_spike_ms
    }

    pub fn series(&self) -> &RollingSeries {
        &self.series
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn detector() -> SpikeDetector {
        SpikeDetector::new(&SpikeConfig::default())
    }

    #[test]
    fn test_series_evicts_oldest() {
        let mut series = RollingSeries::new(3);
        for i in 0..5 {
            series.push(i, Decimal::from(i));
        }
        assert_eq!(series.len(), 3);
        let values: Vec<Decimal> = series.within(4, 1000).map(|(_, v)| *v).collect();
        assert_eq!(values, vec![dec!(2), dec!(3), dec!(4)]);
    }

    #[test]
    fn test_all_zero_samples_never_spike() {
        let mut det = detector();
        for i in 0..200 {
            det.add_at(Decimal::ZERO, i * 100);
        }
        let report = det.check_at(20_000);
        assert!(!report.spike);
        assert_eq!(report.net_delta, Decimal::ZERO);
        assert_eq!(det.series().len(), 100);
    }

    #[test]
    fn test_spike_resets_since_last() {
        let mut det = detector();
        det.add_at(dec!(600), 1_000_000);
        det.add_at(dec!(500), 1_001_000);

        let report = det.check_at(1_002_000);
        assert!(report.spike);
        assert_eq!(report.net_delta, dec!(1100));
        assert_eq!(report.sample_count, 2);
        assert_eq!(report.seconds_since_last_spike, 0.0);

        // next check with no new samples
        let next = det.check_at(1_002_000);
        assert!(next.seconds_since_last_spike.abs() < 1e-9);

        let later = det.check_at(1_012_000);
        assert!(later.spike);
        assert_eq!(det.last_spike_ms(), 1_012_000);

        // both samples aged out: no spike, clock runs from the last one
        let quiet = det.check_at(1_032_000);
        assert!(!quiet.spike);
        assert_eq!(quiet.sample_count, 0);
        assert_eq!(quiet.seconds_since_last_spike, 20.0);
    }

    #[test]
    fn test_net_delta_inside_window() {
        let mut det = detector();
        det.add_at(dec!(400), 100_000);
        det.add_at(dec!(-200), 110_000);
        det.add_at(dec!(1000), 120_000);

        let report = det.check_at(125_000);
        assert!(report.spike);
        assert_eq!(report.net_delta, dec!(1200));
        assert_eq!(report.sample_count, 3);
    }

    #[test]
    fn test_window_is_exclusive() {
        let mut det = detector();
        det.add_at(dec!(2000), 0);

        // 30s old sample is outside the window
        let report = det.check_at(30_000);
        assert_eq!(report.sample_count, 0);
        assert!(!report.spike);

        let report = det.check_at(29_999);
        assert_eq!(report.sample_count, 1);
        assert!(report.spike);
    }

    #[test]
    fn test_negative_burst_spikes() {
        let mut det = detector();
        det.add_at(dec!(-1500), 10_000);
        assert!(det.check_at(10_500).spike);
    }

    #[test]
    fn test_since_last_measured_from_epoch_before_first_spike() {
        let mut det = detector();
        det.add_at(dec!(1), 5_000);
        let report = det.check_at(5_000);
        assert!(!report.spike);
        assert_eq!(report.seconds_since_last_spike, 5.0);
    }
}
