//! Prometheus metrics for the confluence monitor.
//!
//! Covers:
//! - Trade ingestion and feed failures
//! - Per-market CVD
//! - Tick loop health
//! - Signal selection and confluence score
//! - Alert gating (cluster suppression, dispatch, skips)
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means duplicate metric names, which is a startup-time programming error.
//! These panics only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram,
    register_int_counter, CounterVec, Gauge, GaugeVec, Histogram, IntCounter,
};

/// Trades applied to accumulators.
/// Labels: market (e.g. "binance:perp")
pub static TRADES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "svp_trades_total",
        "Total trades applied to CVD accumulators",
        &["market"]
    )
    .unwrap()
});

/// Feed failures (stream errors, dropped frames, failed REST fetches).
pub static FEED_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "svp_feed_errors_total",
        "Total feed errors by source",
        &["source"]
    )
    .unwrap()
});

/// Latest rounded CVD per market.
pub static CVD: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!("svp_cvd", "Cumulative volume delta per market", &["market"]).unwrap()
});

/// Orchestrator ticks completed.
pub static TICKS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("svp_ticks_total", "Total orchestrator ticks processed").unwrap()
});

/// Orchestrator ticks that returned an error.
pub static TICK_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("svp_tick_failures_total", "Total failed orchestrator ticks").unwrap()
});

/// Tick duration in milliseconds.
pub static TICK_DURATION_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "svp_tick_duration_ms",
        "Orchestrator tick duration in milliseconds",
        vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 50.0, 100.0, 500.0]
    )
    .unwrap()
});

/// Signals selected per tick.
/// Labels: kind
pub static SIGNALS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "svp_signals_total",
        "Total signals selected by kind",
        &["kind"]
    )
    .unwrap()
});

/// Latest confluence score (0..=10).
pub static CONFLUENCE_SCORE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("svp_confluence_score", "Latest confluence score").unwrap()
});

/// Alerts absorbed by the cluster buffer.
pub static CLUSTER_SUPPRESSED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "svp_cluster_suppressed_total",
        "Total signals suppressed by the cluster buffer"
    )
    .unwrap()
});

/// Alerts dispatched.
/// Labels: mode (live/test), outcome (delivered/failed)
pub static DISPATCHES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "svp_dispatches_total",
        "Total alerts dispatched",
        &["mode", "outcome"]
    )
    .unwrap()
});

/// Dispatch rejections.
/// Labels: reason (not_decisive/low_confidence/duplicate/cooldown)
pub static DISPATCH_SKIPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "svp_dispatch_skipped_total",
        "Total dispatch rejections by reason",
        &["reason"]
    )
    .unwrap()
});

/// Snapshots appended to the store.
pub static SNAPSHOTS_PERSISTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "svp_snapshots_persisted_total",
        "Total snapshots appended to the store"
    )
    .unwrap()
});

/// Snapshot appends that failed to reach the file.
pub static SNAPSHOT_WRITE_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "svp_snapshot_write_failures_total",
        "Total failed snapshot writes"
    )
    .unwrap()
});

/// Loop counters at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSummary {
    pub ticks: u64,
    pub tick_failures: u64,
    pub cluster_suppressed: u64,
    pub snapshots_persisted: u64,
    pub snapshot_write_failures: u64,
}

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    // =========================================================================
    // Feed
    // =========================================================================

    /// Record trades applied for a market.
    pub fn trades_ingested(market: &str, count: u64) {
        TRADES_TOTAL
            .with_label_values(&[market])
            .inc_by(count as f64);
    }

    /// Record a feed failure.
    pub fn feed_error(source: &str) {
        FEED_ERRORS_TOTAL.with_label_values(&[source]).inc();
    }

    /// Update the CVD gauge of a market.
    pub fn cvd(market: &str, value: f64) {
        CVD.with_label_values(&[market]).set(value);
    }

    // =========================================================================
    // Tick loop
    // =========================================================================

    pub fn tick_processed(duration_ms: f64) {
        TICKS_TOTAL.inc();
        TICK_DURATION_MS.observe(duration_ms);
    }

    pub fn tick_failed() {
        TICK_FAILURES_TOTAL.inc();
    }

    // =========================================================================
    // Signals and gating
    // =========================================================================

    pub fn signal_selected(kind: &str) {
        SIGNALS_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn confluence_score(score: u8) {
        CONFLUENCE_SCORE.set(f64::from(score));
    }

    pub fn cluster_suppressed() {
        CLUSTER_SUPPRESSED_TOTAL.inc();
    }

    /// Record a dispatched alert and whether the sink accepted it.
    pub fn dispatched(test_mode: bool, delivered: bool) {
        let mode = if test_mode { "test" } else { "live" };
        let outcome = if delivered { "delivered" } else { "failed" };
        DISPATCHES_TOTAL.with_label_values(&[mode, outcome]).inc();
    }

    pub fn dispatch_skipped(reason: &str) {
        DISPATCH_SKIPPED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn snapshot_persisted() {
        SNAPSHOTS_PERSISTED_TOTAL.inc();
    }

    pub fn snapshot_write_failed() {
        SNAPSHOT_WRITE_FAILURES_TOTAL.inc();
    }

    /// Current loop counters, for the periodic stats log.
    pub fn summary() -> MetricsSummary {
        MetricsSummary {
            ticks: TICKS_TOTAL.get(),
            tick_failures: TICK_FAILURES_TOTAL.get(),
            cluster_suppressed: CLUSTER_SUPPRESSED_TOTAL.get(),
            snapshots_persisted: SNAPSHOTS_PERSISTED_TOTAL.get(),
            snapshot_write_failures: SNAPSHOT_WRITE_FAILURES_TOTAL.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let before = TRADES_TOTAL.with_label_values(&["test:spot"]).get();
        Metrics::trades_ingested("test:spot", 3);
        Metrics::trades_ingested("test:spot", 2);
        let after = TRADES_TOTAL.with_label_values(&["test:spot"]).get();
        assert_eq!(after - before, 5.0);
    }

    #[test]
    fn test_gauges_hold_latest_value() {
        Metrics::cvd("test:perp", -12.5);
        assert_eq!(CVD.with_label_values(&["test:perp"]).get(), -12.5);

        Metrics::cvd("test:perp", 4.0);
        assert_eq!(CVD.with_label_values(&["test:perp"]).get(), 4.0);
    }

    #[test]
    fn test_summary_tracks_counters() {
        let before = Metrics::summary();
        Metrics::tick_processed(1.0);
        Metrics::snapshot_persisted();
        Metrics::snapshot_write_failed();
        let after = Metrics::summary();
        assert!(after.ticks > before.ticks);
        assert!(after.snapshots_persisted > before.snapshots_persisted);
        assert!(after.snapshot_write_failures > before.snapshot_write_failures);
    }

    #[test]
    fn test_dispatch_labels() {
        let before = DISPATCHES_TOTAL
            .with_label_values(&["test", "failed"])
            .get();
        Metrics::dispatched(true, false);
        let after = DISPATCHES_TOTAL
            .with_label_values(&["test", "failed"])
            .get();
        assert_eq!(after - before, 1.0);
    }
}
