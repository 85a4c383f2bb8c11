//! End-to-end tick tests: trades in the book, alerts out of a mock sink.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use svp_core::{AggressorSide, Bias, MarketKey, Price, Size, TradeTick};
use svp_detector::{ConfluenceLabel, MetricId, SignalKind};
use svp_gate::SkipReason;
use svp_monitor::{AlertOutcome, AppConfig, Application};
use svp_notify::{AlertMessage, AlertSink, BoxFuture, DeliveryResult, MockAlertSink};
use tempfile::TempDir;
use tokio::sync::Notify;

// 2024-01-01T00:00:00Z
const T0: i64 = 1_704_067_200_000;

struct Harness {
    app: Application,
    sink: Arc<MockAlertSink>,
    dir: TempDir,
}

fn config(dir: &TempDir, force_test_alert: bool) -> AppConfig {
    let mut config = AppConfig::default();
    config.persistence.dir = dir.path().to_string_lossy().into_owned();
    config.notify.force_test_alert = force_test_alert;
    config.readings.enabled = false;
    config
}

fn harness(force_test_alert: bool) -> Harness {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(MockAlertSink::new());
    let app = Application::with_sink(config(&dir, force_test_alert), sink.clone()).unwrap();
    Harness { app, sink, dir }
}

/// Sink that holds every delivery until released.
#[derive(Default)]
struct GatedSink {
    release: Notify,
    delivered: AtomicUsize,
}

impl AlertSink for GatedSink {
    fn deliver(&self, _message: AlertMessage) -> BoxFuture<'_, DeliveryResult> {
        Box::pin(async move {
            self.release.notified().await;
            self.delivered.fetch_add(1, Ordering::SeqCst);
            DeliveryResult::Delivered
        })
    }
}

fn trade(app: &Application, market: MarketKey, side: AggressorSide, size: Decimal) {
    let tick = TradeTick::new(market, side, Size::new(size), Price::new(dec!(100)), T0).unwrap();
    app.book().apply(&tick);
}

/// Spot buying on both spot venues, perp selling, BTC spot bid.
fn spot_led_flow(app: &Application) {
    trade(app, MarketKey::COINBASE_SPOT, AggressorSide::Buy, dec!(100));
    trade(app, MarketKey::BINANCE_SPOT, AggressorSide::Buy, dec!(100));
    trade(app, MarketKey::BINANCE_PERP, AggressorSide::Sell, dec!(100));
    trade(app, MarketKey::BTC_SPOT, AggressorSide::Buy, dec!(10));
}

#[tokio::test]
async fn test_empty_book_is_neutral() {
    let mut h = harness(false);
    let report = h.app.tick_at(T0).unwrap();

    assert_eq!(report.record.signal, SignalKind::NoClearBias);
    assert_eq!(report.record.confidence, 0);
    assert_eq!(report.record.bias, ConfluenceLabel::Neutral);
    assert_eq!(report.record.price, None);
    assert!(!report.persisted);
    assert_eq!(report.alert, AlertOutcome::Skipped(SkipReason::NotDecisive));
    assert!(h.sink.messages().is_empty());
}

#[tokio::test]
async fn test_spot_led_move_alerts_once() {
    let mut h = harness(false);

    // Warm-up: baselines are set, every horizon abstains
    spot_led_flow(&h.app);
    let first = h.app.tick_at(T0).unwrap();
    assert_eq!(first.record.signal, SignalKind::SpotLedWithBtc);
    assert_eq!(first.record.confidence, 0);
    assert_eq!(first.record.price, Some(dec!(100)));
    assert!(first.persisted);
    assert_eq!(first.alert, AlertOutcome::Skipped(SkipReason::NotDecisive));

    // Spot CVD doubles while perp selling doubles: every horizon votes spot
    spot_led_flow(&h.app);
    let second = h.app.tick_at(T0 + 10_000).unwrap();
    h.app.flush_deliveries().await;
    assert_eq!(second.record.signal, SignalKind::SpotLedWithBtc);
    assert_eq!(second.record.confidence, 10);
    assert_eq!(second.record.bias, ConfluenceLabel::SpotDominant);
    assert_eq!(
        second.record.deltas.value("15m", MetricId::BinPerp),
        Some(dec!(-100))
    );
    // Persistence cooldown still running
    assert!(!second.persisted);
    assert_eq!(second.alert, AlertOutcome::Sent { test_mode: false });

    let messages = h.sink.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].kind, SignalKind::SpotLedWithBtc);
    assert_eq!(messages[0].direction, Bias::Long);
    assert_eq!(messages[0].breakdown.get(&MetricId::CbCvd), Some(&dec!(100)));
    assert!(!messages[0].test_mode);

    // Nothing changed: the repeat is clustered
    let third = h.app.tick_at(T0 + 15_000).unwrap();
    assert_eq!(third.alert, AlertOutcome::Clustered);
    assert_eq!(h.sink.messages().len(), 1);
}

#[tokio::test]
async fn test_failed_delivery_still_starts_cooldown() {
    let mut h = harness(false);
    h.sink
        .set_next_result(DeliveryResult::Failed("HTTP 500".to_string()));

    spot_led_flow(&h.app);
    h.app.tick_at(T0).unwrap();
    spot_led_flow(&h.app);
    let sent = h.app.tick_at(T0 + 10_000).unwrap();
    assert_eq!(sent.alert, AlertOutcome::Sent { test_mode: false });
    h.app.flush_deliveries().await;
    assert_eq!(h.sink.messages().len(), 1);

    // Past the cluster window, same signal, still inside the cooldown
    let repeat = h.app.tick_at(T0 + 100_000).unwrap();
    assert_eq!(repeat.record.confidence, 10);
    assert_eq!(repeat.alert, AlertOutcome::Skipped(SkipReason::Cooldown));
}

#[tokio::test]
async fn test_new_signal_not_held_by_previous_cooldown() {
    let mut h = harness(false);
    spot_led_flow(&h.app);
    h.app.tick_at(T0).unwrap();
    spot_led_flow(&h.app);
    h.app.tick_at(T0 + 10_000).unwrap();

    // Perp buying flips the picture inside the cooldown
    trade(&h.app, MarketKey::BINANCE_PERP, AggressorSide::Buy, dec!(800));
    let flipped = h.app.tick_at(T0 + 20_000).unwrap();
    assert_eq!(flipped.record.bias, ConfluenceLabel::PerpDominant);
    assert_eq!(flipped.alert, AlertOutcome::Sent { test_mode: false });

    h.app.flush_deliveries().await;
    let messages = h.sink.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].direction, Bias::Short);
}

#[tokio::test]
async fn test_tick_does_not_wait_for_delivery() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(GatedSink::default());
    let mut app = Application::with_sink(config(&dir, true), sink.clone()).unwrap();

    // Delivery is still held when the tick returns
    let report = app.tick_at(T0).unwrap();
    assert_eq!(report.alert, AlertOutcome::Sent { test_mode: true });
    assert_eq!(sink.delivered.load(Ordering::SeqCst), 0);

    sink.release.notify_one();
    tokio::time::timeout(Duration::from_secs(5), app.flush_deliveries())
        .await
        .unwrap();
    assert_eq!(sink.delivered.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_mode_bypasses_cooldown_stage() {
    let mut h = harness(true);
    let report = h.app.tick_at(T0).unwrap();
    h.app.flush_deliveries().await;

    assert_eq!(report.alert, AlertOutcome::Sent { test_mode: true });
    let messages = h.sink.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].test_mode);
    assert_eq!(messages[0].kind, SignalKind::NoClearBias);
    assert!(messages[0].render().contains("TEST SNIPER SIGNAL (SOL)"));
}

#[tokio::test]
async fn test_perp_spike_with_spot_selling() {
    let mut h = harness(false);
    trade(&h.app, MarketKey::COINBASE_SPOT, AggressorSide::Sell, dec!(50));
    trade(&h.app, MarketKey::BINANCE_PERP, AggressorSide::Buy, dec!(2500));

    let report = h.app.tick_at(T0).unwrap();
    assert!(report.spike.spike);
    assert_eq!(report.record.spike_delta, dec!(2500));
    assert_eq!(report.record.signal, SignalKind::PerpSpikeSpotSelling);
}

#[tokio::test]
async fn test_persisted_snapshot_lands_in_daily_file() {
    let mut h = harness(false);
    spot_led_flow(&h.app);
    assert!(h.app.tick_at(T0).unwrap().persisted);

    let path = h.dir.path().join("snapshots_2024-01-01.jsonl");
    let content = std::fs::read_to_string(path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 1);

    let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(value["exchange"], "multi");
    assert_eq!(value["signal"], "spot_led_with_btc");
    assert_eq!(value["timestamp_ms"], T0);
}

#[tokio::test]
async fn test_snapshot_write_failure_does_not_fail_tick() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, b"").unwrap();

    let mut config = config(&dir, false);
    config.persistence.dir = blocker.to_string_lossy().into_owned();
    let sink = Arc::new(MockAlertSink::new());
    let mut app = Application::with_sink(config, sink.clone()).unwrap();

    spot_led_flow(&app);
    let first = app.tick_at(T0).unwrap();
    assert!(!first.persisted);

    // Alert path still runs on the next tick
    spot_led_flow(&app);
    let second = app.tick_at(T0 + 10_000).unwrap();
    assert_eq!(second.alert, AlertOutcome::Sent { test_mode: false });
}
