//! Main application orchestration.
//!
//! Feeds and REST pollers run as background tasks writing into shared cells.
//! The tick loop reads those cells, runs detection and scoring, persists the
//! snapshot and pushes alerts through the two gate stages. A tick never
//! waits on the network: alert delivery runs in its own task.

use crate::config::AppConfig;
use crate::error::AppResult;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use svp_core::{MarketKey, MarketReadings};
use svp_detector::{
    ConfluenceResult, ConfluenceScorer, MetricId, MultiTimeframeMemory, SignalKind,
    SignalReadings, SignalRuleSet, SpikeDetector, SpikeReport, TimeframeDeltas,
};
use svp_feed::{
    ReadingsCell, ReadingsClient, ReadingsPoller, StreamConfig, TradeStream, VenueStateBook,
};
use svp_gate::{
    ClusterBuffer, ClusterDecision, CooldownDispatcher, DispatchDecision, SignalFingerprint,
};
use svp_notify::{AlertMessage, DeliveryResult, DynAlertSink, WebhookSink};
use svp_persistence::{JsonLinesWriter, SnapshotRecord, MULTI_EXCHANGE};
use svp_telemetry::Metrics;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Price sources for the snapshot, in preference order.
const PRICE_SOURCES: [MarketKey; 4] = [
    MarketKey::BINANCE_PERP,
    MarketKey::COINBASE_SPOT,
    MarketKey::BYBIT_PERP,
    MarketKey::OKX_PERP,
];

/// What happened to the alert path in one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertOutcome {
    /// Stage A absorbed a repeat.
    Clustered,
    /// Stage B rejected the signal.
    Skipped(svp_gate::SkipReason),
    /// An alert was handed to a delivery task.
    Sent { test_mode: bool },
}

/// Result of one tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub record: SnapshotRecord,
    pub spike: SpikeReport,
    pub persisted: bool,
    pub alert: AlertOutcome,
}

/// Main application.
pub struct Application {
    config: AppConfig,
    book: Arc<VenueStateBook>,
    readings: Arc<ReadingsCell>,
    spike: SpikeDetector,
    memory: MultiTimeframeMemory,
    scorer: ConfluenceScorer,
    rules: SignalRuleSet,
    cluster: ClusterBuffer,
    dispatcher: CooldownDispatcher,
    persist_gate: CooldownDispatcher,
    writer: Option<JsonLinesWriter>,
    sink: DynAlertSink,
    deliveries: JoinSet<()>,
}

impl Application {
    /// Create an application delivering to the configured webhook.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let sink: DynAlertSink = Arc::new(WebhookSink::from_config(&config.notify)?);
        Self::with_sink(config, sink)
    }

    /// Create an application delivering to `sink`.
    pub fn with_sink(config: AppConfig, sink: DynAlertSink) -> AppResult<Self> {
        config.validate()?;

        let book = Arc::new(VenueStateBook::new());
        for key in config.market_keys() {
            book.register(key);
        }

        let writer = config.persistence.enabled.then(|| {
            JsonLinesWriter::new(&config.persistence.dir, config.persistence.max_buffer_size)
        });

        Ok(Self {
            book,
            readings: Arc::new(ReadingsCell::new()),
            spike: SpikeDetector::new(&config.detector.spike),
            memory: MultiTimeframeMemory::new(config.detector.horizons.clone()),
            scorer: ConfluenceScorer::new(&config.detector),
            rules: SignalRuleSet::standard(&config.detector),
            cluster: ClusterBuffer::new(
                config.gate.buffer_window_secs,
                config.gate.score_bucket_size,
            ),
            dispatcher: CooldownDispatcher::new(config.gate.dispatch_policy()),
            persist_gate: CooldownDispatcher::new(config.gate.persist_policy()),
            writer,
            sink,
            deliveries: JoinSet::new(),
            config,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Per-market CVD state shared with the feed tasks.
    pub fn book(&self) -> &Arc<VenueStateBook> {
        &self.book
    }

    /// Scalar readings shared with the REST pollers.
    pub fn readings(&self) -> &Arc<ReadingsCell> {
        &self.readings
    }

    /// Run one tick at the current wall-clock time.
    pub fn tick(&mut self) -> AppResult<TickReport> {
        self.tick_at(Utc::now().timestamp_millis())
    }

    /// Run one tick at `now_ms`. Must be called inside a tokio runtime.
    pub fn tick_at(&mut self, now_ms: i64) -> AppResult<TickReport> {
        self.reap_deliveries();

        let cvd = |key: MarketKey| self.book.cvd_or_zero(&key);
        let inputs = SignalReadings {
            cb: cvd(MarketKey::COINBASE_SPOT),
            bin_spot: cvd(MarketKey::BINANCE_SPOT),
            bin_perp: cvd(MarketKey::BINANCE_PERP),
            bybit: cvd(MarketKey::BYBIT_PERP),
            okx: cvd(MarketKey::OKX_PERP),
            btc_spot: cvd(MarketKey::BTC_SPOT),
            btc_perp: cvd(MarketKey::BTC_PERP),
            funding_pct: Decimal::ZERO,
            spike: false,
        };
        let price = PRICE_SOURCES
            .iter()
            .find_map(|key| self.book.reading(key).last_price)
            .map(|p| p.inner());
        for key in self.config.market_keys() {
            let value = self.book.cvd_or_zero(&key).to_f64().unwrap_or(0.0);
            Metrics::cvd(&key.to_string(), value);
        }
        let market = self.readings.snapshot();

        self.spike.add_at(inputs.bin_perp, now_ms);
        let spike = self.spike.check_at(now_ms);

        let metrics = BTreeMap::from([
            (MetricId::CbCvd, inputs.cb),
            (MetricId::BinSpot, inputs.bin_spot),
            (MetricId::BinPerp, inputs.bin_perp),
        ]);
        self.memory.update(&metrics, now_ms);
        let deltas = self.memory.get_all_deltas();
        let result = self.scorer.score(&deltas);

        let inputs = SignalReadings {
            funding_pct: market.funding.average(),
            spike: spike.spike,
            ..inputs
        };
        let kind = self.rules.select(&inputs);
        Metrics::signal_selected(kind.as_str());
        Metrics::confluence_score(result.score);

        let record = build_record(now_ms, kind, result, price, &inputs, &spike, &market, deltas);
        log_report(&self.config.asset, &record, &inputs);

        let persisted = self.persist(&record, &inputs, now_ms);
        let alert = self.alert(kind, result, &record.deltas, now_ms);

        Ok(TickReport {
            record,
            spike,
            persisted,
            alert,
        })
    }

    /// Append the snapshot if the persistence gate lets it through.
    ///
    /// A failed write is logged and counted; the record stays buffered in
    /// the writer and the tick carries on.
    fn persist(&mut self, record: &SnapshotRecord, inputs: &SignalReadings, now_ms: i64) -> bool {
        let Some(writer) = self.writer.as_mut() else {
            return false;
        };

        let fingerprint = SignalFingerprint::classify(
            record.signal,
            record.confidence,
            record.bias,
            self.config.gate.score_bucket_size,
        )
        .with_cvd(
            &[inputs.bin_spot, inputs.cb, inputs.bin_perp],
            self.config.gate.persist_fingerprint_cvd_bucket,
        );

        if !self
            .persist_gate
            .evaluate_at(&fingerprint, record.confidence, now_ms)
            .is_dispatch()
        {
            return false;
        }

        if let Err(e) = writer.append(record.clone()) {
            Metrics::snapshot_write_failed();
            error!(error = %e, pending = writer.pending(), "Snapshot write failed");
            return false;
        }
        Metrics::snapshot_persisted();
        info!(signal = %record.signal, confidence = record.confidence, "Snapshot persisted");
        true
    }

    /// Stage A, then Stage B (or test mode), then a spawned delivery.
    fn alert(
        &mut self,
        kind: SignalKind,
        result: ConfluenceResult,
        deltas: &TimeframeDeltas,
        now_ms: i64,
    ) -> AlertOutcome {
        if self.cluster.should_send_at(kind, result.score, result.label, now_ms)
            == ClusterDecision::Suppress
        {
            Metrics::cluster_suppressed();
            debug!(duplicates = self.cluster.info().duplicates, "Signal clustered");
            return AlertOutcome::Clustered;
        }

        let test_mode = self.config.notify.force_test_alert;
        if !test_mode {
            let fingerprint = SignalFingerprint::classify(
                kind,
                result.score,
                result.label,
                self.config.gate.score_bucket_size,
            );
            if let DispatchDecision::Skip(reason) =
                self.dispatcher.evaluate_at(&fingerprint, result.score, now_ms)
            {
                Metrics::dispatch_skipped(reason.as_str());
                return AlertOutcome::Skipped(reason);
            }
        }

        let breakdown_horizon = &self.config.notify.breakdown_horizon;
        let message = AlertMessage::new(
            self.config.asset.clone(),
            kind,
            result,
            breakdown_horizon.clone(),
            deltas.get(breakdown_horizon),
            test_mode,
        );
        info!(
            kind = %kind,
            score = result.score,
            label = %result.label,
            direction = %message.direction,
            test_mode,
            "Dispatching alert"
        );

        let sink = self.sink.clone();
        self.deliveries.spawn(async move {
            let delivery = sink.deliver(message).await;
            Metrics::dispatched(test_mode, delivery.is_delivered());
            if let DeliveryResult::Failed(reason) = &delivery {
                warn!(kind = %kind, %reason, "Alert not delivered");
            }
        });
        AlertOutcome::Sent { test_mode }
    }

    /// Collect finished delivery tasks without waiting.
    fn reap_deliveries(&mut self) {
        while let Some(joined) = self.deliveries.try_join_next() {
            if let Err(e) = joined {
                warn!(error = %e, "Alert delivery task failed");
            }
        }
    }

    /// Wait for every in-flight alert delivery.
    pub async fn flush_deliveries(&mut self) {
        while let Some(joined) = self.deliveries.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Alert delivery task failed");
            }
        }
    }

    /// Spawn one trade stream task per configured market.
    fn spawn_streams(&self, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        let retry_delay = Duration::from_secs(self.config.error_backoff_secs);
        self.config
            .markets
            .iter()
            .map(|market| {
                let key = market.key();
                let handle = self.book.register(key);
                let config =
                    StreamConfig::for_market(key, &market.symbol).with_retry_delay(retry_delay);
                let stream = TradeStream::new(config, handle);
                info!(market = %key, symbol = %market.symbol, "Starting trade stream");
                tokio::spawn(stream.run(shutdown.clone()))
            })
            .collect()
    }

    /// Run the tick loop until `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) -> AppResult<()> {
        info!(
            asset = %self.config.asset,
            markets = self.config.markets.len(),
            tick_interval_secs = self.config.tick_interval_secs,
            test_mode = self.config.notify.force_test_alert,
            "Starting application"
        );

        let mut handles = self.spawn_streams(&shutdown);
        if self.config.readings.enabled {
            let client = ReadingsClient::new(self.config.readings.clone())?;
            handles.extend(ReadingsPoller::new(client, self.readings.clone()).spawn(shutdown.clone()));
        } else {
            info!("REST readings disabled");
        }

        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.tick_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let stats_period = Duration::from_secs(self.config.telemetry.stats_interval_secs);
        let mut stats = tokio::time::interval_at(tokio::time::Instant::now() + stats_period, stats_period);
        let backoff = Duration::from_secs(self.config.error_backoff_secs);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }

                _ = ticker.tick() => {
                    let started = Instant::now();
                    match self.tick() {
                        Ok(_) => {
                            Metrics::tick_processed(started.elapsed().as_secs_f64() * 1000.0);
                        }
                        Err(e) => {
                            Metrics::tick_failed();
                            error!(error = %e, backoff_secs = backoff.as_secs(), "Tick failed");
                            tokio::select! {
                                _ = shutdown.cancelled() => {}
                                _ = tokio::time::sleep(backoff) => {}
                            }
                        }
                    }
                }

                _ = stats.tick() => {
                    let summary = Metrics::summary();
                    info!(
                        ticks = summary.ticks,
                        tick_failures = summary.tick_failures,
                        cluster_suppressed = summary.cluster_suppressed,
                        snapshots_persisted = summary.snapshots_persisted,
                        snapshot_write_failures = summary.snapshot_write_failures,
                        "Periodic statistics"
                    );
                }
            }
        }

        shutdown.cancel();
        for handle in handles {
            handle.abort();
        }
        self.flush_deliveries().await;
        if let Some(writer) = self.writer.as_mut() {
            writer.close()?;
        }
        info!("Application stopped");
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn build_record(
    now_ms: i64,
    kind: SignalKind,
    result: ConfluenceResult,
    price: Option<Decimal>,
    inputs: &SignalReadings,
    spike: &SpikeReport,
    market: &MarketReadings,
    deltas: TimeframeDeltas,
) -> SnapshotRecord {
    SnapshotRecord {
        timestamp_ms: now_ms,
        exchange: MULTI_EXCHANGE.to_string(),
        signal: kind,
        confidence: result.score,
        bias: result.label,
        price,
        funding_rate: inputs.funding_pct,
        spike: spike.spike,
        spike_delta: spike.net_delta,
        btc_spot: inputs.btc_spot,
        btc_perp: inputs.btc_perp,
        oi: market.oi,
        liquidations: market.liquidations,
        sentiment: market.sentiment,
        deltas,
    }
}

/// Per-tick report: one structured event plus one per horizon.
fn log_report(asset: &str, record: &SnapshotRecord, inputs: &SignalReadings) {
    info!(
        asset,
        signal = %record.signal,
        confidence = record.confidence,
        bias = %record.bias,
        cb_cvd = %inputs.cb,
        bin_spot_cvd = %inputs.bin_spot,
        bin_perp_cvd = %inputs.bin_perp,
        bybit_cvd = %inputs.bybit,
        okx_cvd = %inputs.okx,
        btc_spot_cvd = %inputs.btc_spot,
        btc_perp_cvd = %inputs.btc_perp,
        funding_pct = %record.funding_rate,
        spike = record.spike,
        spike_delta = %record.spike_delta,
        price = ?record.price,
        oi_spike = record.oi.spike,
        liquidation_spike = record.liquidations.spike,
        sentiment = ?record.sentiment.badge,
        "Tick report"
    );
    for (horizon, deltas) in record.deltas.iter() {
        let pct = |metric: MetricId| deltas.get(&metric).copied().unwrap_or_default();
        debug!(
            horizon,
            cb_pct = %pct(MetricId::CbCvd),
            bin_spot_pct = %pct(MetricId::BinSpot),
            bin_perp_pct = %pct(MetricId::BinPerp),
            "Horizon delta"
        );
    }
}
