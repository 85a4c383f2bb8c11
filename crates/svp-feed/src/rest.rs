//! REST pollers for funding, open interest, liquidations and sentiment.
//!
//! Each reading has its own task and refresh interval. A fetch that fails
//! leaves the previous value in the [`ReadingsCell`].

use crate::error::{FeedError, FeedResult};
use crate::readings::{LiquidationTracker, OiTracker, ReadingsCell};
use parking_lot::Mutex;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use svp_core::SentimentSnapshot;
use svp_telemetry::Metrics;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// REST readings configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingsConfig {
    /// Disable all pollers (readings stay neutral).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bybit_base_url")]
    pub bybit_base_url: String,
    #[serde(default = "default_binance_futures_base_url")]
    pub binance_futures_base_url: String,
    /// Path of the Bybit liquidation endpoint, appended to `bybit_base_url`.
    #[serde(default = "default_liquidation_path")]
    pub liquidation_path: String,
    #[serde(default = "default_sentiment_base_url")]
    pub sentiment_base_url: String,
    /// Linear perp symbol for Bybit/Binance (e.g. "SOLUSDT").
    #[serde(default = "default_perp_symbol")]
    pub perp_symbol: String,
    /// Asset symbol for the sentiment provider (e.g. "SOL").
    #[serde(default = "default_sentiment_symbol")]
    pub sentiment_symbol: String,
    /// Env var holding the sentiment API key. Sentiment is skipped if unset.
    #[serde(default = "default_sentiment_key_env")]
    pub sentiment_api_key_env: String,
    #[serde(default = "default_funding_refresh_secs")]
    pub funding_refresh_secs: u64,
    #[serde(default = "default_oi_refresh_secs")]
    pub oi_refresh_secs: u64,
    #[serde(default = "default_liquidation_refresh_secs")]
    pub liquidation_refresh_secs: u64,
    #[serde(default = "default_sentiment_refresh_secs")]
    pub sentiment_refresh_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// OI move in percent of the previous value counted as a spike.
    #[serde(default = "default_oi_spike_pct")]
    pub oi_spike_pct: Decimal,
    /// Liquidation total multiple of the previous fetch counted as a spike.
    #[serde(default = "default_liquidation_spike_multiplier")]
    pub liquidation_spike_multiplier: Decimal,
}

fn default_enabled() -> bool {
    true
}

fn default_bybit_base_url() -> String {
    "https://api.bybit.com".to_string()
}

fn default_binance_futures_base_url() -> String {
    "https://fapi.binance.com".to_string()
}

fn default_liquidation_path() -> String {
    "/v5/market/liquidation".to_string()
}

fn default_sentiment_base_url() -> String {
    "https://api.lunarcrush.com/v2".to_string()
}

fn default_perp_symbol() -> String {
    "SOLUSDT".to_string()
}

fn default_sentiment_symbol() -> String {
    "SOL".to_string()
}

fn default_sentiment_key_env() -> String {
    "LUNARCRUSH_API_KEY".to_string()
}

fn default_funding_refresh_secs() -> u64 {
    60
}

fn default_oi_refresh_secs() -> u64 {
    15
}

fn default_liquidation_refresh_secs() -> u64 {
    15
}

fn default_sentiment_refresh_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_oi_spike_pct() -> Decimal {
    crate::readings::DEFAULT_OI_SPIKE_PCT
}

fn default_liquidation_spike_multiplier() -> Decimal {
    crate::readings::DEFAULT_LIQUIDATION_SPIKE_MULTIPLIER
}

impl Default for ReadingsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            bybit_base_url: default_bybit_base_url(),
            binance_futures_base_url: default_binance_futures_base_url(),
            liquidation_path: default_liquidation_path(),
            sentiment_base_url: default_sentiment_base_url(),
            perp_symbol: default_perp_symbol(),
            sentiment_symbol: default_sentiment_symbol(),
            sentiment_api_key_env: default_sentiment_key_env(),
            funding_refresh_secs: default_funding_refresh_secs(),
            oi_refresh_secs: default_oi_refresh_secs(),
            liquidation_refresh_secs: default_liquidation_refresh_secs(),
            sentiment_refresh_secs: default_sentiment_refresh_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            oi_spike_pct: default_oi_spike_pct(),
            liquidation_spike_multiplier: default_liquidation_spike_multiplier(),
        }
    }
}

impl ReadingsConfig {
    pub fn validate(&self) -> Result<(), String> {
        let intervals = [
            ("funding_refresh_secs", self.funding_refresh_secs),
            ("oi_refresh_secs", self.oi_refresh_secs),
            ("liquidation_refresh_secs", self.liquidation_refresh_secs),
            ("sentiment_refresh_secs", self.sentiment_refresh_secs),
            ("request_timeout_secs", self.request_timeout_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(format!("{name} must be > 0"));
            }
        }
        if self.oi_spike_pct <= Decimal::ZERO {
            return Err("oi_spike_pct must be > 0".to_string());
        }
        if self.liquidation_spike_multiplier < Decimal::ONE {
            return Err("liquidation_spike_multiplier must be >= 1".to_string());
        }
        if self.perp_symbol.is_empty() {
            return Err("perp_symbol must not be empty".to_string());
        }
        Ok(())
    }
}

/// Read a decimal from a JSON string or number.
fn decimal_from(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::String(s) => Decimal::from_str(s).ok(),
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        _ => None,
    }
}

fn bybit_list(body: &serde_json::Value) -> FeedResult<&Vec<serde_json::Value>> {
    body.get("result")
        .and_then(|r| r.get("list"))
        .and_then(|l| l.as_array())
        .ok_or_else(|| FeedError::ParseError("Bybit response has no result.list".to_string()))
}

/// Latest Bybit funding rate, in percent.
pub fn parse_bybit_funding(body: &serde_json::Value) -> FeedResult<Decimal> {
    let rate = bybit_list(body)?
        .first()
        .and_then(|e| e.get("fundingRate"))
        .and_then(decimal_from)
        .ok_or_else(|| FeedError::ParseError("Bybit funding entry missing".to_string()))?;
    Ok(rate * Decimal::ONE_HUNDRED)
}

/// Latest Binance funding rate, in percent.
pub fn parse_binance_funding(body: &serde_json::Value) -> FeedResult<Decimal> {
    let rate = body
        .as_array()
        .and_then(|list| list.last())
        .and_then(|e| e.get("fundingRate"))
        .and_then(decimal_from)
        .ok_or_else(|| FeedError::ParseError("Binance funding entry missing".to_string()))?;
    Ok(rate * Decimal::ONE_HUNDRED)
}

/// Latest Bybit open interest. Bybit lists newest first.
pub fn parse_bybit_open_interest(body: &serde_json::Value) -> FeedResult<Decimal> {
    bybit_list(body)?
        .first()
        .and_then(|e| e.get("openInterest"))
        .and_then(decimal_from)
        .ok_or_else(|| FeedError::ParseError("Bybit openInterest missing".to_string()))
}

/// Sum liquidated quantity as `(longs, shorts)`.
///
/// A `Buy` liquidation closes a short; a `Sell` liquidation closes a long.
pub fn parse_bybit_liquidations(body: &serde_json::Value) -> FeedResult<(Decimal, Decimal)> {
    let mut longs = Decimal::ZERO;
    let mut shorts = Decimal::ZERO;
    for entry in bybit_list(body)? {
        let qty = entry.get("qty").and_then(decimal_from).unwrap_or_default();
        match entry.get("side").and_then(|s| s.as_str()) {
            Some("Buy") => shorts += qty,
            Some("Sell") => longs += qty,
            _ => {}
        }
    }
    Ok((longs, shorts))
}

/// Sentiment reading from the first asset entry.
pub fn parse_sentiment(body: &serde_json::Value) -> FeedResult<SentimentSnapshot> {
    let info = body
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .ok_or_else(|| FeedError::ParseError("Sentiment response has no data".to_string()))?;
    let field = |name: &str| info.get(name).and_then(decimal_from).unwrap_or_default();
    Ok(SentimentSnapshot::new(
        field("galaxy_score"),
        field("social_volume"),
        field("price_score"),
    ))
}

/// HTTP client for the pulled readings.
#[derive(Clone)]
pub struct ReadingsClient {
    client: Client,
    config: ReadingsConfig,
}

impl ReadingsClient {
    pub fn new(config: ReadingsConfig) -> FeedResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| FeedError::Http(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ReadingsConfig {
        &self.config
    }

    async fn get_json(&self, url: &str) -> FeedResult<serde_json::Value> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FeedError::Http(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Http(format!("HTTP {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| FeedError::Http(format!("Failed to parse response: {e}")))
    }

    pub async fn fetch_bybit_funding(&self) -> FeedResult<Decimal> {
        let url = format!(
            "{}/v5/market/funding/history?category=linear&symbol={}&limit=1",
            self.config.bybit_base_url, self.config.perp_symbol
        );
        parse_bybit_funding(&self.get_json(&url).await?)
    }

    pub async fn fetch_binance_funding(&self) -> FeedResult<Decimal> {
        let url = format!(
            "{}/fapi/v1/fundingRate?symbol={}&limit=1",
            self.config.binance_futures_base_url, self.config.perp_symbol
        );
        parse_binance_funding(&self.get_json(&url).await?)
    }

    pub async fn fetch_open_interest(&self) -> FeedResult<Decimal> {
        let url = format!(
            "{}/v5/market/open-interest?category=linear&symbol={}&intervalTime=5min&limit=1",
            self.config.bybit_base_url, self.config.perp_symbol
        );
        parse_bybit_open_interest(&self.get_json(&url).await?)
    }

    pub async fn fetch_liquidations(&self) -> FeedResult<(Decimal, Decimal)> {
        let url = format!(
            "{}{}?category=linear&symbol={}&limit=50",
            self.config.bybit_base_url, self.config.liquidation_path, self.config.perp_symbol
        );
        parse_bybit_liquidations(&self.get_json(&url).await?)
    }

    pub async fn fetch_sentiment(&self, api_key: &str) -> FeedResult<SentimentSnapshot> {
        let url = format!(
            "{}?data=assets&key={}&symbol={}",
            self.config.sentiment_base_url, api_key, self.config.sentiment_symbol
        );
        parse_sentiment(&self.get_json(&url).await?)
    }
}

/// Spawns one polling task per reading.
pub struct ReadingsPoller {
    client: ReadingsClient,
    cell: Arc<ReadingsCell>,
}

impl ReadingsPoller {
    pub fn new(client: ReadingsClient, cell: Arc<ReadingsCell>) -> Self {
        Self { client, cell }
    }

    /// Spawn all pollers. Tasks exit when `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        let config = self.client.config().clone();
        if !config.enabled {
            info!("Readings pollers disabled");
            return Vec::new();
        }

        let mut handles = Vec::new();

        let (client, cell) = (self.client.clone(), self.cell.clone());
        handles.push(tokio::spawn(poll_every(
            "funding",
            Duration::from_secs(config.funding_refresh_secs),
            shutdown.clone(),
            move || {
                let (client, cell) = (client.clone(), cell.clone());
                async move {
                    // Venues are independent; one failing keeps its stale rate.
                    let (bybit, binance) =
                        tokio::join!(client.fetch_bybit_funding(), client.fetch_binance_funding());
                    match bybit {
                        Ok(rate) => cell.set_bybit_funding(rate),
                        Err(e) => warn!(source = "bybit", error = %e, "Funding fetch failed"),
                    }
                    match binance {
                        Ok(rate) => cell.set_binance_funding(rate),
                        Err(e) => warn!(source = "binance", error = %e, "Funding fetch failed"),
                    }
                    debug!(average = %cell.snapshot().funding.average(), "Funding updated");
                    Ok(())
                }
            },
        )));

        let (client, cell) = (self.client.clone(), self.cell.clone());
        let oi_tracker = Arc::new(Mutex::new(OiTracker::new(config.oi_spike_pct)));
        handles.push(tokio::spawn(poll_every(
            "open_interest",
            Duration::from_secs(config.oi_refresh_secs),
            shutdown.clone(),
            move || {
                let (client, cell, tracker) = (client.clone(), cell.clone(), oi_tracker.clone());
                async move {
                    let oi = client.fetch_open_interest().await?;
                    let snapshot = tracker.lock().observe(oi);
                    cell.set_oi(snapshot);
                    Ok(())
                }
            },
        )));

        let (client, cell) = (self.client.clone(), self.cell.clone());
        let liq_tracker = Arc::new(Mutex::new(LiquidationTracker::new(
            config.liquidation_spike_multiplier,
        )));
        handles.push(tokio::spawn(poll_every(
            "liquidations",
            Duration::from_secs(config.liquidation_refresh_secs),
            shutdown.clone(),
            move || {
                let (client, cell, tracker) = (client.clone(), cell.clone(), liq_tracker.clone());
                async move {
                    let (longs, shorts) = client.fetch_liquidations().await?;
                    let snapshot = tracker.lock().observe(longs, shorts);
                    cell.set_liquidations(snapshot);
                    Ok(())
                }
            },
        )));

        match std::env::var(&config.sentiment_api_key_env) {
            Ok(api_key) if !api_key.is_empty() => {
                let (client, cell) = (self.client.clone(), self.cell.clone());
                handles.push(tokio::spawn(poll_every(
                    "sentiment",
                    Duration::from_secs(config.sentiment_refresh_secs),
                    shutdown,
                    move || {
                        let (client, cell, key) = (client.clone(), cell.clone(), api_key.clone());
                        async move {
                            cell.set_sentiment(client.fetch_sentiment(&key).await?);
                            Ok(())
                        }
                    },
                )));
            }
            _ => info!(
                env = %config.sentiment_api_key_env,
                "Sentiment API key not set, sentiment stays flat"
            ),
        }

        handles
    }
}

/// Run `fetch` every `period` until cancelled. Errors are logged and counted.
async fn poll_every<F, Fut>(
    name: &'static str,
    period: Duration,
    shutdown: CancellationToken,
    mut fetch: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = FeedResult<()>>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                debug!(reading = name, "Poller stopped");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = fetch().await {
                    Metrics::feed_error(name);
                    warn!(reading = name, error = %e, "Reading fetch failed, keeping previous value");
                }
            }
        }
    }
}
