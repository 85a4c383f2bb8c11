//! Trade message parsing.
//!
//! Normalises each venue's public trade payload into [`TradeTick`]s.
//! Malformed trades (unknown side, non-positive size or price, unparseable
//! numbers) are rejected here and never reach an accumulator.
//!
//! Supported formats:
//! 1. Binance `aggTrade` (raw or combined-stream envelope)
//! 2. Bybit v5 `publicTrade.<symbol>`
//! 3. OKX v5 `trades`
//! 4. Coinbase Exchange `match` / `last_match`

use crate::error::{FeedError, FeedResult};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use svp_core::{AggressorSide, MarketKey, Price, Size, TradeTick, Venue};
use tracing::{debug, warn};

/// Parse statistics.
#[derive(Debug, Default)]
pub struct ParseStats {
    /// Trades normalised into ticks.
    pub accepted_count: AtomicU64,
    /// Trades dropped as malformed.
    pub rejected_count: AtomicU64,
}

impl ParseStats {
    pub fn record_accepted(&self) {
        self.accepted_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn accepted(&self) -> u64 {
        self.accepted_count.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected_count.load(Ordering::Relaxed)
    }
}

/// Binance aggregate trade.
/// Format: {"e":"aggTrade","p":"150.1","q":"2.5","T":1700000000000,"m":true}
#[derive(Debug, Deserialize)]
struct BinanceAggTrade {
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    qty: String,
    #[serde(rename = "T", default)]
    trade_time: Option<i64>,
    /// Buyer is the maker, i.e. the aggressor sold.
    #[serde(rename = "m")]
    buyer_is_maker: bool,
}

/// Bybit public trade entry.
/// Format: {"T":1700000000000,"S":"Buy","v":"0.1","p":"150.1"}
#[derive(Debug, Deserialize)]
struct BybitTrade {
    #[serde(rename = "T", default)]
    time: Option<i64>,
    #[serde(rename = "S")]
    side: String,
    #[serde(rename = "v")]
    size: String,
    #[serde(rename = "p")]
    price: String,
}

/// OKX trade entry.
/// Format: {"px":"150.1","sz":"3","side":"buy","ts":"1700000000000"}
#[derive(Debug, Deserialize)]
struct OkxTrade {
    px: String,
    sz: String,
    side: String,
    #[serde(default)]
    ts: Option<String>,
}

/// Coinbase match message. `side` is the maker order side.
#[derive(Debug, Deserialize)]
struct CoinbaseMatch {
    side: String,
    size: String,
    price: String,
    #[serde(default)]
    time: Option<String>,
}

/// Parser for one market's trade stream.
pub struct TradeParser {
    market: MarketKey,
    stats: ParseStats,
}

impl TradeParser {
    pub fn new(market: MarketKey) -> Self {
        Self {
            market,
            stats: ParseStats::default(),
        }
    }

    pub fn market(&self) -> MarketKey {
        self.market
    }

    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }

    /// Parse one text frame into zero or more ticks.
    ///
    /// Control frames (subscription acks, heartbeats) yield an empty vector.
    /// Individual malformed trades inside a batch are dropped and counted;
    /// a frame that is not JSON at all is an error.
    pub fn parse(&self, text: &str) -> FeedResult<Vec<TradeTick>> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        match self.market.venue {
            Venue::Binance => self.parse_binance(&value),
            Venue::Bybit => self.parse_bybit(&value),
            Venue::Okx => self.parse_okx(&value),
            Venue::Coinbase => self.parse_coinbase(&value),
        }
    }

    fn parse_binance(&self, value: &serde_json::Value) -> FeedResult<Vec<TradeTick>> {
        // Combined streams wrap the payload: {"stream": "...", "data": {...}}
        let payload = value.get("data").unwrap_or(value);
        if payload.get("e").and_then(|e| e.as_str()) != Some("aggTrade") {
            return Ok(Vec::new());
        }
        let trade: BinanceAggTrade = serde_json::from_value(payload.clone())
            .map_err(|e| FeedError::ParseError(format!("Invalid Binance aggTrade: {e}")))?;

        let side = if trade.buyer_is_maker {
            AggressorSide::Sell
        } else {
            AggressorSide::Buy
        };
        let ts = trade
            .trade_time
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        Ok(self
            .build(side, &trade.qty, &trade.price, ts)
            .into_iter()
            .collect())
    }

    fn parse_bybit(&self, value: &serde_json::Value) -> FeedResult<Vec<TradeTick>> {
        let is_trade_topic = value
            .get("topic")
            .and_then(|t| t.as_str())
            .is_some_and(|t| t.starts_with("publicTrade."));
        if !is_trade_topic {
            debug!(market = %self.market, "Non-trade Bybit frame ignored");
            return Ok(Vec::new());
        }
        let trades: Vec<BybitTrade> = serde_json::from_value(
            value.get("data").cloned().unwrap_or_default(),
        )
        .map_err(|e| FeedError::ParseError(format!("Invalid Bybit publicTrade: {e}")))?;

        Ok(trades
            .iter()
            .filter_map(|t| {
                let side = self.side_from_str(&t.side)?;
                let ts = t.time.unwrap_or_else(|| Utc::now().timestamp_millis());
                self.build(side, &t.size, &t.price, ts)
            })
            .collect())
    }

    fn parse_okx(&self, value: &serde_json::Value) -> FeedResult<Vec<TradeTick>> {
        if value.get("event").is_some() {
            return Ok(Vec::new());
        }
        let Some(data) = value.get("data") else {
            return Ok(Vec::new());
        };
        let trades: Vec<OkxTrade> = serde_json::from_value(data.clone())
            .map_err(|e| FeedError::ParseError(format!("Invalid OKX trades: {e}")))?;

        Ok(trades
            .iter()
            .filter_map(|t| {
                let side = self.side_from_str(&t.side)?;
                let ts = t
                    .ts
                    .as_deref()
                    .and_then(|s| s.parse::<i64>().ok())
                    .unwrap_or_else(|| Utc::now().timestamp_millis());
                self.build(side, &t.sz, &t.px, ts)
            })
            .collect())
    }

    fn parse_coinbase(&self, value: &serde_json::Value) -> FeedResult<Vec<TradeTick>> {
        let msg_type = value.get("type").and_then(|t| t.as_str()).unwrap_or("");
        if msg_type != "match" && msg_type != "last_match" {
            return Ok(Vec::new());
        }
        let m: CoinbaseMatch = serde_json::from_value(value.clone())
            .map_err(|e| FeedError::ParseError(format!("Invalid Coinbase match: {e}")))?;

        // Maker side is reported; the aggressor took the other side.
        let Some(maker) = self.side_from_str(&m.side) else {
            return Ok(Vec::new());
        };
        let ts = m
            .time
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.timestamp_millis())
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        Ok(self
            .build(maker.opposite(), &m.size, &m.price, ts)
            .into_iter()
            .collect())
    }

    fn side_from_str(&self, side: &str) -> Option<AggressorSide> {
        match side.parse::<AggressorSide>() {
            Ok(side) => Some(side),
            Err(e) => {
                self.stats.record_rejected();
                warn!(market = %self.market, error = %e, "Unknown trade side, dropped");
                None
            }
        }
    }

    fn build(&self, side: AggressorSide, size: &str, price: &str, ts: i64) -> Option<TradeTick> {
        let parsed = size
            .parse::<Size>()
            .map_err(svp_core::CoreError::from)
            .and_then(|size| {
                let price = price.parse::<Price>()?;
                TradeTick::new(self.market, side, size, price, ts)
            });

        match parsed {
            Ok(tick) => {
                self.stats.record_accepted();
                Some(tick)
            }
            Err(e) => {
                self.stats.record_rejected();
                warn!(market = %self.market, error = %e, "Malformed trade dropped");
                None
            }
        }
    }
}
