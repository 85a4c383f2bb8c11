//! WebSocket trade stream ingestion.
//!
//! One [`TradeStream`] per market: connects, subscribes, parses frames and
//! applies ticks to its own accumulator cell. Reconnects after a fixed delay
//! until shut down.

use crate::error::FeedResult;
use crate::parser::TradeParser;
use crate::venue_state::AccumulatorHandle;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use svp_core::{MarketKey, MarketType, Venue};
use svp_telemetry::Metrics;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const BINANCE_SPOT_WS: &str = "wss://stream.binance.com:9443/ws";
const BINANCE_PERP_WS: &str = "wss://fstream.binance.com/ws";
const BYBIT_LINEAR_WS: &str = "wss://stream.bybit.com/v5/public/linear";
const OKX_PUBLIC_WS: &str = "wss://ws.okx.com:8443/ws/v5/public";
const COINBASE_WS: &str = "wss://ws-feed.exchange.coinbase.com";

/// Connection settings for one market's trade stream.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub market: MarketKey,
    pub url: String,
    /// Subscription request sent after connect (None for URL-addressed streams).
    pub subscribe: Option<String>,
    /// Application-level keepalive text, for venues that require one.
    pub keepalive: Option<String>,
    pub keepalive_interval: Duration,
    /// Fixed delay between reconnect attempts.
    pub retry_delay: Duration,
}

impl StreamConfig {
    /// Build the stream settings for a market and venue symbol.
    ///
    /// Symbols are venue-native: `SOLUSDT` for Binance/Bybit,
    /// `SOL-USDT-SWAP` for OKX, `SOL-USD` for Coinbase.
    pub fn for_market(market: MarketKey, symbol: &str) -> Self {
        let (url, subscribe, keepalive) = match (market.venue, market.market_type) {
            (Venue::Binance, MarketType::Spot) => (
                format!("{BINANCE_SPOT_WS}/{}@aggTrade", symbol.to_lowercase()),
                None,
                None,
            ),
            (Venue::Binance, MarketType::Perp) => (
                format!("{BINANCE_PERP_WS}/{}@aggTrade", symbol.to_lowercase()),
                None,
                None,
            ),
            (Venue::Bybit, _) => (
                BYBIT_LINEAR_WS.to_string(),
                Some(bybit_subscribe(symbol)),
                Some(r#"{"op":"ping"}"#.to_string()),
            ),
            (Venue::Okx, _) => (
                OKX_PUBLIC_WS.to_string(),
                Some(okx_subscribe(symbol)),
                Some("ping".to_string()),
            ),
            (Venue::Coinbase, _) => (COINBASE_WS.to_string(), Some(coinbase_subscribe(symbol)), None),
        };

        Self {
            market,
            url,
            subscribe,
            keepalive,
            keepalive_interval: Duration::from_secs(20),
            retry_delay: Duration::from_secs(5),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Bybit v5 public trade subscription.
pub fn bybit_subscribe(symbol: &str) -> String {
    serde_json::json!({
        "op": "subscribe",
        "args": [format!("publicTrade.{symbol}")],
    })
    .to_string()
}

/// OKX v5 trades subscription.
pub fn okx_subscribe(inst_id: &str) -> String {
    serde_json::json!({
        "op": "subscribe",
        "args": [{ "channel": "trades", "instId": inst_id }],
    })
    .to_string()
}

/// Coinbase Exchange matches subscription.
pub fn coinbase_subscribe(product_id: &str) -> String {
    serde_json::json!({
        "type": "subscribe",
        "product_ids": [product_id],
        "channels": ["matches"],
    })
    .to_string()
}

/// Ingestion task for one market.
pub struct TradeStream {
    config: StreamConfig,
    parser: TradeParser,
    handle: AccumulatorHandle,
}

impl TradeStream {
    pub fn new(config: StreamConfig, handle: AccumulatorHandle) -> Self {
        let parser = TradeParser::new(config.market);
        Self {
            config,
            parser,
            handle,
        }
    }

    pub fn market(&self) -> MarketKey {
        self.config.market
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Connection failures are logged and retried after `retry_delay`;
    /// they never surface to the caller.
    pub async fn run(self, shutdown: CancellationToken) {
        let market = self.config.market;
        let source = market.to_string();

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.connect_once(&shutdown).await {
                Ok(()) => info!(%market, "Trade stream closed"),
                Err(e) => {
                    Metrics::feed_error(&source);
                    error!(%market, error = %e, "Trade stream error");
                }
            }

            if shutdown.is_cancelled() {
                break;
            }

            warn!(
                %market,
                delay_ms = self.config.retry_delay.as_millis() as u64,
                "Reconnecting trade stream"
            );
            tokio::select! {
                () = tokio::time::sleep(self.config.retry_delay) => {}
                () = shutdown.cancelled() => break,
            }
        }

        info!(
            %market,
            accepted = self.parser.stats().accepted(),
            rejected = self.parser.stats().rejected(),
            "Trade stream stopped"
        );
    }

    async fn connect_once(&self, shutdown: &CancellationToken) -> FeedResult<()> {
        let market = self.config.market;
        info!(%market, url = %self.config.url, "Connecting trade stream");

        let (ws_stream, _response) =
            connect_async_tls_with_config(&self.config.url, None, true, None).await?;
        let (mut write, mut read) = ws_stream.split();

        if let Some(sub) = &self.config.subscribe {
            write.send(Message::Text(sub.clone())).await?;
            debug!(%market, "Subscription sent");
        }
        info!(%market, "Trade stream connected");

        let mut keepalive = tokio::time::interval(self.config.keepalive_interval);
        keepalive.tick().await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!(%market, ?e, "Close frame not sent");
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text),
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            warn!(%market, ?frame, "Trade stream closed by server");
                            return Ok(());
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(()),
                        _ => {}
                    }
                }

                _ = keepalive.tick() => {
                    if let Some(ping) = &self.config.keepalive {
                        write.send(Message::Text(ping.clone())).await?;
                    }
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        // OKX answers its text keepalive with a bare "pong".
        if text == "pong" {
            return;
        }
        match self.parser.parse(text) {
            Ok(ticks) => {
                if ticks.is_empty() {
                    return;
                }
                for tick in &ticks {
                    self.handle.apply(tick);
                }
                Metrics::trades_ingested(&self.config.market.to_string(), ticks.len() as u64);
            }
            Err(e) => {
                Metrics::feed_error(&self.config.market.to_string());
                debug!(market = %self.config.market, error = %e, "Frame dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue_state::VenueStateBook;
    use rust_decimal_macros::dec;

    #[test]
    fn test_binance_streams_are_url_addressed() {
        let spot = StreamConfig::for_market(MarketKey::BINANCE_SPOT, "SOLUSDT");
        assert_eq!(spot.url, "wss://stream.binance.com:9443/ws/solusdt@aggTrade");
        assert!(spot.subscribe.is_none());

        let perp = StreamConfig::for_market(MarketKey::BTC_PERP, "BTCUSDT");
        assert_eq!(perp.url, "wss://fstream.binance.com/ws/btcusdt@aggTrade");
    }

    #[test]
    fn test_subscription_messages() {
        let bybit: serde_json::Value = serde_json::from_str(&bybit_subscribe("SOLUSDT")).unwrap();
        assert_eq!(bybit["args"][0], "publicTrade.SOLUSDT");

        let okx: serde_json::Value = serde_json::from_str(&okx_subscribe("SOL-USDT-SWAP")).unwrap();
        assert_eq!(okx["args"][0]["channel"], "trades");
        assert_eq!(okx["args"][0]["instId"], "SOL-USDT-SWAP");

        let cb: serde_json::Value = serde_json::from_str(&coinbase_subscribe("SOL-USD")).unwrap();
        assert_eq!(cb["type"], "subscribe");
        assert_eq!(cb["channels"][0], "matches");

        let config = StreamConfig::for_market(MarketKey::OKX_PERP, "SOL-USDT-SWAP");
        assert_eq!(config.keepalive.as_deref(), Some("ping"));
    }

    #[test]
    fn test_handle_text_applies_to_own_cell() {
        let book = VenueStateBook::new();
        let handle = book.register(MarketKey::BYBIT_PERP);
        let stream = TradeStream::new(
            StreamConfig::for_market(MarketKey::BYBIT_PERP, "SOLUSDT"),
            handle,
        );

        stream.handle_text(
            r#"{"topic":"publicTrade.SOLUSDT","data":[{"T":1,"S":"Buy","v":"3","p":"150"},{"T":2,"S":"Sell","v":"1","p":"149"}]}"#,
        );
        stream.handle_text("pong");
        stream.handle_text("garbage");

        let reading = book.reading(&MarketKey::BYBIT_PERP);
        assert_eq!(reading.cvd, dec!(2));
        assert_eq!(reading.last_update_ms, Some(2));
    }

    #[tokio::test]
    async fn test_run_exits_when_already_cancelled() {
        let book = VenueStateBook::new();
        let stream = TradeStream::new(
            StreamConfig::for_market(MarketKey::COINBASE_SPOT, "SOL-USD"),
            book.register(MarketKey::COINBASE_SPOT),
        );
        let token = CancellationToken::new();
        token.cancel();
        stream.run(token).await;
    }
}
