//! Persisted snapshot record.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use svp_core::{LiquidationSnapshot, OiSnapshot, SentimentSnapshot};
use svp_detector::{ConfluenceLabel, SignalKind, TimeframeDeltas};

/// Exchange tag for records that aggregate every venue.
pub const MULTI_EXCHANGE: &str = "multi";

/// One tick's view of the market. Field names are the stored contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub timestamp_ms: i64,
    pub exchange: String,
    pub signal: SignalKind,
    pub confidence: u8,
    pub bias: ConfluenceLabel,
    /// First available of Binance perp, Coinbase, Bybit, OKX last price.
    pub price: Option<Decimal>,
    /// Average funding, percent.
    pub funding_rate: Decimal,
    pub spike: bool,
    pub spike_delta: Decimal,
    pub btc_spot: Decimal,
    pub btc_perp: Decimal,
    pub oi: OiSnapshot,
    pub liquidations: LiquidationSnapshot,
    pub sentiment: SentimentSnapshot,
    pub deltas: TimeframeDeltas,
}

impl SnapshotRecord {
    /// UTC day of the record, `YYYY-MM-DD`.
    pub fn date(&self) -> String {
        chrono::DateTime::from_timestamp_millis(self.timestamp_ms)
            .unwrap_or_default()
            .format("%Y-%m-%d")
            .to_string()
    }
}
