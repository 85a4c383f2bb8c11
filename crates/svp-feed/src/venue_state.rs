//! Per-venue state cells.
//!
//! Each market gets one `Arc<RwLock<TickAccumulator>>`. The feed task owns an
//! [`AccumulatorHandle`] (the only writer); the orchestrator reads through the
//! book with short read locks and never waits on network I/O.

use crate::accumulator::{CvdState, TickAccumulator};
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use svp_core::{MarketKey, Price, TradeTick};
use tracing::debug;

type AccumulatorCell = Arc<RwLock<TickAccumulator>>;

/// Snapshot of one market as seen by readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CvdReading {
    pub market: MarketKey,
    /// Rounded cumulative volume delta.
    pub cvd: Decimal,
    pub last_price: Option<Price>,
    pub last_update_ms: Option<i64>,
}

impl CvdReading {
    /// Reading for a market that has no data yet.
    pub fn empty(market: MarketKey) -> Self {
        Self {
            market,
            cvd: Decimal::ZERO,
            last_price: None,
            last_update_ms: None,
        }
    }
}

/// Writer handle for one market's accumulator.
#[derive(Debug, Clone)]
pub struct AccumulatorHandle {
    market: MarketKey,
    cell: AccumulatorCell,
}

impl AccumulatorHandle {
    pub fn market(&self) -> MarketKey {
        self.market
    }

    /// Apply a tick to this market's accumulator.
    ///
    /// Ticks for a different market are ignored.
    pub fn apply(&self, tick: &TradeTick) {
        if tick.market != self.market {
            debug!(expected = %self.market, got = %tick.market, "Tick for foreign market dropped");
            return;
        }
        self.cell.write().apply(tick);
    }
}

/// Registry of all accumulators.
pub struct VenueStateBook {
    markets: DashMap<MarketKey, AccumulatorCell>,
}

impl VenueStateBook {
    pub fn new() -> Self {
        Self {
            markets: DashMap::new(),
        }
    }

    /// Get or create the cell for a market and return its writer handle.
    pub fn register(&self, market: MarketKey) -> AccumulatorHandle {
        let cell = self
            .markets
            .entry(market)
            .or_insert_with(|| Arc::new(RwLock::new(TickAccumulator::new(market))))
            .clone();
        AccumulatorHandle { market, cell }
    }

    /// Apply a tick to the market it belongs to, creating the cell if needed.
    pub fn apply(&self, tick: &TradeTick) {
        self.register(tick.market).apply(tick);
    }

    /// Current reading for a market; an empty reading if it never traded.
    pub fn reading(&self, market: &MarketKey) -> CvdReading {
        self.markets
            .get(market)
            .map(|entry| {
                let guard = entry.read();
                CvdReading {
                    market: *market,
                    cvd: guard.cvd(),
                    last_price: guard.last_price(),
                    last_update_ms: guard.snapshot().last_update_ms,
                }
            })
            .unwrap_or_else(|| CvdReading::empty(*market))
    }

    /// Rounded CVD of a market, zero when absent.
    pub fn cvd_or_zero(&self, market: &MarketKey) -> Decimal {
        self.reading(market).cvd
    }

    /// Full state of a market, if registered.
    pub fn state(&self, market: &MarketKey) -> Option<CvdState> {
        self.markets.get(market).map(|entry| entry.read().snapshot())
    }

    pub fn market_keys(&self) -> Vec<MarketKey> {
        let mut keys: Vec<MarketKey> = self.markets.iter().map(|e| *e.key()).collect();
        keys.sort();
        keys
    }

    /// Readings for every registered market, ordered by key.
    pub fn all_readings(&self) -> Vec<CvdReading> {
        self.market_keys()
            .iter()
            .map(|key| self.reading(key))
            .collect()
    }
}

impl Default for VenueStateBook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use svp_core::{AggressorSide, Size};

    fn tick(market: MarketKey, side: AggressorSide, size: Decimal) -> TradeTick {
        TradeTick::new(market, side, Size::new(size), Price::new(dec!(100)), 42).unwrap()
    }

    #[test]
    fn test_unknown_market_reads_empty() {
        let book = VenueStateBook::new();
        let reading = book.reading(&MarketKey::BYBIT_PERP);
        assert_eq!(reading, CvdReading::empty(MarketKey::BYBIT_PERP));
        assert!(book.state(&MarketKey::BYBIT_PERP).is_none());
    }

    #[test]
    fn test_handle_writes_only_its_market() {
        let book = VenueStateBook::new();
        let handle = book.register(MarketKey::COINBASE_SPOT);

        handle.apply(&tick(MarketKey::COINBASE_SPOT, AggressorSide::Buy, dec!(5)));
        handle.apply(&tick(MarketKey::OKX_PERP, AggressorSide::Buy, dec!(7)));

        assert_eq!(book.cvd_or_zero(&MarketKey::COINBASE_SPOT), dec!(5));
        assert_eq!(book.cvd_or_zero(&MarketKey::OKX_PERP), Decimal::ZERO);
    }

    #[test]
    fn test_register_is_idempotent() {
        let book = VenueStateBook::new();
        let a = book.register(MarketKey::BINANCE_SPOT);
        let b = book.register(MarketKey::BINANCE_SPOT);

        a.apply(&tick(MarketKey::BINANCE_SPOT, AggressorSide::Buy, dec!(2)));
        b.apply(&tick(MarketKey::BINANCE_SPOT, AggressorSide::Sell, dec!(0.5)));

        assert_eq!(book.cvd_or_zero(&MarketKey::BINANCE_SPOT), dec!(1.5));
        assert_eq!(book.market_keys(), vec![MarketKey::BINANCE_SPOT]);
    }

    #[test]
    fn test_concurrent_writers_on_distinct_markets() {
        let book = Arc::new(VenueStateBook::new());
        let markets = [
            MarketKey::COINBASE_SPOT,
            MarketKey::BINANCE_PERP,
            MarketKey::BYBIT_PERP,
        ];

        let handles: Vec<_> = markets
            .iter()
            .map(|&market| {
                let handle = book.register(market);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        handle.apply(&tick(market, AggressorSide::Buy, dec!(0.01)));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        for market in markets {
            assert_eq!(book.cvd_or_zero(&market), dec!(10));
        }
        assert_eq!(book.all_readings().len(), 3);
    }
}
