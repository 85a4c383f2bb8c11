//! Cumulative volume delta accumulation.
//!
//! One accumulator type serves every venue/market; the market it belongs
//! to is carried as data, not as a distinct type per venue.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use svp_core::{round_dp, MarketKey, Price, TradeTick};

/// Decimal places exposed by [`TickAccumulator::cvd`].
pub const CVD_DECIMALS: u32 = 2;

/// Running order-flow state of one market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CvdState {
    pub market: MarketKey,
    /// Signed cumulative volume (unbounded, may go negative).
    pub cvd: Decimal,
    /// Price of the most recent tick.
    pub last_price: Option<Price>,
    /// Timestamp of the most recent tick (ms since epoch).
    pub last_update_ms: Option<i64>,
    /// Ticks applied since process start.
    pub tick_count: u64,
}

/// Folds a trade stream into cumulative volume delta.
///
/// Performs no validation; ticks are validated when they are built.
/// Never reset except by constructing a new accumulator.
#[derive(Debug, Clone)]
pub struct TickAccumulator {
    state: CvdState,
}

impl TickAccumulator {
    pub fn new(market: MarketKey) -> Self {
        Self {
            state: CvdState {
                market,
                cvd: Decimal::ZERO,
                last_price: None,
                last_update_ms: None,
                tick_count: 0,
            },
        }
    }

    pub fn market(&self) -> MarketKey {
        self.state.market
    }

    /// Apply one trade: buy aggressor adds size, sell aggressor subtracts it.
    pub fn apply(&mut self, tick: &TradeTick) {
        self.state.cvd += tick.signed_size();
        self.state.last_price = Some(tick.price);
        self.state.last_update_ms = Some(tick.timestamp_ms);
        self.state.tick_count += 1;
    }

    /// Cumulative volume rounded to [`CVD_DECIMALS`].
    pub fn cvd(&self) -> Decimal {
        round_dp(self.state.cvd, CVD_DECIMALS)
    }

    /// Unrounded cumulative volume.
    pub fn raw_cvd(&self) -> Decimal {
        self.state.cvd
    }

    pub fn last_price(&self) -> Option<Price> {
        self.state.last_price
    }

    /// Age of the last tick relative to wall clock, if any tick arrived.
    pub fn age_ms(&self) -> Option<i64> {
        self.state
            .last_update_ms
            .map(|t| Utc::now().timestamp_millis() - t)
    }

    pub fn snapshot(&self) -> CvdState {
        self.state.clone()
    }
}
