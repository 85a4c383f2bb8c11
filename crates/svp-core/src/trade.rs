//! Trade events produced by the ingestion layer.

use crate::decimal::{Price, Size};
use crate::error::{CoreError, Result};
use crate::market::MarketKey;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Side of the aggressor (taker) of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggressorSide {
    Buy,
    Sell,
}

impl AggressorSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for AggressorSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Case-insensitive `buy` / `sell`.
impl FromStr for AggressorSide {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            _ => Err(CoreError::InvalidSide(s.to_string())),
        }
    }
}

/// A single validated trade.
///
/// Immutable once built. Construct through [`TradeTick::new`], which rejects
/// non-positive size or price, so downstream consumers never re-validate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeTick {
    pub market: MarketKey,
    pub side: AggressorSide,
    pub size: Size,
    pub price: Price,
    /// Exchange timestamp (ms since epoch).
    pub timestamp_ms: i64,
}

impl TradeTick {
    /// Build a tick, rejecting non-positive size or price.
    pub fn new(
        market: MarketKey,
        side: AggressorSide,
        size: Size,
        price: Price,
        timestamp_ms: i64,
    ) -> Result<Self> {
        if !size.is_positive() {
            return Err(CoreError::InvalidSize(size.to_string()));
        }
        if !price.is_positive() {
            return Err(CoreError::InvalidPrice(price.to_string()));
        }
        Ok(Self {
            market,
            side,
            size,
            price,
            timestamp_ms,
        })
    }

    /// Size signed by aggressor side (+ for buy, - for sell).
    pub fn signed_size(&self) -> Decimal {
        match self.side {
            AggressorSide::Buy => self.size.inner(),
            AggressorSide::Sell => -self.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_from_str() {
        assert_eq!("Buy".parse::<AggressorSide>().unwrap(), AggressorSide::Buy);
        assert_eq!("sell".parse::<AggressorSide>().unwrap(), AggressorSide::Sell);
        assert!(matches!(
            "hold".parse::<AggressorSide>(),
            Err(CoreError::InvalidSide(_))
        ));
    }

    #[test]
    fn test_signed_size() {
        let buy = TradeTick::new(
            MarketKey::BINANCE_SPOT,
            AggressorSide::Buy,
            Size::new(dec!(2.5)),
            Price::new(dec!(100)),
            0,
        )
        .unwrap();
        let sell = TradeTick {
            side: AggressorSide::Sell,
            ..buy.clone()
        };

        assert_eq!(buy.signed_size(), dec!(2.5));
        assert_eq!(sell.signed_size(), dec!(-2.5));
    }

    #[test]
    fn test_rejects_non_positive_values() {
        let zero_size = TradeTick::new(
            MarketKey::OKX_PERP,
            AggressorSide::Buy,
            Size::new(Decimal::ZERO),
            Price::new(dec!(100)),
            0,
        );
        assert!(matches!(zero_size, Err(CoreError::InvalidSize(_))));

        let negative_price = TradeTick::new(
            MarketKey::OKX_PERP,
            AggressorSide::Sell,
            Size::new(dec!(1)),
            Price::new(dec!(-1)),
            0,
        );
        assert!(matches!(negative_price, Err(CoreError::InvalidPrice(_))));
    }

    #[test]
    fn test_side_helpers() {
        assert_eq!(AggressorSide::Buy.opposite(), AggressorSide::Sell);
        assert_eq!(AggressorSide::Buy.to_string(), "buy");
    }
}
