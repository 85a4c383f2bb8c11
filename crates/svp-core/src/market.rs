//! Market identification types.
//!
//! A trade stream is identified by the venue it comes from, whether it is
//! the spot or perpetual market, and whether it trades the monitored asset
//! or the BTC reference pair.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trading venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Coinbase,
    Binance,
    Bybit,
    Okx,
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coinbase => write!(f, "coinbase"),
            Self::Binance => write!(f, "binance"),
            Self::Bybit => write!(f, "bybit"),
            Self::Okx => write!(f, "okx"),
        }
    }
}

impl FromStr for Venue {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "coinbase" => Ok(Self::Coinbase),
            "binance" => Ok(Self::Binance),
            "bybit" => Ok(Self::Bybit),
            "okx" => Ok(Self::Okx),
            other => Err(CoreError::InvalidMarketKey(format!("unknown venue: {other}"))),
        }
    }
}

/// Market type: immediate-delivery spot or expiry-less perpetual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    Spot,
    Perp,
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spot => write!(f, "spot"),
            Self::Perp => write!(f, "perp"),
        }
    }
}

/// Which underlying a stream trades.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AssetRole {
    /// The monitored asset.
    #[default]
    Primary,
    /// BTC used as market-wide confirmation.
    Reference,
}

/// Unique identifier of one accumulator.
///
/// Format: `{venue}:{market_type}` for the primary asset and
/// `{venue}:{market_type}:ref` for the reference asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MarketKey {
    pub venue: Venue,
    pub market_type: MarketType,
    #[serde(default)]
    pub role: AssetRole,
}

impl MarketKey {
    pub const fn new(venue: Venue, market_type: MarketType) -> Self {
        Self {
            venue,
            market_type,
            role: AssetRole::Primary,
        }
    }

    pub const fn reference(venue: Venue, market_type: MarketType) -> Self {
        Self {
            venue,
            market_type,
            role: AssetRole::Reference,
        }
    }

    pub const COINBASE_SPOT: Self = Self::new(Venue::Coinbase, MarketType::Spot);
    pub const BINANCE_SPOT: Self = Self::new(Venue::Binance, MarketType::Spot);
    pub const BINANCE_PERP: Self = Self::new(Venue::Binance, MarketType::Perp);
    pub const BYBIT_PERP: Self = Self::new(Venue::Bybit, MarketType::Perp);
    pub const OKX_PERP: Self = Self::new(Venue::Okx, MarketType::Perp);
    pub const BTC_SPOT: Self = Self::reference(Venue::Binance, MarketType::Spot);
    pub const BTC_PERP: Self = Self::reference(Venue::Binance, MarketType::Perp);

    pub fn is_spot(&self) -> bool {
        self.market_type == MarketType::Spot
    }
}

impl fmt::Display for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.role {
            AssetRole::Primary => write!(f, "{}:{}", self.venue, self.market_type),
            AssetRole::Reference => write!(f, "{}:{}:ref", self.venue, self.market_type),
        }
    }
}

impl FromStr for MarketKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(':');
        let venue = parts
            .next()
            .ok_or_else(|| CoreError::InvalidMarketKey(s.to_string()))?
            .parse::<Venue>()?;
        let market_type = match parts.next() {
            Some("spot") => MarketType::Spot,
            Some("perp") => MarketType::Perp,
            _ => return Err(CoreError::InvalidMarketKey(s.to_string())),
        };
        let role = match parts.next() {
            None => AssetRole::Primary,
            Some("ref") => AssetRole::Reference,
            Some(_) => return Err(CoreError::InvalidMarketKey(s.to_string())),
        };
        Ok(Self {
            venue,
            market_type,
            role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_key_display() {
        assert_eq!(MarketKey::BINANCE_PERP.to_string(), "binance:perp");
        assert_eq!(MarketKey::BTC_SPOT.to_string(), "binance:spot:ref");
    }

    #[test]
    fn test_market_key_parse_roundtrip_forms() {
        assert_eq!(
            "coinbase:spot".parse::<MarketKey>().unwrap(),
            MarketKey::COINBASE_SPOT
        );
        assert_eq!(
            "binance:perp:ref".parse::<MarketKey>().unwrap(),
            MarketKey::BTC_PERP
        );
        assert!("kraken:spot".parse::<MarketKey>().is_err());
        assert!("okx:future".parse::<MarketKey>().is_err());
    }

    #[test]
    fn test_reference_and_primary_are_distinct() {
        assert_ne!(MarketKey::BINANCE_SPOT, MarketKey::BTC_SPOT);
        assert!(MarketKey::BTC_SPOT.is_spot());
    }
}
