//! Exact decimal newtypes for trade data.
//!
//! Cumulative volume is a running sum over an unbounded number of trades.
//! With `Decimal` the sum is the same whatever order the trades arrive in.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;
use std::str::FromStr;

/// Round to `dp` decimal places, midpoint away from zero.
#[inline]
pub fn round_dp(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Trade price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    /// Strictly greater than zero.
    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Unsigned trade size. Direction lives in [`crate::AggressorSide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Size(pub Decimal);

impl Size {
    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    /// Strictly greater than zero.
    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Size {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Signed volume of a sell.
impl Neg for Size {
    type Output = Decimal;

    fn neg(self) -> Self::Output {
        -self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_dp_midpoint_away_from_zero() {
        assert_eq!(round_dp(dec!(1.005), 2), dec!(1.01));
        assert_eq!(round_dp(dec!(-1.005), 2), dec!(-1.01));
        assert_eq!(round_dp(dec!(2.344), 2), dec!(2.34));
    }

    #[test]
    fn test_parse_and_sign() {
        let size: Size = "0.5".parse().unwrap();
        let price: Price = "150".parse().unwrap();

        assert!(size.is_positive());
        assert!(price.is_positive());
        assert!(!Size::new(Decimal::ZERO).is_positive());
        assert!(!Price::new(dec!(-1)).is_positive());
        assert_eq!(-size, dec!(-0.5));
        assert!("abc".parse::<Price>().is_err());
    }
}
