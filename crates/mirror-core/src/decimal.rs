//! Precision-safe decimal types for position math.
//!
//! Uses `rust_decimal` for exact decimal arithmetic so that recomputing a
//! derived view from identical inputs always yields identical output.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Mul;
use std::str::FromStr;

/// One hundred, used for percent conversions.
pub const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Price with exact decimal precision.
///
/// Wraps `Decimal` to provide type safety and prevent mixing
/// prices with sizes in calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Percentage difference from a reference price.
    ///
    /// Returns `None` when the reference is not strictly positive.
    #[inline]
    pub fn pct_from(&self, reference: Price) -> Option<Decimal> {
        if !reference.is_positive() {
            return None;
        }
        Some((self.0 - reference.0) / reference.0 * HUNDRED)
    }

    /// Move this price by a signed percentage: `price × (1 + pct / 100)`.
    #[inline]
    pub fn offset_pct(&self, pct: Decimal) -> Self {
        Self(self.0 * (Decimal::ONE + pct / HUNDRED))
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

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Mul<Decimal> for Price {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self::Output {
        Self(self.0 * rhs)
    }
}

/// Size/quantity with exact decimal precision.
///
/// A position size is either a contract count or a coin amount depending on
/// the venue; see [`crate::ContractSizeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Size(pub Decimal);

impl Size {
    pub const ONE: Self = Self(Decimal::ONE);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
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

impl From<Decimal> for Size {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_pct_from() {
        let entry = Price::new(dec!(100));
        let current = Price::new(dec!(101));

        assert_eq!(current.pct_from(entry), Some(dec!(1)));
        assert_eq!(entry.pct_from(current).map(|p| p.round_dp(4)), Some(dec!(-0.9901)));
    }

    #[test]
    fn test_price_pct_from_zero_reference() {
        let current = Price::new(dec!(101));
        assert!(current.pct_from(Price::ZERO).is_none());
        assert!(current.pct_from(Price::new(dec!(-5))).is_none());
    }

    #[test]
    fn test_price_offset_pct() {
        let price = Price::new(dec!(200));
        assert_eq!(price.offset_pct(dec!(-0.5)).inner(), dec!(199));
        assert_eq!(price.offset_pct(dec!(1)).inner(), dec!(202));
    }

    #[test]
    fn test_price_scales_by_decimal() {
        let entry = Price::new(dec!(70000));
        assert_eq!(entry * dec!(0.95), Price::new(dec!(66500)));
    }
}
