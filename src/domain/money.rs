use crate::error::MarketError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A strictly positive monetary amount with two decimal places.
///
/// Wraps `rust_decimal::Decimal` so prices and payment amounts can never be
/// zero or negative once constructed. Deserialization goes through the same
/// validation as [`Amount::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub const SCALE: u32 = 2;

    pub fn new(value: Decimal) -> Result<Self, MarketError> {
        if value <= Decimal::ZERO {
            return Err(MarketError::ValidationError(
                "Amount must be positive".to_string(),
            ));
        }
        if value.scale() > Self::SCALE && value.round_dp(Self::SCALE) != value {
            return Err(MarketError::ValidationError(format!(
                "Amount must have at most {} decimal places",
                Self::SCALE
            )));
        }
        Ok(Self(value.normalize()))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Multiplies a nightly price by a stay length.
    ///
    /// # Errors
    /// `ValidationError` when `nights` is zero or the product does not fit
    /// in a `Decimal`.
    pub fn checked_mul(self, nights: u32) -> Result<Self, MarketError> {
        if nights == 0 {
            return Err(MarketError::ValidationError(
                "total_price: stay must last at least one night".to_string(),
            ));
        }
        self.0
            .checked_mul(Decimal::from(nights))
            .map(|total| Self(total.normalize()))
            .ok_or_else(|| {
                MarketError::ValidationError("total_price: amount too large".to_string())
            })
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = MarketError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}
