//! Safe financial arithmetic using fixed-point decimal
//!
//! This module provides a type-safe Amount type using rust_decimal.
//! **NEVER use f64 for balance or operation amounts!**
//!
//! - Uses `Decimal` internally (28-29 significant digits)
//! - Arithmetic is exact for addition, subtraction and multiplication
//! - Checked operations (never overflow/panic)
//! - Serializes as a decimal string (preserves precision)

use crate::EngineError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Monetary amount with fixed-point precision
///
/// Balances and operations persist amounts as decimal strings, so repeated
/// increments and decrements never drift the way binary floats do.
///
/// # Examples
///
/// ```rust
/// use budgetbot_engine::Amount;
///
/// let a = Amount::parse("100").unwrap();
/// let b = Amount::parse("50.5").unwrap();
/// assert_eq!(a.add(&b).to_fixed(), "150.50");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount {
    value: Decimal,
}

impl Amount {
    /// Parse a decimal string (e.g., "123.45")
    ///
    /// Surrounding whitespace is ignored and an empty string parses to zero.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidFormat`] if the string is not a decimal.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use budgetbot_engine::Amount;
    /// assert_eq!(Amount::parse("100.50").unwrap().to_string(), "100.50");
    /// assert!(Amount::parse("").unwrap().is_zero());
    /// assert!(Amount::parse("ten").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Self::zero());
        }
        Decimal::from_str(trimmed)
            .map(|value| Self { value })
            .map_err(|e| EngineError::InvalidFormat(format!("{:?}: {}", s, e)))
    }

    pub fn new(value: Decimal) -> Self {
        Self { value }
    }

    pub fn zero() -> Self {
        Self {
            value: Decimal::ZERO,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// Strictly greater than zero.
    pub fn is_positive(&self) -> bool {
        self.value > Decimal::ZERO
    }

    pub fn as_decimal(&self) -> Decimal {
        self.value
    }

    /// Checked addition (returns None on overflow)
    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        self.value.checked_add(other.value).map(Self::new)
    }

    /// Checked subtraction (returns None on overflow)
    ///
    /// Balances may legitimately go negative, so a result below zero is
    /// not an error.
    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        self.value.checked_sub(other.value).map(Self::new)
    }

    /// Checked multiplication (returns None on overflow)
    pub fn checked_mul(&self, other: &Self) -> Option<Self> {
        self.value.checked_mul(other.value).map(Self::new)
    }

    /// Checked division (returns None on a zero divisor or overflow)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use budgetbot_engine::Amount;
    /// let amount = Amount::parse("120").unwrap();
    /// let rate = Amount::parse("1.5").unwrap();
    /// assert_eq!(amount.checked_div(&rate).unwrap().to_fixed(), "80.00");
    /// assert!(amount.checked_div(&Amount::zero()).is_none());
    /// ```
    pub fn checked_div(&self, other: &Self) -> Option<Self> {
        self.value.checked_div(other.value).map(Self::new)
    }

    /// Addition clamped to `Decimal::MAX`.
    pub fn add(&self, other: &Self) -> Self {
        self.checked_add(other).unwrap_or(Self {
            value: Decimal::MAX,
        })
    }

    /// Subtraction clamped to `Decimal::MIN`.
    pub fn subtract(&self, other: &Self) -> Self {
        self.checked_sub(other).unwrap_or(Self {
            value: Decimal::MIN,
        })
    }

    pub fn is_greater_than(&self, other: &Self) -> bool {
        self.value > other.value
    }

    /// Numeric equality, ignoring scale (`1.50 == 1.5`).
    pub fn is_equal(&self, other: &Self) -> bool {
        self.value == other.value
    }

    /// Render with exactly two decimal places, rounding half away from zero.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use budgetbot_engine::Amount;
    /// assert_eq!(Amount::parse("70").unwrap().to_fixed(), "70.00");
    /// assert_eq!(Amount::parse("66.665").unwrap().to_fixed(), "66.67");
    /// ```
    pub fn to_fixed(&self) -> String {
        let rounded = self
            .value
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        format!("{:.2}", rounded)
    }
}

impl Default for Amount {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl FromStr for Amount {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Self::new(Decimal::from(value))
    }
}

impl TryFrom<String> for Amount {
    type Error = EngineError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.to_string()
    }
}
