use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of decimal places every amount is kept at.
const SCALE: u32 = 2;

/// Error returned when a string cannot be parsed as an amount.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid amount: {input}")]
pub struct MoneyParseError {
    pub input: String,
}

/// Fixed-point monetary amount with two decimal places.
///
/// Serializes as a decimal string (`"4.00"`) and accepts either strings or
/// JSON numbers on input, since payment gateways send both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Creates an amount from a decimal value, rounding to two places.
    pub fn new(value: Decimal) -> Self {
        let mut value = value;
        value.rescale(SCALE);
        Self(value)
    }

    /// Creates an amount from a whole number of cents.
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, SCALE))
    }

    /// Returns zero.
    pub fn zero() -> Self {
        Self::from_cents(0)
    }

    /// Returns the underlying decimal value.
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is below zero.
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money::new(self.0 * Decimal::from(quantity))
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl FromStr for Money {
    type Err = MoneyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim())
            .map(Money::new)
            .map_err(|_| MoneyParseError {
                input: s.to_string(),
            })
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money::new(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money::new(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_cents_keeps_two_places() {
        assert_eq!(Money::from_cents(400).to_string(), "4.00");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
    }

    #[test]
    fn parse_rescales_to_two_places() {
        assert_eq!("4".parse::<Money>().unwrap().to_string(), "4.00");
        assert_eq!("10.5".parse::<Money>().unwrap().to_string(), "10.50");
        assert_eq!(" 2.00 ".parse::<Money>().unwrap(), Money::from_cents(200));
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = "ten dollars".parse::<Money>().unwrap_err();
        assert_eq!(err.input, "ten dollars");
    }

    #[test]
    fn multiply_by_quantity() {
        let unit = Money::from_cents(200);
        assert_eq!(unit.multiply(2), Money::from_cents(400));
        assert_eq!(unit.multiply(0), Money::zero());
    }

    #[test]
    fn sum_of_amounts() {
        let total: Money = [150, 250, 1].into_iter().map(Money::from_cents).sum();
        assert_eq!(total, Money::from_cents(401));
    }

    #[test]
    fn negative_detection() {
        assert!((Money::from_cents(100) - Money::from_cents(200)).is_negative());
        assert!(!Money::zero().is_negative());
    }

    #[test]
    fn serializes_as_string_and_accepts_numbers() {
        let json = serde_json::to_string(&Money::from_cents(400)).unwrap();
        assert_eq!(json, "\"4.00\"");

        let from_str: Money = serde_json::from_str("\"4.00\"").unwrap();
        let from_num: Money = serde_json::from_str("4").unwrap();
        assert_eq!(from_str, from_num);
        assert_eq!(from_num.to_string(), "4.00");
    }
}
