use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when parsing an invalid currency code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid currency code: {0:?}")]
pub struct CurrencyError(pub String);

/// ISO 4217 style three-letter currency code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    /// Turkish lira, the default currency of the platform.
    pub const TRY: Currency = Currency(*b"TRY");

    /// Parses a three-letter uppercase ASCII code.
    pub fn parse(code: &str) -> Result<Self, CurrencyError> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_uppercase()) {
            return Err(CurrencyError(code.to_string()));
        }
        Ok(Self([bytes[0], bytes[1], bytes[2]]))
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        // The constructor only accepts ASCII uppercase.
        std::str::from_utf8(&self.0).expect("currency code is ASCII")
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::TRY
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for Currency {
    type Error = CurrencyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(c: Currency) -> Self {
        c.as_str().to_string()
    }
}

/// A monetary amount with its currency.
///
/// Amounts are kept at two decimal places; every constructor rounds
/// half-away-from-zero, so `Money` values compare exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    /// Creates a new amount, rounding to two decimal places.
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self {
            amount: round2(amount),
            currency,
        }
    }

    /// Zero in the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    /// Returns the rounded amount.
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Returns the currency.
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Treats `self` as a unit price and returns the rounded line total
    /// for `quantity` units.
    pub fn line_total(&self, quantity: u32) -> Money {
        Money::new(self.amount * Decimal::from(quantity), self.currency)
    }

    /// Adds two amounts; `None` if the currencies differ.
    pub fn plus(&self, other: Money) -> Option<Money> {
        if self.currency != other.currency {
            return None;
        }
        Some(Money::new(self.amount + other.amount, self.currency))
    }

    /// Returns true if the amount is strictly positive.
    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn parse_valid_currency() {
        assert_eq!(Currency::parse("TRY").unwrap(), Currency::TRY);
        assert_eq!(Currency::parse("USD").unwrap().as_str(), "USD");
    }

    #[test]
    fn parse_invalid_currency() {
        assert!(Currency::parse("tr").is_err());
        assert!(Currency::parse("try").is_err());
        assert!(Currency::parse("TRYX").is_err());
        assert!(Currency::parse("T1Y").is_err());
    }

    #[test]
    fn new_rounds_half_away_from_zero() {
        assert_eq!(Money::new(dec("100.005"), Currency::TRY).amount(), dec("100.01"));
        assert_eq!(Money::new(dec("-100.005"), Currency::TRY).amount(), dec("-100.01"));
        assert_eq!(Money::new(dec("100.004"), Currency::TRY).amount(), dec("100.00"));
    }

    #[test]
    fn line_total_rounds_once() {
        // 33.335 * 3 = 100.005 -> 100.01
        let unit = Money::new(dec("33.335"), Currency::TRY);
        // unit is rounded to 33.34 on construction, so 3 * 33.34 = 100.02
        assert_eq!(unit.line_total(3).amount(), dec("100.02"));

        let unit = Money::new(dec("60"), Currency::TRY);
        assert_eq!(unit.line_total(2).amount(), dec("120.00"));
    }

    #[test]
    fn plus_requires_matching_currency() {
        let a = Money::new(dec("10"), Currency::TRY);
        let b = Money::new(dec("5"), Currency::TRY);
        let c = Money::new(dec("5"), Currency::parse("USD").unwrap());

        assert_eq!(a.plus(b).unwrap().amount(), dec("15.00"));
        assert!(a.plus(c).is_none());
    }

    #[test]
    fn serialization_uses_camel_case() {
        let m = Money::new(dec("120"), Currency::TRY);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["currency"], "TRY");
        assert!(json.get("amount").is_some());

        let back: Money = serde_json::from_value(json).unwrap();
        assert_eq!(back, m);
    }
}
