//! Monetary value types. Amounts are integer minor units, never floats.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Uppercase ISO-4217 style currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> Self {
        Currency(code.trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Currency {
    fn from(code: &str) -> Self {
        Currency::new(code)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: Currency, right: Currency },
    #[error("amount overflow combining {left_minor} and {right_minor} {currency}")]
    Overflow {
        left_minor: i64,
        right_minor: i64,
        currency: Currency,
    },
}

/// An amount of money in a single currency, stored as signed minor units.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub minor: i64,
    pub currency: Currency,
}

impl Money {
    pub fn new(minor: i64, currency: Currency) -> Self {
        Money { minor, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Money { minor: 0, currency }
    }

    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }

    pub fn negate(&self) -> Money {
        Money {
            minor: -self.minor,
            currency: self.currency.clone(),
        }
    }

    /// Adds two amounts of the same currency, rejecting cross-currency sums
    /// and i64 overflow.
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency.clone(),
                right: other.currency.clone(),
            });
        }
        let minor = self
            .minor
            .checked_add(other.minor)
            .ok_or_else(|| MoneyError::Overflow {
                left_minor: self.minor,
                right_minor: other.minor,
                currency: self.currency.clone(),
            })?;
        Ok(Money {
            minor,
            currency: self.currency.clone(),
        })
    }

    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.checked_add(&other.negate())
    }

    /// Ordering is only defined within one currency.
    pub fn compare(&self, other: &Money) -> Result<Ordering, MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency.clone(),
                right: other.currency.clone(),
            });
        }
        Ok(self.minor.cmp(&other.minor))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.minor, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd(minor: i64) -> Money {
        Money::new(minor, Currency::new("USD"))
    }

    #[test]
    fn test_currency_normalizes_code() {
        assert_eq!(Currency::new(" usd ").as_str(), "USD");
        assert_eq!(Currency::new("idr"), Currency::new("IDR"));
    }

    #[test]
    fn test_add_same_currency() {
        let sum = usd(1500).checked_add(&usd(-300)).unwrap();
        assert_eq!(sum, usd(1200));
    }

    #[test]
    fn test_add_currency_mismatch() {
        let err = usd(100)
            .checked_add(&Money::new(100, Currency::new("EUR")))
            .unwrap_err();
        assert_eq!(
            err,
            MoneyError::CurrencyMismatch {
                left: Currency::new("USD"),
                right: Currency::new("EUR"),
            }
        );
    }

    #[test]
    fn test_add_overflow() {
        let err = usd(i64::MAX).checked_add(&usd(1)).unwrap_err();
        assert!(matches!(err, MoneyError::Overflow { .. }));
    }

    #[test]
    fn test_negate_and_zero() {
        assert_eq!(usd(250).negate(), usd(-250));
        assert!(Money::zero(Currency::new("USD")).is_zero());
        assert!(!usd(1).is_zero());
    }

    #[test]
    fn test_compare_same_currency_only() {
        assert_eq!(usd(100).compare(&usd(200)).unwrap(), Ordering::Less);
        assert!(
            usd(100)
                .compare(&Money::new(100, Currency::new("EUR")))
                .is_err()
        );
    }
}
