//! Exchange-rate types and the seams the resolver plugs into.

use super::money::{Currency, Money};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Significant digits kept when deriving a rate (e.g. inverting a pair).
/// Generous enough that a derived-rate round trip stays within one minor
/// unit over the full i64 amount range the engine accepts.
pub const RATE_SIGNIFICANT_DIGITS: u32 = 12;

/// Source label attached to same-currency and same-pair resolutions.
pub const IDENTITY_SOURCE: &str = "identity";

/// One persisted rate row. Rows are immutable once written; corrections are
/// inserted as new rows and win by later revision, never by update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub base: Currency,
    pub target: Currency,
    pub date: NaiveDate,
    pub rate: Decimal,
    pub source: String,
}

impl ExchangeRate {
    pub fn new(
        base: Currency,
        target: Currency,
        date: NaiveDate,
        rate: Decimal,
        source: &str,
    ) -> Result<Self, RateError> {
        if rate <= Decimal::ZERO {
            return Err(RateError::InvalidRate { base, target, rate });
        }
        Ok(ExchangeRate {
            base,
            target,
            date,
            rate,
            source: source.to_string(),
        })
    }
}

/// Outcome of a rate resolution, carrying the audit trail the caller needs:
/// the date the rate actually belongs to and whether it is an approximation
/// for the requested date.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRate {
    pub rate: Decimal,
    pub date: NaiveDate,
    pub source: String,
    pub approximated: bool,
}

impl ResolvedRate {
    pub fn identity(date: NaiveDate) -> Self {
        ResolvedRate {
            rate: Decimal::ONE,
            date,
            source: IDENTITY_SOURCE.to_string(),
            approximated: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum RateError {
    #[error("no exchange rate available for {base}->{target} on {date}")]
    Unavailable {
        base: Currency,
        target: Currency,
        date: NaiveDate,
    },
    #[error("non-positive rate {rate} for {base}->{target}")]
    InvalidRate {
        base: Currency,
        target: Currency,
        rate: Decimal,
    },
    #[error("rate storage failure")]
    Storage(#[source] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Rate(#[from] RateError),
    #[error("conversion overflow: {minor} {from} at rate {rate} exceeds minor-unit range")]
    Overflow {
        minor: i64,
        from: Currency,
        rate: Decimal,
    },
}

/// Applies `rate` to an integer minor-unit amount with round-half-to-even,
/// so large aggregations do not drift in one direction.
pub fn apply_rate(money: &Money, rate: Decimal) -> Result<i64, ConvertError> {
    let scaled = Decimal::from(money.minor)
        .checked_mul(rate)
        .ok_or(ConvertError::Overflow {
            minor: money.minor,
            from: money.currency.clone(),
            rate,
        })?;
    scaled
        .round_dp_with_strategy(0, rust_decimal::RoundingStrategy::MidpointNearestEven)
        .to_i64()
        .ok_or(ConvertError::Overflow {
            minor: money.minor,
            from: money.currency.clone(),
            rate,
        })
}

/// External rate feed for a currency pair on a given calendar day. The
/// provider may answer with an earlier date (weekends, holidays); the
/// resolver flags such answers as approximated.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_rate(
        &self,
        base: &Currency,
        target: &Currency,
        date: NaiveDate,
    ) -> Result<ExchangeRate>;
}
