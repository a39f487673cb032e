//! Currency conversion over resolved rates. Rounds half-to-even and hands
//! the rate provenance back to the caller, so no conversion is silently
//! lossy.

use crate::core::money::{Currency, Money};
use crate::core::rate::{self, ConvertError, ResolvedRate};
use crate::resolver::RateResolver;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

/// A converted amount plus the audit trail of the rate that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub money: Money,
    pub rate: Decimal,
    pub rate_date: NaiveDate,
    pub source: String,
    pub approximated: bool,
}

impl Conversion {
    fn unchanged(money: Money, on: NaiveDate) -> Self {
        Conversion {
            money,
            rate: Decimal::ONE,
            rate_date: on,
            source: rate::IDENTITY_SOURCE.to_string(),
            approximated: false,
        }
    }
}

pub struct Converter {
    resolver: Arc<RateResolver>,
}

impl Converter {
    pub fn new(resolver: Arc<RateResolver>) -> Self {
        Converter { resolver }
    }

    pub fn resolver(&self) -> &RateResolver {
        &self.resolver
    }

    /// Converts `money` into `to` using the rate for `on`. Same-currency
    /// conversions return the amount unchanged without a rate lookup.
    pub async fn convert(
        &self,
        money: &Money,
        to: &Currency,
        on: NaiveDate,
    ) -> Result<Conversion, ConvertError> {
        if money.currency == *to {
            debug!(%money, "conversion is identity, no rate lookup");
            return Ok(Conversion::unchanged(money.clone(), on));
        }

        let resolved: ResolvedRate = self.resolver.resolve(&money.currency, to, on).await?;
        let minor = rate::apply_rate(money, resolved.rate)?;
        debug!(
            from = %money, to = %to, rate = %resolved.rate, rate_date = %resolved.date,
            approximated = resolved.approximated, "converted"
        );

        Ok(Conversion {
            money: Money::new(minor, to.clone()),
            rate: resolved.rate,
            rate_date: resolved.date,
            source: resolved.source,
            approximated: resolved.approximated,
        })
    }
}
