//! Report aggregation: net worth, cashflow and spending buckets, all
//! normalized into a reporting currency. Historical reports convert each
//! transaction at its own date, so re-running a report over the same rate
//! history reproduces it exactly.

use crate::convert::Converter;
use crate::core::account::{Account, AccountId, AccountKind, Transaction, TransactionDirection};
use crate::core::budget::CategoryId;
use crate::core::money::{Currency, Money, MoneyError};
use crate::core::rate::ConvertError;
use chrono::{Datelike, NaiveDate};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// What to do with a value whose rate cannot be resolved: abort the whole
/// report, or skip the line and flag the report incomplete. Never a silent
/// default rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingRatePolicy {
    Fail,
    Skip,
}

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error(transparent)]
    Conversion(#[from] ConvertError),
    #[error(transparent)]
    Money(#[from] MoneyError),
}

#[derive(Debug, Clone)]
pub struct AccountLine {
    pub account_id: AccountId,
    pub name: String,
    pub kind: AccountKind,
    pub original: Money,
    pub converted: Option<Money>,
    pub rate_date: Option<NaiveDate>,
    pub approximated: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NetWorthReport {
    pub as_of: NaiveDate,
    pub currency: Currency,
    pub assets: Money,
    pub liabilities: Money,
    pub net_worth: Money,
    pub lines: Vec<AccountLine>,
    /// True when any line was skipped under `MissingRatePolicy::Skip`.
    pub incomplete: bool,
}

/// One month of converted inflows and outflows. `month` is the first day
/// of the calendar month.
#[derive(Debug, Clone, PartialEq)]
pub struct CashflowBucket {
    pub month: NaiveDate,
    pub inflow_minor: i64,
    pub outflow_minor: i64,
    pub net_minor: i64,
}

#[derive(Debug, Clone)]
pub struct CashflowReport {
    pub currency: Currency,
    pub buckets: Vec<CashflowBucket>,
    pub skipped: usize,
    pub incomplete: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategorySpend {
    pub category_id: Option<CategoryId>,
    pub spent_minor: i64,
}

#[derive(Debug, Clone)]
pub struct SpendingReport {
    pub currency: Currency,
    pub categories: Vec<CategorySpend>,
    pub skipped: usize,
    pub incomplete: bool,
}

pub struct Aggregator {
    converter: Arc<Converter>,
}

impl Aggregator {
    pub fn new(converter: Arc<Converter>) -> Self {
        Aggregator { converter }
    }

    /// Converts every account balance as of `as_of` and totals assets and
    /// liabilities separately.
    pub async fn net_worth(
        &self,
        accounts: &[Account],
        as_of: NaiveDate,
        reporting: &Currency,
        policy: MissingRatePolicy,
    ) -> Result<NetWorthReport, AggregateError> {
        let conversions = join_all(accounts.iter().map(|account| {
            let converter = Arc::clone(&self.converter);
            async move { converter.convert(&account.balance, reporting, as_of).await }
        }))
        .await;

        let mut assets = Money::zero(reporting.clone());
        let mut liabilities = Money::zero(reporting.clone());
        let mut lines = Vec::with_capacity(accounts.len());
        let mut incomplete = false;

        for (account, conversion) in accounts.iter().zip(conversions) {
            match conversion {
                Ok(conversion) => {
                    match account.kind {
                        AccountKind::Asset => assets = assets.checked_add(&conversion.money)?,
                        AccountKind::Liability => {
                            liabilities = liabilities.checked_add(&conversion.money)?
                        }
                    }
                    lines.push(AccountLine {
                        account_id: account.id,
                        name: account.name.clone(),
                        kind: account.kind,
                        original: account.balance.clone(),
                        converted: Some(conversion.money),
                        rate_date: Some(conversion.rate_date),
                        approximated: conversion.approximated,
                        error: None,
                    });
                }
                Err(e) => {
                    if policy == MissingRatePolicy::Fail {
                        return Err(e.into());
                    }
                    debug!(account = %account.name, error = %e, "skipping account in net worth");
                    incomplete = true;
                    lines.push(AccountLine {
                        account_id: account.id,
                        name: account.name.clone(),
                        kind: account.kind,
                        original: account.balance.clone(),
                        converted: None,
                        rate_date: None,
                        approximated: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let net_worth = assets.checked_sub(&liabilities)?;
        Ok(NetWorthReport {
            as_of,
            currency: reporting.clone(),
            assets,
            liabilities,
            net_worth,
            lines,
            incomplete,
        })
    }

    /// Monthly inflow/outflow buckets. Each transaction converts at its
    /// own date, not the report date.
    pub async fn cashflow(
        &self,
        transactions: &[Transaction],
        reporting: &Currency,
        policy: MissingRatePolicy,
    ) -> Result<CashflowReport, AggregateError> {
        let mut buckets: BTreeMap<NaiveDate, (i64, i64)> = BTreeMap::new();
        let mut skipped = 0usize;

        for tx in transactions {
            let minor = match self.converted_minor(tx, reporting, policy).await? {
                Some(minor) => minor,
                None => {
                    skipped += 1;
                    continue;
                }
            };
            let month = tx.date.with_day(1).expect("day 1 is valid for any month");
            let bucket = buckets.entry(month).or_default();
            match tx.direction {
                TransactionDirection::Inflow => bucket.0 += minor,
                TransactionDirection::Outflow => bucket.1 += minor,
            }
        }

        Ok(CashflowReport {
            currency: reporting.clone(),
            buckets: buckets
                .into_iter()
                .map(|(month, (inflow, outflow))| CashflowBucket {
                    month,
                    inflow_minor: inflow,
                    outflow_minor: outflow,
                    net_minor: inflow - outflow,
                })
                .collect(),
            skipped,
            incomplete: skipped > 0,
        })
    }

    /// Outflow totals per category, uncategorized transactions last.
    pub async fn spending_by_category(
        &self,
        transactions: &[Transaction],
        reporting: &Currency,
        policy: MissingRatePolicy,
    ) -> Result<SpendingReport, AggregateError> {
        let mut totals: BTreeMap<Option<CategoryId>, i64> = BTreeMap::new();
        let mut skipped = 0usize;

        for tx in transactions {
            if tx.direction != TransactionDirection::Outflow {
                continue;
            }
            let minor = match self.converted_minor(tx, reporting, policy).await? {
                Some(minor) => minor,
                None => {
                    skipped += 1;
                    continue;
                }
            };
            *totals.entry(tx.category_id).or_default() += minor;
        }

        let mut categories: Vec<CategorySpend> = totals
            .into_iter()
            .map(|(category_id, spent_minor)| CategorySpend {
                category_id,
                spent_minor,
            })
            .collect();
        // None sorts first in a BTreeMap; reports list uncategorized last
        categories.sort_by_key(|c| c.category_id.is_none());

        Ok(SpendingReport {
            currency: reporting.clone(),
            categories,
            skipped,
            incomplete: skipped > 0,
        })
    }

    async fn converted_minor(
        &self,
        tx: &Transaction,
        reporting: &Currency,
        policy: MissingRatePolicy,
    ) -> Result<Option<i64>, AggregateError> {
        match self.converter.convert(&tx.amount, reporting, tx.date).await {
            Ok(conversion) => Ok(Some(conversion.money.minor)),
            Err(e) if policy == MissingRatePolicy::Skip => {
                debug!(tx = %tx.id, error = %e, "skipping transaction in report");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rate::{ExchangeRate, RateError, RateSource};
    use crate::core::store::RateStore;
    use crate::resolver::{RateResolver, ResolverConfig};
    use crate::store::memory::MemoryRateStore;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    struct NoSource;

    #[async_trait]
    impl RateSource for NoSource {
        async fn fetch_rate(
            &self,
            base: &Currency,
            target: &Currency,
            _date: NaiveDate,
        ) -> anyhow::Result<ExchangeRate> {
            Err(anyhow!("no source for {base}->{target}"))
        }
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    async fn aggregator_with(rates: &[ExchangeRate]) -> Aggregator {
        let store = Arc::new(MemoryRateStore::new());
        for rate in rates {
            store.insert(rate).await.unwrap();
        }
        let resolver = Arc::new(RateResolver::new(
            store,
            Arc::new(NoSource),
            ResolverConfig::default(),
        ));
        Aggregator::new(Arc::new(Converter::new(resolver)))
    }

    fn account(name: &str, kind: AccountKind, minor: i64, currency: &str) -> Account {
        Account {
            id: Uuid::new_v4(),
            name: name.to_string(),
            kind,
            balance: Money::new(minor, Currency::new(currency)),
        }
    }

    fn tx(minor: i64, currency: &str, on: &str, direction: TransactionDirection) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            category_id: None,
            date: date(on),
            amount: Money::new(minor, Currency::new(currency)),
            direction,
        }
    }

    #[tokio::test]
    async fn test_net_worth_mixed_currencies() {
        let eur_rate = ExchangeRate::new(
            Currency::new("EUR"),
            Currency::new("USD"),
            date("2024-06-30"),
            dec!(1.1),
            "ecb",
        )
        .unwrap();
        let aggregator = aggregator_with(&[eur_rate]).await;

        let accounts = vec![
            account("checking", AccountKind::Asset, 500_000, "USD"),
            account("savings", AccountKind::Asset, 100_000, "EUR"),
            account("card", AccountKind::Liability, 50_000, "USD"),
        ];
        let report = aggregator
            .net_worth(
                &accounts,
                date("2024-06-30"),
                &Currency::new("USD"),
                MissingRatePolicy::Fail,
            )
            .await
            .unwrap();

        assert_eq!(report.assets.minor, 500_000 + 110_000);
        assert_eq!(report.liabilities.minor, 50_000);
        assert_eq!(report.net_worth.minor, 560_000);
        assert!(!report.incomplete);
        assert!(report.lines.iter().all(|l| l.error.is_none()));
    }

    #[tokio::test]
    async fn test_net_worth_fail_policy_aborts_on_missing_rate() {
        let aggregator = aggregator_with(&[]).await;
        let accounts = vec![account("savings", AccountKind::Asset, 100_000, "EUR")];

        let err = aggregator
            .net_worth(
                &accounts,
                date("2024-06-30"),
                &Currency::new("USD"),
                MissingRatePolicy::Fail,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AggregateError::Conversion(ConvertError::Rate(RateError::Unavailable { .. }))
        ));
    }

    #[tokio::test]
    async fn test_net_worth_skip_policy_flags_incomplete() {
        let aggregator = aggregator_with(&[]).await;
        let accounts = vec![
            account("checking", AccountKind::Asset, 500_000, "USD"),
            account("savings", AccountKind::Asset, 100_000, "EUR"),
        ];

        let report = aggregator
            .net_worth(
                &accounts,
                date("2024-06-30"),
                &Currency::new("USD"),
                MissingRatePolicy::Skip,
            )
            .await
            .unwrap();
        assert!(report.incomplete);
        assert_eq!(report.assets.minor, 500_000);
        assert!(report.lines[1].error.is_some());
        assert_eq!(report.lines[1].converted, None);
    }

    #[tokio::test]
    async fn test_cashflow_buckets_by_month_at_transaction_dates() {
        let rates = [
            ExchangeRate::new(
                Currency::new("EUR"),
                Currency::new("USD"),
                date("2024-01-10"),
                dec!(1.10),
                "ecb",
            )
            .unwrap(),
            ExchangeRate::new(
                Currency::new("EUR"),
                Currency::new("USD"),
                date("2024-02-10"),
                dec!(1.20),
                "ecb",
            )
            .unwrap(),
        ];
        let aggregator = aggregator_with(&rates).await;

        let transactions = vec![
            tx(100_000, "EUR", "2024-01-10", TransactionDirection::Inflow),
            tx(40_000, "EUR", "2024-01-10", TransactionDirection::Outflow),
            tx(100_000, "EUR", "2024-02-10", TransactionDirection::Inflow),
        ];
        let report = aggregator
            .cashflow(&transactions, &Currency::new("USD"), MissingRatePolicy::Fail)
            .await
            .unwrap();

        // same EUR amount converts differently in each month: the rate of
        // the transaction date applies, not the report date
        assert_eq!(report.buckets.len(), 2);
        assert_eq!(report.buckets[0].month, date("2024-01-01"));
        assert_eq!(report.buckets[0].inflow_minor, 110_000);
        assert_eq!(report.buckets[0].outflow_minor, 44_000);
        assert_eq!(report.buckets[0].net_minor, 66_000);
        assert_eq!(report.buckets[1].inflow_minor, 120_000);

        // identical rerun is identical output
        let again = aggregator
            .cashflow(&transactions, &Currency::new("USD"), MissingRatePolicy::Fail)
            .await
            .unwrap();
        assert_eq!(again.buckets, report.buckets);
    }

    #[tokio::test]
    async fn test_spending_by_category_outflows_only() {
        let aggregator = aggregator_with(&[]).await;
        let groceries = Uuid::new_v4();

        let mut t1 = tx(10_000, "USD", "2024-01-05", TransactionDirection::Outflow);
        t1.category_id = Some(groceries);
        let mut t2 = tx(5_000, "USD", "2024-01-20", TransactionDirection::Outflow);
        t2.category_id = Some(groceries);
        let t3 = tx(2_500, "USD", "2024-01-21", TransactionDirection::Outflow);
        let inflow = tx(99_000, "USD", "2024-01-22", TransactionDirection::Inflow);

        let report = aggregator
            .spending_by_category(
                &[t1, t2, t3, inflow],
                &Currency::new("USD"),
                MissingRatePolicy::Fail,
            )
            .await
            .unwrap();

        assert_eq!(report.categories.len(), 2);
        assert_eq!(report.categories[0].category_id, Some(groceries));
        assert_eq!(report.categories[0].spent_minor, 15_000);
        // uncategorized listed last
        assert_eq!(report.categories[1].category_id, None);
        assert_eq!(report.categories[1].spent_minor, 2_500);
    }
}
