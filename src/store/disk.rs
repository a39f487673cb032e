//! Durable exchange-rate store on fjall. Keys are
//! `base:target:date:seq:source` so a prefix scan walks a pair's history in
//! date order, with the per-date sequence number deciding which row wins
//! when a correction was inserted later.

use crate::core::money::Currency;
use crate::core::rate::ExchangeRate;
use crate::core::store::RateStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

pub struct FjallRateStore {
    _keyspace: Keyspace,
    partition: PartitionHandle,
}

impl FjallRateStore {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create rate store directory: {}", path.display()))?;
        let keyspace = fjall::Config::new(path)
            .open()
            .with_context(|| format!("Failed to open rate store at {}", path.display()))?;
        let partition = keyspace
            .open_partition("rates", PartitionCreateOptions::default())
            .context("Failed to open rates partition")?;
        Ok(FjallRateStore {
            _keyspace: keyspace,
            partition,
        })
    }

    fn pair_prefix(base: &Currency, target: &Currency) -> String {
        format!("{base}:{target}:")
    }

    fn date_prefix(base: &Currency, target: &Currency, date: NaiveDate) -> String {
        format!("{base}:{target}:{date}:")
    }

    fn decode(value: &[u8]) -> Result<ExchangeRate> {
        serde_json::from_slice(value).context("Corrupt rate row in store")
    }

    fn date_rows(
        &self,
        base: &Currency,
        target: &Currency,
        date: NaiveDate,
    ) -> Result<Vec<ExchangeRate>> {
        let mut rows = Vec::new();
        for item in self.partition.prefix(Self::date_prefix(base, target, date)) {
            let (_, value) = item.context("Rate store scan failed")?;
            rows.push(Self::decode(&value)?);
        }
        Ok(rows)
    }
}

#[async_trait]
impl RateStore for FjallRateStore {
    async fn insert(&self, rate: &ExchangeRate) -> Result<()> {
        let existing = self.date_rows(&rate.base, &rate.target, rate.date)?;
        if existing.iter().any(|r| r.source == rate.source) {
            // rows are immutable; one row per (base, target, date, source)
            debug!(base = %rate.base, target = %rate.target, date = %rate.date, "rate row already present");
            return Ok(());
        }
        let key = format!(
            "{}:{}:{}:{:06}:{}",
            rate.base,
            rate.target,
            rate.date,
            existing.len(),
            rate.source
        );
        let value = serde_json::to_vec(rate).context("Failed to encode rate row")?;
        self.partition
            .insert(key, value)
            .context("Rate store write failed")?;
        Ok(())
    }

    async fn find_exact(
        &self,
        base: &Currency,
        target: &Currency,
        date: NaiveDate,
    ) -> Result<Option<ExchangeRate>> {
        // highest sequence number, i.e. the latest correction, wins
        Ok(self.date_rows(base, target, date)?.pop())
    }

    async fn find_latest_before(
        &self,
        base: &Currency,
        target: &Currency,
        date: NaiveDate,
        earliest: NaiveDate,
    ) -> Result<Option<ExchangeRate>> {
        for item in self.partition.prefix(Self::pair_prefix(base, target)).rev() {
            let (_, value) = item.context("Rate store scan failed")?;
            let row = Self::decode(&value)?;
            if row.date > date {
                continue;
            }
            if row.date < earliest {
                return Ok(None);
            }
            return Ok(Some(row));
        }
        Ok(None)
    }

    async fn find_range(
        &self,
        base: &Currency,
        target: &Currency,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ExchangeRate>> {
        let mut winners: BTreeMap<NaiveDate, ExchangeRate> = BTreeMap::new();
        for item in self.partition.prefix(Self::pair_prefix(base, target)) {
            let (_, value) = item.context("Rate store scan failed")?;
            let row = Self::decode(&value)?;
            if row.date >= start && row.date <= end {
                winners.insert(row.date, row);
            }
        }
        Ok(winners.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn usd() -> Currency {
        Currency::new("USD")
    }

    fn idr() -> Currency {
        Currency::new("IDR")
    }

    fn rate(date_s: &str, value: rust_decimal::Decimal, source: &str) -> ExchangeRate {
        ExchangeRate::new(usd(), idr(), date(date_s), value, source).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_exact_lookup() {
        let dir = tempdir().unwrap();
        let store = FjallRateStore::open(dir.path()).unwrap();
        store
            .insert(&rate("2024-01-15", dec!(15700), "ecb"))
            .await
            .unwrap();

        let found = store
            .find_exact(&usd(), &idr(), date("2024-01-15"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.rate, dec!(15700));
        assert_eq!(found.source, "ecb");

        let missing = store
            .find_exact(&usd(), &idr(), date("2024-01-16"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_later_correction_wins_exact_lookup() {
        let dir = tempdir().unwrap();
        let store = FjallRateStore::open(dir.path()).unwrap();
        store
            .insert(&rate("2024-01-15", dec!(15700), "ecb"))
            .await
            .unwrap();
        store
            .insert(&rate("2024-01-15", dec!(15720), "ecb-corrected"))
            .await
            .unwrap();
        // same source again is a no-op, rows are immutable
        store
            .insert(&rate("2024-01-15", dec!(1), "ecb"))
            .await
            .unwrap();

        let found = store
            .find_exact(&usd(), &idr(), date("2024-01-15"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.rate, dec!(15720));
    }

    #[tokio::test]
    async fn test_latest_before_walks_back_within_window() {
        let dir = tempdir().unwrap();
        let store = FjallRateStore::open(dir.path()).unwrap();
        store
            .insert(&rate("2024-01-08", dec!(15600), "ecb"))
            .await
            .unwrap();
        store
            .insert(&rate("2024-01-12", dec!(15650), "ecb"))
            .await
            .unwrap();

        let found = store
            .find_latest_before(&usd(), &idr(), date("2024-01-15"), date("2024-01-08"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.date, date("2024-01-12"));

        let none = store
            .find_latest_before(&usd(), &idr(), date("2024-01-07"), date("2024-01-01"))
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_range_is_date_ordered_winners() {
        let dir = tempdir().unwrap();
        let store = FjallRateStore::open(dir.path()).unwrap();
        store
            .insert(&rate("2024-01-12", dec!(15650), "ecb"))
            .await
            .unwrap();
        store
            .insert(&rate("2024-01-10", dec!(15600), "ecb"))
            .await
            .unwrap();
        store
            .insert(&rate("2024-01-10", dec!(15610), "ecb-corrected"))
            .await
            .unwrap();

        let rows = store
            .find_range(&usd(), &idr(), date("2024-01-01"), date("2024-01-31"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, date("2024-01-10"));
        assert_eq!(rows[0].rate, dec!(15610));
        assert_eq!(rows[1].date, date("2024-01-12"));
    }

    #[tokio::test]
    async fn test_rows_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = FjallRateStore::open(dir.path()).unwrap();
            store
                .insert(&rate("2024-01-15", dec!(15700), "ecb"))
                .await
                .unwrap();
        }
        let store = FjallRateStore::open(dir.path()).unwrap();
        let found = store
            .find_exact(&usd(), &idr(), date("2024-01-15"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.rate, dec!(15700));
    }
}
