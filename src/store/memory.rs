//! In-memory backends for the persistence seams. Primary store in tests,
//! and the budget/debt backend of the CLI process.

use crate::core::budget::{Budget, BudgetError, BudgetId, BudgetStatus, HouseholdId};
use crate::core::debt::{Debt, DebtError, DebtId, DebtPayment, PaymentReceipt};
use crate::core::money::Currency;
use crate::core::rate::ExchangeRate;
use crate::core::store::{BudgetRepository, DebtRepository, RateStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Append-only list of rate rows. Insertion order doubles as revision
/// priority: the latest row for a (base, target, date) wins reads.
pub struct MemoryRateStore {
    rows: Mutex<Vec<ExchangeRate>>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        MemoryRateStore {
            rows: Mutex::new(Vec::new()),
        }
    }
}

impl Default for MemoryRateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn insert(&self, rate: &ExchangeRate) -> Result<()> {
        let mut rows = self.rows.lock().await;
        let exists = rows.iter().any(|r| {
            r.base == rate.base
                && r.target == rate.target
                && r.date == rate.date
                && r.source == rate.source
        });
        if exists {
            // rows are immutable; one row per (base, target, date, source)
            debug!(base = %rate.base, target = %rate.target, date = %rate.date, "rate row already present");
            return Ok(());
        }
        rows.push(rate.clone());
        Ok(())
    }

    async fn find_exact(
        &self,
        base: &Currency,
        target: &Currency,
        date: NaiveDate,
    ) -> Result<Option<ExchangeRate>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .filter(|r| r.base == *base && r.target == *target && r.date == date)
            .next_back()
            .cloned())
    }

    async fn find_latest_before(
        &self,
        base: &Currency,
        target: &Currency,
        date: NaiveDate,
        earliest: NaiveDate,
    ) -> Result<Option<ExchangeRate>> {
        let rows = self.rows.lock().await;
        let mut best: Option<&ExchangeRate> = None;
        for row in rows
            .iter()
            .filter(|r| r.base == *base && r.target == *target)
            .filter(|r| r.date >= earliest && r.date <= date)
        {
            // later insertion wins a date tie
            if best.map(|b| row.date >= b.date).unwrap_or(true) {
                best = Some(row);
            }
        }
        Ok(best.cloned())
    }

    async fn find_range(
        &self,
        base: &Currency,
        target: &Currency,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ExchangeRate>> {
        let rows = self.rows.lock().await;
        let mut winners: std::collections::BTreeMap<NaiveDate, &ExchangeRate> =
            std::collections::BTreeMap::new();
        for row in rows
            .iter()
            .filter(|r| r.base == *base && r.target == *target)
            .filter(|r| r.date >= start && r.date <= end)
        {
            winners.insert(row.date, row);
        }
        Ok(winners.into_values().cloned().collect())
    }
}

/// Budget storage with the activation check-and-set done under one lock,
/// which is what makes concurrent overlapping activations mutually
/// exclusive.
pub struct MemoryBudgetRepository {
    budgets: Mutex<HashMap<BudgetId, Budget>>,
}

impl MemoryBudgetRepository {
    pub fn new() -> Self {
        MemoryBudgetRepository {
            budgets: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryBudgetRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BudgetRepository for MemoryBudgetRepository {
    async fn get(&self, id: BudgetId) -> Result<Option<Budget>, BudgetError> {
        Ok(self.budgets.lock().await.get(&id).cloned())
    }

    async fn save(&self, budget: &Budget) -> Result<(), BudgetError> {
        self.budgets.lock().await.insert(budget.id, budget.clone());
        Ok(())
    }

    async fn list_for_household(
        &self,
        household_id: HouseholdId,
    ) -> Result<Vec<Budget>, BudgetError> {
        let budgets = self.budgets.lock().await;
        let mut found: Vec<Budget> = budgets
            .values()
            .filter(|b| b.household_id == household_id)
            .cloned()
            .collect();
        found.sort_by_key(|b| (b.period.start, b.id));
        Ok(found)
    }

    async fn activate(&self, id: BudgetId) -> Result<Budget, BudgetError> {
        let mut budgets = self.budgets.lock().await;
        let budget = budgets
            .get(&id)
            .cloned()
            .ok_or(BudgetError::NotFound { budget_id: id })?;

        if budget.status != BudgetStatus::Draft {
            return Err(BudgetError::InvalidTransition {
                budget_id: id,
                from: budget.status,
                to: BudgetStatus::Active,
            });
        }
        if let Some(conflict) = budgets.values().find(|other| {
            other.id != id
                && other.household_id == budget.household_id
                && other.status == BudgetStatus::Active
                && other.period.overlaps(&budget.period)
        }) {
            return Err(BudgetError::PeriodOverlap {
                budget_id: id,
                conflicting_id: conflict.id,
                start: conflict.period.start,
                end: conflict.period.end,
            });
        }

        let mut activated = budget;
        activated.status = BudgetStatus::Active;
        budgets.insert(id, activated.clone());
        Ok(activated)
    }
}

/// Debt storage with one lock per debt: appends on a single debt are
/// serialized, appends on different debts run in parallel.
pub struct MemoryDebtRepository {
    debts: Mutex<HashMap<DebtId, Arc<Mutex<Debt>>>>,
}

impl MemoryDebtRepository {
    pub fn new() -> Self {
        MemoryDebtRepository {
            debts: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryDebtRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DebtRepository for MemoryDebtRepository {
    async fn get(&self, id: DebtId) -> Result<Option<Debt>, DebtError> {
        let debts = self.debts.lock().await;
        match debts.get(&id) {
            Some(slot) => Ok(Some(slot.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn create(&self, debt: &Debt) -> Result<(), DebtError> {
        self.debts
            .lock()
            .await
            .insert(debt.id, Arc::new(Mutex::new(debt.clone())));
        Ok(())
    }

    async fn append_payment(
        &self,
        id: DebtId,
        payment: DebtPayment,
    ) -> Result<PaymentReceipt, DebtError> {
        let slot = {
            let debts = self.debts.lock().await;
            debts
                .get(&id)
                .cloned()
                .ok_or(DebtError::NotFound { debt_id: id })?
        };
        let mut debt = slot.lock().await;
        let overpayment_minor = debt.apply(payment);
        Ok(PaymentReceipt {
            debt: debt.clone(),
            overpayment_minor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn rate(date_s: &str, value: rust_decimal::Decimal, source: &str) -> ExchangeRate {
        ExchangeRate::new(
            Currency::new("USD"),
            Currency::new("IDR"),
            date(date_s),
            value,
            source,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_row_is_ignored() {
        let store = MemoryRateStore::new();
        store
            .insert(&rate("2024-01-15", dec!(15700), "ecb"))
            .await
            .unwrap();
        store
            .insert(&rate("2024-01-15", dec!(99999), "ecb"))
            .await
            .unwrap();

        let found = store
            .find_exact(
                &Currency::new("USD"),
                &Currency::new("IDR"),
                date("2024-01-15"),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.rate, dec!(15700));
    }

    #[tokio::test]
    async fn test_correction_from_other_source_wins() {
        let store = MemoryRateStore::new();
        store
            .insert(&rate("2024-01-15", dec!(15700), "ecb"))
            .await
            .unwrap();
        store
            .insert(&rate("2024-01-15", dec!(15720), "ecb-corrected"))
            .await
            .unwrap();

        let found = store
            .find_exact(
                &Currency::new("USD"),
                &Currency::new("IDR"),
                date("2024-01-15"),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.rate, dec!(15720));
        assert_eq!(found.source, "ecb-corrected");
    }

    #[tokio::test]
    async fn test_latest_before_respects_window() {
        let store = MemoryRateStore::new();
        store
            .insert(&rate("2024-01-08", dec!(15600), "ecb"))
            .await
            .unwrap();
        store
            .insert(&rate("2024-01-12", dec!(15650), "ecb"))
            .await
            .unwrap();

        let found = store
            .find_latest_before(
                &Currency::new("USD"),
                &Currency::new("IDR"),
                date("2024-01-15"),
                date("2024-01-10"),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.date, date("2024-01-12"));

        let none = store
            .find_latest_before(
                &Currency::new("USD"),
                &Currency::new("IDR"),
                date("2024-01-15"),
                date("2024-01-13"),
            )
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_range_returns_one_winner_per_date() {
        let store = MemoryRateStore::new();
        store
            .insert(&rate("2024-01-10", dec!(15600), "ecb"))
            .await
            .unwrap();
        store
            .insert(&rate("2024-01-11", dec!(15650), "ecb"))
            .await
            .unwrap();
        store
            .insert(&rate("2024-01-11", dec!(15660), "ecb-corrected"))
            .await
            .unwrap();

        let rows = store
            .find_range(
                &Currency::new("USD"),
                &Currency::new("IDR"),
                date("2024-01-01"),
                date("2024-01-31"),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, date("2024-01-10"));
        assert_eq!(rows[1].rate, dec!(15660));
    }
}
