//! Persistence seams. The engine only ever sees these traits; backends live
//! under `crate::store`.

use super::budget::{Budget, BudgetError, BudgetId, HouseholdId};
use super::debt::{Debt, DebtError, DebtId, DebtPayment, PaymentReceipt};
use super::money::Currency;
use super::rate::ExchangeRate;
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Durable history of exchange-rate rows. Rows are immutable; `insert` of an
/// already-present (base, target, date, source) row is a no-op, and reads of
/// a date with several rows return the latest-inserted one.
#[async_trait]
pub trait RateStore: Send + Sync {
    async fn insert(&self, rate: &ExchangeRate) -> Result<()>;

    async fn find_exact(
        &self,
        base: &Currency,
        target: &Currency,
        date: NaiveDate,
    ) -> Result<Option<ExchangeRate>>;

    /// Latest row with `earliest <= row.date <= date`.
    async fn find_latest_before(
        &self,
        base: &Currency,
        target: &Currency,
        date: NaiveDate,
        earliest: NaiveDate,
    ) -> Result<Option<ExchangeRate>>;

    /// Winning row per date in `[start, end]`, ascending by date.
    async fn find_range(
        &self,
        base: &Currency,
        target: &Currency,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ExchangeRate>>;
}

/// Budget persistence. `activate` is the one operation that must be atomic:
/// the overlap check and the status flip happen under a single transaction
/// (or lock), so two concurrent activations of overlapping periods cannot
/// both pass the check.
#[async_trait]
pub trait BudgetRepository: Send + Sync {
    async fn get(&self, id: BudgetId) -> Result<Option<Budget>, BudgetError>;

    async fn save(&self, budget: &Budget) -> Result<(), BudgetError>;

    async fn list_for_household(
        &self,
        household_id: HouseholdId,
    ) -> Result<Vec<Budget>, BudgetError>;

    /// Atomic check-and-set: Draft -> Active iff no other Active budget of
    /// the same household overlaps the period.
    async fn activate(&self, id: BudgetId) -> Result<Budget, BudgetError>;
}

/// Debt persistence. Payment appends on one debt are serialized by the
/// backend; appends on different debts may run in parallel.
#[async_trait]
pub trait DebtRepository: Send + Sync {
    async fn get(&self, id: DebtId) -> Result<Option<Debt>, DebtError>;

    async fn create(&self, debt: &Debt) -> Result<(), DebtError>;

    async fn append_payment(
        &self,
        id: DebtId,
        payment: DebtPayment,
    ) -> Result<PaymentReceipt, DebtError>;
}
