//! Budget lifecycle management: activation with overlap protection, spend
//! recording, progress reporting and advisory allocation recommendations.

use crate::convert::Converter;
use crate::core::budget::{
    Budget, BudgetError, BudgetId, BudgetPeriod, BudgetStatus, CategoryAllocation, CategoryId,
    HouseholdId,
};
use crate::core::money::{Currency, Money};
use crate::core::store::BudgetRepository;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct BudgetManagerConfig {
    /// When false (strict mode), lowering an allocation below what is
    /// already spent is rejected.
    pub allow_overspend_reallocation: bool,
}

impl Default for BudgetManagerConfig {
    fn default() -> Self {
        BudgetManagerConfig {
            allow_overspend_reallocation: false,
        }
    }
}

pub struct BudgetManager {
    repo: Arc<dyn BudgetRepository>,
    converter: Arc<Converter>,
    config: BudgetManagerConfig,
}

impl BudgetManager {
    pub fn new(
        repo: Arc<dyn BudgetRepository>,
        converter: Arc<Converter>,
        config: BudgetManagerConfig,
    ) -> Self {
        BudgetManager {
            repo,
            converter,
            config,
        }
    }

    pub async fn create_draft(
        &self,
        household_id: HouseholdId,
        name: &str,
        currency: Currency,
        period: BudgetPeriod,
        allocations: &[(CategoryId, i64)],
    ) -> Result<Budget, BudgetError> {
        let mut budget = Budget::draft(household_id, name, currency, period);
        for (category_id, allocated_minor) in allocations {
            budget.add_allocation(*category_id, *allocated_minor)?;
        }
        self.repo.save(&budget).await?;
        info!(budget_id = %budget.id, name, "created draft budget");
        Ok(budget)
    }

    /// Loads a budget, lazily transitioning Active past its end date to
    /// Expired and persisting the flip. There is no background timer; this
    /// read path is where expiry happens.
    pub async fn get(&self, id: BudgetId, today: NaiveDate) -> Result<Budget, BudgetError> {
        let mut budget = self
            .repo
            .get(id)
            .await?
            .ok_or(BudgetError::NotFound { budget_id: id })?;
        if budget.status == BudgetStatus::Active && budget.period.has_ended_by(today) {
            debug!(budget_id = %id, end = %budget.period.end, "lazily expiring budget");
            budget.status = BudgetStatus::Expired;
            self.repo.save(&budget).await?;
        }
        Ok(budget)
    }

    /// Draft -> Active. The overlap check against other Active budgets of
    /// the household runs atomically inside the repository, so two
    /// concurrent activations with overlapping periods cannot both win.
    pub async fn activate(&self, id: BudgetId) -> Result<Budget, BudgetError> {
        let budget = self
            .repo
            .get(id)
            .await?
            .ok_or(BudgetError::NotFound { budget_id: id })?;
        // periods are validated at construction; re-check before going live
        BudgetPeriod::new(budget.period.start, budget.period.end)?;
        let activated = self.repo.activate(id).await?;
        info!(budget_id = %id, start = %activated.period.start, end = %activated.period.end, "budget activated");
        Ok(activated)
    }

    /// Expired -> Archived, or Draft -> Archived (cancellation).
    pub async fn archive(&self, id: BudgetId, today: NaiveDate) -> Result<Budget, BudgetError> {
        let mut budget = self.get(id, today).await?;
        match budget.status {
            BudgetStatus::Expired | BudgetStatus::Draft => {
                budget.status = BudgetStatus::Archived;
                self.repo.save(&budget).await?;
                Ok(budget)
            }
            status => Err(BudgetError::InvalidTransition {
                budget_id: id,
                from: status,
                to: BudgetStatus::Archived,
            }),
        }
    }

    /// Records a spend against one allocation, converting the amount into
    /// the budget's currency at `today`'s rate.
    pub async fn record_spend(
        &self,
        id: BudgetId,
        category_id: CategoryId,
        amount: &Money,
        today: NaiveDate,
    ) -> Result<CategoryAllocation, BudgetError> {
        let mut budget = self
            .repo
            .get(id)
            .await?
            .ok_or(BudgetError::NotFound { budget_id: id })?;

        if budget.allocation(category_id).is_none() {
            return Err(BudgetError::CategoryNotFound {
                budget_id: id,
                category_id,
            });
        }
        if budget.status != BudgetStatus::Active {
            return Err(BudgetError::Inactive {
                budget_id: id,
                status: budget.status,
            });
        }
        if budget.period.has_ended_by(today) {
            // not yet lazily transitioned; do it now and report the expiry
            budget.status = BudgetStatus::Expired;
            self.repo.save(&budget).await?;
            return Err(BudgetError::PeriodExpired {
                budget_id: id,
                end: budget.period.end,
                on: today,
            });
        }

        let conversion = self
            .converter
            .convert(amount, &budget.currency, today)
            .await?;
        let allocation = budget
            .allocation_mut(category_id)
            .expect("allocation checked above");
        allocation.spent_minor += conversion.money.minor;
        let updated = allocation.clone();
        self.repo.save(&budget).await?;
        debug!(
            budget_id = %id, %category_id, spent = updated.spent_minor,
            rate_source = %conversion.source, "spend recorded"
        );
        Ok(updated)
    }

    pub async fn update_allocation(
        &self,
        id: BudgetId,
        category_id: CategoryId,
        new_allocated_minor: i64,
    ) -> Result<Budget, BudgetError> {
        let mut budget = self
            .repo
            .get(id)
            .await?
            .ok_or(BudgetError::NotFound { budget_id: id })?;
        let strict = !self.config.allow_overspend_reallocation;
        let allocation =
            budget
                .allocation_mut(category_id)
                .ok_or(BudgetError::CategoryNotFound {
                    budget_id: id,
                    category_id,
                })?;
        if new_allocated_minor < 0 || (strict && allocation.spent_minor > new_allocated_minor) {
            return Err(BudgetError::InvalidAllocation {
                category_id,
                allocated_minor: new_allocated_minor,
                spent_minor: allocation.spent_minor,
            });
        }
        allocation.allocated_minor = new_allocated_minor;
        self.repo.save(&budget).await?;
        Ok(budget)
    }
}

/// Progress of a single allocation. All integer arithmetic; the ratio is
/// display-only.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationProgress {
    pub category_id: CategoryId,
    pub allocated_minor: i64,
    pub spent_minor: i64,
    pub remaining_minor: i64,
    pub utilization: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetProgress {
    pub budget_id: BudgetId,
    pub period: BudgetPeriod,
    pub rows: Vec<AllocationProgress>,
    pub total_allocated_minor: i64,
    pub total_spent_minor: i64,
    pub total_remaining_minor: i64,
}

/// Per-allocation and aggregate progress. The aggregate is the exact
/// integer sum of the rows, never an independently derived total.
pub fn progress(budget: &Budget) -> BudgetProgress {
    let rows: Vec<AllocationProgress> = budget
        .allocations
        .iter()
        .map(|a| AllocationProgress {
            category_id: a.category_id,
            allocated_minor: a.allocated_minor,
            spent_minor: a.spent_minor,
            remaining_minor: a.allocated_minor - a.spent_minor,
            utilization: if a.allocated_minor > 0 {
                a.spent_minor as f64 / a.allocated_minor as f64
            } else {
                0.0
            },
        })
        .collect();

    BudgetProgress {
        budget_id: budget.id,
        period: budget.period,
        total_allocated_minor: rows.iter().map(|r| r.allocated_minor).sum(),
        total_spent_minor: rows.iter().map(|r| r.spent_minor).sum(),
        total_remaining_minor: rows.iter().map(|r| r.remaining_minor).sum(),
        rows,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecommendationKind {
    Increase,
    Decrease,
    Merge { into: CategoryId },
    NewCategory,
    Seasonal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationRecommendation {
    pub category_id: CategoryId,
    pub kind: RecommendationKind,
    pub confidence: f64,
    pub suggested_minor: Option<i64>,
}

/// Advisory allocation suggestions derived from historical progress
/// snapshots. Read-only: never touches budget state.
pub fn recommend(history: &[BudgetProgress]) -> Vec<AllocationRecommendation> {
    // BTreeMap keeps category iteration (and thus output) deterministic
    let mut by_category: BTreeMap<CategoryId, Vec<&AllocationProgress>> = BTreeMap::new();
    for snapshot in history {
        for row in &snapshot.rows {
            by_category.entry(row.category_id).or_default().push(row);
        }
    }

    let mut out = Vec::new();
    let mut tiny: Vec<CategoryId> = Vec::new();
    let mean_total_allocated: i64 = if history.is_empty() {
        0
    } else {
        history
            .iter()
            .map(|s| s.total_allocated_minor)
            .sum::<i64>()
            / history.len() as i64
    };

    for (category_id, rows) in &by_category {
        let n = rows.len();
        if n == 0 {
            continue;
        }
        let mean_spent = rows.iter().map(|r| r.spent_minor).sum::<i64>() / n as i64;
        let funded: Vec<&&AllocationProgress> =
            rows.iter().filter(|r| r.allocated_minor > 0).collect();
        let unfunded_spend_frac =
            rows.iter().filter(|r| r.allocated_minor == 0 && r.spent_minor > 0).count() as f64
                / n as f64;

        if unfunded_spend_frac >= 0.5 {
            out.push(AllocationRecommendation {
                category_id: *category_id,
                kind: RecommendationKind::NewCategory,
                confidence: unfunded_spend_frac,
                suggested_minor: Some(mean_spent),
            });
            continue;
        }
        if funded.is_empty() {
            continue;
        }

        let overspent_frac =
            funded.iter().filter(|r| r.utilization >= 1.0).count() as f64 / funded.len() as f64;
        let under_frac =
            funded.iter().filter(|r| r.utilization <= 0.5).count() as f64 / funded.len() as f64;
        let max_util = funded.iter().map(|r| r.utilization).fold(0.0, f64::max);
        let min_util = funded
            .iter()
            .map(|r| r.utilization)
            .fold(f64::INFINITY, f64::min);

        if overspent_frac >= 0.5 {
            out.push(AllocationRecommendation {
                category_id: *category_id,
                kind: RecommendationKind::Increase,
                confidence: overspent_frac,
                suggested_minor: Some(mean_spent + mean_spent / 10),
            });
        } else if funded.len() >= 2 && under_frac >= 0.75 {
            out.push(AllocationRecommendation {
                category_id: *category_id,
                kind: RecommendationKind::Decrease,
                confidence: under_frac,
                suggested_minor: Some(mean_spent + mean_spent / 5),
            });
        }

        if funded.len() >= 4 && max_util >= 1.0 && min_util <= 0.3 {
            out.push(AllocationRecommendation {
                category_id: *category_id,
                kind: RecommendationKind::Seasonal,
                confidence: 0.5,
                suggested_minor: None,
            });
        }

        let mean_allocated = funded.iter().map(|r| r.allocated_minor).sum::<i64>()
            / funded.len() as i64;
        if mean_total_allocated > 0
            && mean_allocated * 20 < mean_total_allocated
            && max_util <= 0.3
        {
            tiny.push(*category_id);
        }
    }

    // small, barely-used envelopes pair up into merge suggestions
    if tiny.len() >= 2 {
        let into = tiny[0];
        for category_id in tiny.iter().skip(1) {
            out.push(AllocationRecommendation {
                category_id: *category_id,
                kind: RecommendationKind::Merge { into },
                confidence: 0.3,
                suggested_minor: None,
            });
        }
    }

    out.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.category_id.cmp(&b.category_id))
    });
    out
}
