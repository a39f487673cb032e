//! Budget domain types: periods, lifecycle states and allocations.

use super::money::Currency;
use super::rate::ConvertError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

pub type BudgetId = Uuid;
pub type HouseholdId = Uuid;
pub type CategoryId = Uuid;

/// Half-open calendar interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl BudgetPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, BudgetError> {
        if start >= end {
            return Err(BudgetError::InvalidPeriod { start, end });
        }
        Ok(BudgetPeriod { start, end })
    }

    /// Two periods overlap iff `max(startA, startB) < min(endA, endB)`.
    pub fn overlaps(&self, other: &BudgetPeriod) -> bool {
        self.start.max(other.start) < self.end.min(other.end)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    /// The end bound is exclusive, so the period has ended on its end date.
    pub fn has_ended_by(&self, date: NaiveDate) -> bool {
        date >= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetStatus {
    Draft,
    Active,
    Expired,
    Archived,
}

impl fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BudgetStatus::Draft => "draft",
            BudgetStatus::Active => "active",
            BudgetStatus::Expired => "expired",
            BudgetStatus::Archived => "archived",
        };
        f.write_str(s)
    }
}

/// Planned spending for one category inside a budget. `spent_minor` is
/// derived state, maintained by the manager in the budget's currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAllocation {
    pub category_id: CategoryId,
    pub allocated_minor: i64,
    pub spent_minor: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub id: BudgetId,
    pub household_id: HouseholdId,
    pub name: String,
    pub currency: Currency,
    pub period: BudgetPeriod,
    pub status: BudgetStatus,
    pub allocations: Vec<CategoryAllocation>,
}

impl Budget {
    pub fn draft(
        household_id: HouseholdId,
        name: &str,
        currency: Currency,
        period: BudgetPeriod,
    ) -> Self {
        Budget {
            id: Uuid::new_v4(),
            household_id,
            name: name.to_string(),
            currency,
            period,
            status: BudgetStatus::Draft,
            allocations: Vec::new(),
        }
    }

    pub fn allocation(&self, category_id: CategoryId) -> Option<&CategoryAllocation> {
        self.allocations
            .iter()
            .find(|a| a.category_id == category_id)
    }

    pub fn allocation_mut(&mut self, category_id: CategoryId) -> Option<&mut CategoryAllocation> {
        self.allocations
            .iter_mut()
            .find(|a| a.category_id == category_id)
    }

    /// Adds an allocation; category ids are unique within a budget.
    pub fn add_allocation(
        &mut self,
        category_id: CategoryId,
        allocated_minor: i64,
    ) -> Result<(), BudgetError> {
        if allocated_minor < 0 {
            return Err(BudgetError::InvalidAllocation {
                category_id,
                allocated_minor,
                spent_minor: 0,
            });
        }
        if self.allocation(category_id).is_some() {
            return Err(BudgetError::DuplicateCategory {
                budget_id: self.id,
                category_id,
            });
        }
        self.allocations.push(CategoryAllocation {
            category_id,
            allocated_minor,
            spent_minor: 0,
        });
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("invalid budget period: {start} >= {end}")]
    InvalidPeriod { start: NaiveDate, end: NaiveDate },
    #[error("budget {budget_id} overlaps active budget {conflicting_id} over [{start}, {end})")]
    PeriodOverlap {
        budget_id: BudgetId,
        conflicting_id: BudgetId,
        start: NaiveDate,
        end: NaiveDate,
    },
    #[error("budget not found: {budget_id}")]
    NotFound { budget_id: BudgetId },
    #[error("category {category_id} not found in budget {budget_id}")]
    CategoryNotFound {
        budget_id: BudgetId,
        category_id: CategoryId,
    },
    #[error("category {category_id} already allocated in budget {budget_id}")]
    DuplicateCategory {
        budget_id: BudgetId,
        category_id: CategoryId,
    },
    #[error(
        "invalid allocation for category {category_id}: allocated {allocated_minor}, spent {spent_minor}"
    )]
    InvalidAllocation {
        category_id: CategoryId,
        allocated_minor: i64,
        spent_minor: i64,
    },
    #[error("budget {budget_id} is {status}, not active")]
    Inactive {
        budget_id: BudgetId,
        status: BudgetStatus,
    },
    #[error("budget {budget_id} period ended {end}, cannot record spend on {on}")]
    PeriodExpired {
        budget_id: BudgetId,
        end: NaiveDate,
        on: NaiveDate,
    },
    #[error("budget {budget_id} cannot transition from {from} to {to}")]
    InvalidTransition {
        budget_id: BudgetId,
        from: BudgetStatus,
        to: BudgetStatus,
    },
    #[error(transparent)]
    Conversion(#[from] ConvertError),
    #[error("budget storage failure")]
    Storage(#[source] anyhow::Error),
}
