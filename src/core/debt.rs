//! Debt domain types. Payments are append-only; the balance is always
//! derivable from the principal and the payment history.

use super::budget::HouseholdId;
use super::money::Currency;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub type DebtId = Uuid;

/// A single payment split into principal and interest components.
/// Invariant: `principal_minor + interest_minor == amount_minor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtPayment {
    pub amount_minor: i64,
    pub principal_minor: i64,
    pub interest_minor: i64,
    pub date: NaiveDate,
    pub currency: Currency,
}

impl DebtPayment {
    pub fn split_is_consistent(&self) -> bool {
        self.principal_minor
            .checked_add(self.interest_minor)
            .map(|sum| sum == self.amount_minor)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debt {
    pub id: DebtId,
    pub household_id: HouseholdId,
    pub name: String,
    pub principal_minor: i64,
    pub balance_minor: i64,
    pub currency: Currency,
    pub start_date: NaiveDate,
    pub payments: Vec<DebtPayment>,
}

impl Debt {
    pub fn open(
        household_id: HouseholdId,
        name: &str,
        principal_minor: i64,
        currency: Currency,
        start_date: NaiveDate,
    ) -> Self {
        Debt {
            id: Uuid::new_v4(),
            household_id,
            name: name.to_string(),
            principal_minor,
            balance_minor: principal_minor,
            currency,
            start_date,
            payments: Vec::new(),
        }
    }

    pub fn principal_paid(&self) -> i64 {
        self.payments.iter().map(|p| p.principal_minor).sum()
    }

    /// Appends a payment, keeping the history ordered by payment date with
    /// insertion order as the tie-breaker, and recomputes the balance from
    /// the full history. The balance clamps at zero; any principal beyond
    /// the outstanding balance is returned as the overpaid excess.
    pub fn apply(&mut self, payment: DebtPayment) -> Option<i64> {
        self.payments.push(payment);
        self.payments.sort_by_key(|p| p.date);

        let paid = self.principal_paid();
        let excess = paid - self.principal_minor;
        self.balance_minor = (self.principal_minor - paid).max(0);
        (excess > 0).then_some(excess)
    }
}

/// Result of a successfully applied payment. `overpayment_minor` carries
/// the clamped excess principal; it is a reported condition, not a failure.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentReceipt {
    pub debt: Debt,
    pub overpayment_minor: Option<i64>,
}

#[derive(Debug, Error)]
pub enum DebtError {
    #[error(
        "payment split mismatch on debt {debt_id}: {principal_minor} + {interest_minor} != {amount_minor}"
    )]
    PaymentMismatch {
        debt_id: DebtId,
        amount_minor: i64,
        principal_minor: i64,
        interest_minor: i64,
    },
    #[error("payment currency {payment_currency} does not match debt {debt_id} currency {debt_currency}")]
    CurrencyMismatch {
        debt_id: DebtId,
        debt_currency: Currency,
        payment_currency: Currency,
    },
    #[error("debt not found: {debt_id}")]
    NotFound { debt_id: DebtId },
    #[error("debt storage failure")]
    Storage(#[source] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn payment(amount: i64, principal: i64, interest: i64, on: &str) -> DebtPayment {
        DebtPayment {
            amount_minor: amount,
            principal_minor: principal,
            interest_minor: interest,
            date: date(on),
            currency: Currency::new("EUR"),
        }
    }

    fn debt(principal: i64) -> Debt {
        Debt::open(
            Uuid::new_v4(),
            "car loan",
            principal,
            Currency::new("EUR"),
            date("2024-01-01"),
        )
    }

    #[test]
    fn test_split_consistency() {
        assert!(payment(500_000, 450_000, 50_000, "2024-02-01").split_is_consistent());
        assert!(!payment(500_000, 450_000, 60_000, "2024-02-01").split_is_consistent());
    }

    #[test]
    fn test_apply_reduces_balance() {
        let mut d = debt(2_000_000);
        let overpaid = d.apply(payment(500_000, 450_000, 50_000, "2024-02-01"));
        assert_eq!(overpaid, None);
        assert_eq!(d.balance_minor, 1_550_000);
        assert_eq!(d.principal_paid(), 450_000);
    }

    #[test]
    fn test_apply_clamps_and_reports_overpayment() {
        let mut d = debt(100_000);
        let overpaid = d.apply(payment(150_000, 130_000, 20_000, "2024-02-01"));
        assert_eq!(overpaid, Some(30_000));
        assert_eq!(d.balance_minor, 0);
    }

    #[test]
    fn test_balance_equation_over_any_sequence() {
        let mut d = debt(1_000_000);
        let payments = [
            payment(300_000, 250_000, 50_000, "2024-03-01"),
            payment(300_000, 250_000, 50_000, "2024-02-01"),
            payment(300_000, 250_000, 50_000, "2024-04-01"),
        ];
        for p in payments {
            d.apply(p);
        }
        assert_eq!(
            d.balance_minor,
            (d.principal_minor - d.principal_paid()).max(0)
        );
        // history is date-ordered regardless of insertion order
        let dates: Vec<_> = d.payments.iter().map(|p| p.date).collect();
        assert_eq!(
            dates,
            vec![date("2024-02-01"), date("2024-03-01"), date("2024-04-01")]
        );
    }
}
