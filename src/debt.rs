//! Debt amortization tracking. Payments carry an explicit principal and
//! interest split and are applied in the debt's native currency only;
//! conversion happens before this layer so the amortization math stays
//! exact.

use crate::core::debt::{Debt, DebtError, DebtId, DebtPayment, PaymentReceipt};
use crate::core::store::DebtRepository;
use chrono::{Days, NaiveDate};
use std::sync::Arc;
use tracing::{debug, warn};

/// Payments sampled for the payoff projection.
const PROJECTION_SAMPLE: usize = 6;

pub struct DebtTracker {
    repo: Arc<dyn DebtRepository>,
}

impl DebtTracker {
    pub fn new(repo: Arc<dyn DebtRepository>) -> Self {
        DebtTracker { repo }
    }

    pub async fn open(&self, debt: &Debt) -> Result<(), DebtError> {
        self.repo.create(debt).await
    }

    pub async fn get(&self, id: DebtId) -> Result<Debt, DebtError> {
        self.repo
            .get(id)
            .await?
            .ok_or(DebtError::NotFound { debt_id: id })
    }

    /// Validates and applies one payment. The repository serializes
    /// appends per debt; the returned receipt reports any clamped excess
    /// principal as an overpayment condition rather than failing.
    pub async fn apply_payment(
        &self,
        id: DebtId,
        payment: DebtPayment,
    ) -> Result<PaymentReceipt, DebtError> {
        if !payment.split_is_consistent() {
            return Err(DebtError::PaymentMismatch {
                debt_id: id,
                amount_minor: payment.amount_minor,
                principal_minor: payment.principal_minor,
                interest_minor: payment.interest_minor,
            });
        }
        let debt = self.get(id).await?;
        if payment.currency != debt.currency {
            return Err(DebtError::CurrencyMismatch {
                debt_id: id,
                debt_currency: debt.currency,
                payment_currency: payment.currency,
            });
        }

        let receipt = self.repo.append_payment(id, payment).await?;
        if let Some(excess) = receipt.overpayment_minor {
            warn!(debt_id = %id, excess_minor = excess, "payment overshot the balance; clamped at zero");
        }
        debug!(debt_id = %id, balance_minor = receipt.debt.balance_minor, "payment applied");
        Ok(receipt)
    }
}

/// Linear payoff projection from the mean principal and mean spacing of
/// the last `PROJECTION_SAMPLE` payments. An estimate, not a schedule:
/// `None` when the debt is settled or the history is too thin to average.
pub fn projected_payoff_date(debt: &Debt) -> Option<NaiveDate> {
    if debt.balance_minor == 0 || debt.payments.len() < 2 {
        return None;
    }
    let sampled = &debt.payments[debt.payments.len().saturating_sub(PROJECTION_SAMPLE)..];
    let mean_principal =
        sampled.iter().map(|p| p.principal_minor).sum::<i64>() / sampled.len() as i64;
    if mean_principal <= 0 {
        return None;
    }

    let first = sampled.first()?.date;
    let last = sampled.last()?.date;
    let span_days = (last - first).num_days();
    let mean_gap_days = (span_days / (sampled.len() as i64 - 1)).max(1);

    let payments_left = (debt.balance_minor as u64).div_ceil(mean_principal as u64) as i64;
    last.checked_add_days(Days::new((payments_left * mean_gap_days) as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::money::Currency;
    use crate::store::memory::MemoryDebtRepository;
    use uuid::Uuid;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn eur_payment(amount: i64, principal: i64, interest: i64, on: &str) -> DebtPayment {
        DebtPayment {
            amount_minor: amount,
            principal_minor: principal,
            interest_minor: interest,
            date: date(on),
            currency: Currency::new("EUR"),
        }
    }

    async fn tracker_with_debt(principal: i64) -> (DebtTracker, DebtId) {
        let tracker = DebtTracker::new(Arc::new(MemoryDebtRepository::new()));
        let debt = Debt::open(
            Uuid::new_v4(),
            "mortgage",
            principal,
            Currency::new("EUR"),
            date("2024-01-01"),
        );
        let id = debt.id;
        tracker.open(&debt).await.unwrap();
        (tracker, id)
    }

    #[tokio::test]
    async fn test_apply_payment_reduces_balance() {
        let (tracker, id) = tracker_with_debt(2_000_000).await;
        let receipt = tracker
            .apply_payment(id, eur_payment(500_000, 450_000, 50_000, "2024-02-01"))
            .await
            .unwrap();
        assert_eq!(receipt.debt.balance_minor, 1_550_000);
        assert_eq!(receipt.overpayment_minor, None);
    }

    #[tokio::test]
    async fn test_mismatched_split_rejected_and_balance_unchanged() {
        let (tracker, id) = tracker_with_debt(2_000_000).await;
        let err = tracker
            .apply_payment(id, eur_payment(500_000, 450_000, 60_000, "2024-02-01"))
            .await
            .unwrap_err();
        assert!(matches!(err, DebtError::PaymentMismatch { .. }));

        let debt = tracker.get(id).await.unwrap();
        assert_eq!(debt.balance_minor, 2_000_000);
        assert!(debt.payments.is_empty());
    }

    #[tokio::test]
    async fn test_foreign_currency_payment_rejected() {
        let (tracker, id) = tracker_with_debt(2_000_000).await;
        let mut payment = eur_payment(500_000, 450_000, 50_000, "2024-02-01");
        payment.currency = Currency::new("USD");
        let err = tracker.apply_payment(id, payment).await.unwrap_err();
        assert!(matches!(err, DebtError::CurrencyMismatch { .. }));
    }

    #[tokio::test]
    async fn test_overpayment_clamps_and_reports() {
        let (tracker, id) = tracker_with_debt(400_000).await;
        let receipt = tracker
            .apply_payment(id, eur_payment(500_000, 450_000, 50_000, "2024-02-01"))
            .await
            .unwrap();
        assert_eq!(receipt.debt.balance_minor, 0);
        assert_eq!(receipt.overpayment_minor, Some(50_000));
    }

    #[tokio::test]
    async fn test_parallel_payments_on_distinct_debts() {
        let tracker = Arc::new(DebtTracker::new(Arc::new(MemoryDebtRepository::new())));
        let mut ids = Vec::new();
        for _ in 0..4 {
            let debt = Debt::open(
                Uuid::new_v4(),
                "loan",
                1_000_000,
                Currency::new("EUR"),
                date("2024-01-01"),
            );
            ids.push(debt.id);
            tracker.open(&debt).await.unwrap();
        }

        let tasks: Vec<_> = ids
            .iter()
            .map(|id| {
                let tracker = Arc::clone(&tracker);
                let id = *id;
                tokio::spawn(async move {
                    tracker
                        .apply_payment(id, eur_payment(100_000, 90_000, 10_000, "2024-02-01"))
                        .await
                })
            })
            .collect();
        for task in tasks {
            let receipt = task.await.unwrap().unwrap();
            assert_eq!(receipt.debt.balance_minor, 910_000);
        }
    }

    #[tokio::test]
    async fn test_sequential_payments_deterministic_balance() {
        let (tracker, id) = tracker_with_debt(1_000_000).await;
        // out-of-order dates; history and balance stay deterministic
        for (principal, on) in [(300_000, "2024-03-01"), (300_000, "2024-02-01")] {
            tracker
                .apply_payment(id, eur_payment(350_000, principal, 50_000, on))
                .await
                .unwrap();
        }
        let debt = tracker.get(id).await.unwrap();
        assert_eq!(debt.balance_minor, 400_000);
        assert_eq!(debt.payments[0].date, date("2024-02-01"));
        assert_eq!(debt.payments[1].date, date("2024-03-01"));
    }

    #[test]
    fn test_projection_needs_history() {
        let debt = Debt::open(
            Uuid::new_v4(),
            "loan",
            1_000_000,
            Currency::new("EUR"),
            date("2024-01-01"),
        );
        assert_eq!(projected_payoff_date(&debt), None);
    }

    #[test]
    fn test_projection_linear_from_recent_payments() {
        let mut debt = Debt::open(
            Uuid::new_v4(),
            "loan",
            1_000_000,
            Currency::new("EUR"),
            date("2024-01-01"),
        );
        for on in ["2024-02-01", "2024-03-01", "2024-04-01"] {
            debt.apply(eur_payment(120_000, 100_000, 20_000, on));
        }
        // balance 700_000, mean principal 100_000, mean gap ~30 days:
        // seven more payments from 2024-04-01
        let projected = projected_payoff_date(&debt).unwrap();
        assert_eq!(projected, date("2024-04-01") + Days::new(7 * 30));
    }

    #[test]
    fn test_settled_debt_has_no_projection() {
        let mut debt = Debt::open(
            Uuid::new_v4(),
            "loan",
            200_000,
            Currency::new("EUR"),
            date("2024-01-01"),
        );
        debt.apply(eur_payment(120_000, 100_000, 20_000, "2024-02-01"));
        debt.apply(eur_payment(120_000, 100_000, 20_000, "2024-03-01"));
        assert_eq!(debt.balance_minor, 0);
        assert_eq!(projected_payoff_date(&debt), None);
    }
}
