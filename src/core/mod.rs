//! Core domain types and the seams the services plug into.

pub mod account;
pub mod budget;
pub mod debt;
pub mod money;
pub mod rate;
pub mod store;

// Re-export main types for cleaner imports
pub use account::{Account, AccountKind, Transaction, TransactionDirection};
pub use budget::{Budget, BudgetError, BudgetPeriod, BudgetStatus, CategoryAllocation};
pub use debt::{Debt, DebtError, DebtPayment, PaymentReceipt};
pub use money::{Currency, Money, MoneyError};
pub use rate::{ConvertError, ExchangeRate, RateError, RateSource, ResolvedRate};
pub use store::{BudgetRepository, DebtRepository, RateStore};
