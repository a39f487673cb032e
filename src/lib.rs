pub mod aggregate;
pub mod budget;
pub mod cli;
pub mod config;
pub mod convert;
pub mod core;
pub mod debt;
pub mod log;
pub mod providers;
pub mod resolver;
pub mod store;

use crate::aggregate::{
    Aggregator, CashflowReport, MissingRatePolicy, NetWorthReport, SpendingReport,
};
use crate::budget::{BudgetManager, BudgetManagerConfig, BudgetProgress};
use crate::convert::{Conversion, Converter};
use crate::core::account::{Account, Transaction};
use crate::core::budget::{Budget, BudgetError, BudgetId, CategoryAllocation, CategoryId};
use crate::core::debt::{DebtError, DebtId, DebtPayment, PaymentReceipt};
use crate::core::money::{Currency, Money};
use crate::core::rate::{ConvertError, ExchangeRate, RateError, RateSource};
use crate::core::store::{BudgetRepository, DebtRepository, RateStore};
use crate::debt::DebtTracker;
use crate::resolver::{RateResolver, ResolverConfig};
use anyhow::Result;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info};

/// The assembled ledger engine: resolver, converter, budget and debt
/// managers, and report aggregation over shared stores.
pub struct Engine {
    converter: Arc<Converter>,
    budgets: BudgetManager,
    debts: DebtTracker,
    aggregator: Aggregator,
}

impl Engine {
    pub fn new(
        rate_store: Arc<dyn RateStore>,
        rate_source: Arc<dyn RateSource>,
        budget_repo: Arc<dyn BudgetRepository>,
        debt_repo: Arc<dyn DebtRepository>,
        resolver_config: ResolverConfig,
        budget_config: BudgetManagerConfig,
    ) -> Self {
        let resolver = Arc::new(RateResolver::new(rate_store, rate_source, resolver_config));
        let converter = Arc::new(Converter::new(resolver));
        Engine {
            budgets: BudgetManager::new(budget_repo, Arc::clone(&converter), budget_config),
            debts: DebtTracker::new(debt_repo),
            aggregator: Aggregator::new(Arc::clone(&converter)),
            converter,
        }
    }

    pub fn budgets(&self) -> &BudgetManager {
        &self.budgets
    }

    pub fn debts(&self) -> &DebtTracker {
        &self.debts
    }

    pub async fn convert_amount(
        &self,
        amount_minor: i64,
        from: &Currency,
        to: &Currency,
        on: NaiveDate,
    ) -> Result<Conversion, ConvertError> {
        self.converter
            .convert(&Money::new(amount_minor, from.clone()), to, on)
            .await
    }

    pub async fn historical_rates(
        &self,
        base: &Currency,
        target: &Currency,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ExchangeRate>, RateError> {
        self.converter
            .resolver()
            .historical_rates(base, target, start, end)
            .await
    }

    pub async fn activate_budget(&self, id: BudgetId) -> Result<Budget, BudgetError> {
        self.budgets.activate(id).await
    }

    pub async fn record_budget_spend(
        &self,
        id: BudgetId,
        category_id: CategoryId,
        amount_minor: i64,
        currency: &Currency,
        today: NaiveDate,
    ) -> Result<CategoryAllocation, BudgetError> {
        self.budgets
            .record_spend(
                id,
                category_id,
                &Money::new(amount_minor, currency.clone()),
                today,
            )
            .await
    }

    pub async fn budget_progress(
        &self,
        id: BudgetId,
        today: NaiveDate,
    ) -> Result<BudgetProgress, BudgetError> {
        let budget = self.budgets.get(id, today).await?;
        Ok(budget::progress(&budget))
    }

    pub async fn apply_debt_payment(
        &self,
        id: DebtId,
        payment: DebtPayment,
    ) -> Result<PaymentReceipt, DebtError> {
        self.debts.apply_payment(id, payment).await
    }

    pub async fn net_worth(
        &self,
        accounts: &[Account],
        as_of: NaiveDate,
        reporting: &Currency,
        policy: MissingRatePolicy,
    ) -> Result<NetWorthReport, aggregate::AggregateError> {
        self.aggregator
            .net_worth(accounts, as_of, reporting, policy)
            .await
    }

    pub async fn cashflow(
        &self,
        transactions: &[Transaction],
        reporting: &Currency,
        policy: MissingRatePolicy,
    ) -> Result<CashflowReport, aggregate::AggregateError> {
        self.aggregator
            .cashflow(transactions, reporting, policy)
            .await
    }

    pub async fn spending_by_category(
        &self,
        transactions: &[Transaction],
        reporting: &Currency,
        policy: MissingRatePolicy,
    ) -> Result<SpendingReport, aggregate::AggregateError> {
        self.aggregator
            .spending_by_category(transactions, reporting, policy)
            .await
    }
}

pub enum AppCommand {
    Convert {
        amount_minor: i64,
        from: String,
        to: String,
        date: Option<NaiveDate>,
    },
    Rates {
        base: String,
        target: String,
        start: NaiveDate,
        end: NaiveDate,
    },
    NetWorth {
        as_of: Option<NaiveDate>,
    },
    Cashflow,
}

pub async fn run_command(cmd: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("hauskasse starting...");

    let config = match config_path {
        Some(path) => config::AppConfig::load_from_path(path)?,
        None => config::AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let rate_store: Arc<dyn RateStore> = Arc::new(store::FjallRateStore::open(
        &config.default_data_path()?.join("rates"),
    )?);
    let rate_source: Arc<dyn RateSource> =
        Arc::new(providers::FrankfurterSource::new(config.rates_base_url())?);

    let engine = Engine::new(
        rate_store,
        rate_source,
        Arc::new(store::MemoryBudgetRepository::new()),
        Arc::new(store::MemoryDebtRepository::new()),
        config.resolver_config(),
        BudgetManagerConfig::default(),
    );

    let today = chrono::Local::now().date_naive();
    match cmd {
        AppCommand::Convert {
            amount_minor,
            from,
            to,
            date,
        } => cli::convert::run(&engine, amount_minor, &from, &to, date.unwrap_or(today)).await,
        AppCommand::Rates {
            base,
            target,
            start,
            end,
        } => cli::rates::run(&engine, &base, &target, start, end).await,
        AppCommand::NetWorth { as_of } => {
            cli::networth::run(&engine, &config, as_of.unwrap_or(today)).await
        }
        AppCommand::Cashflow => cli::cashflow::run(&engine, &config).await,
    }
}
