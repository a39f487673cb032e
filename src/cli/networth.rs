use super::ui;
use crate::Engine;
use crate::aggregate::MissingRatePolicy;
use crate::config::AppConfig;
use crate::core::account::{Account, AccountKind};
use crate::core::money::{Currency, Money};
use anyhow::Result;
use chrono::NaiveDate;
use comfy_table::Cell;
use uuid::Uuid;

fn accounts_from_config(config: &AppConfig) -> Vec<Account> {
    config
        .accounts
        .iter()
        .map(|entry| Account {
            id: Uuid::new_v4(),
            name: entry.name.clone(),
            kind: entry.kind,
            balance: Money::new(
                entry.balance_minor,
                Currency::new(entry.currency.as_deref().unwrap_or(&config.currency)),
            ),
        })
        .collect()
}

pub async fn run(engine: &Engine, config: &AppConfig, as_of: NaiveDate) -> Result<()> {
    let accounts = accounts_from_config(config);
    let reporting = Currency::new(&config.currency);

    let pb = ui::new_progress_bar(accounts.len() as u64, true);
    pb.set_message("Converting balances...");
    let report = engine
        .net_worth(&accounts, as_of, &reporting, MissingRatePolicy::Skip)
        .await?;
    pb.finish_and_clear();

    println!(
        "Net worth as of {}\n",
        ui::style_text(&as_of.to_string(), ui::StyleType::Title)
    );

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Account"),
        ui::header_cell("Kind"),
        ui::header_cell("Balance"),
        ui::header_cell(&format!("Balance ({reporting})")),
        ui::header_cell("Rate date"),
    ]);
    for line in &report.lines {
        let kind = match line.kind {
            AccountKind::Asset => "asset",
            AccountKind::Liability => "liability",
        };
        let converted = match &line.converted {
            Some(money) => ui::amount_cell(money.minor),
            None => ui::na_cell(line.error.is_some()),
        };
        let rate_date = match line.rate_date {
            Some(date) if line.approximated => Cell::new(format!("{date} (approx)")),
            Some(date) => Cell::new(date.to_string()),
            None => ui::na_cell(false),
        };
        table.add_row(vec![
            Cell::new(&line.name),
            Cell::new(kind),
            Cell::new(format!(
                "{} {}",
                ui::format_minor(line.original.minor),
                line.original.currency
            )),
            converted,
            rate_date,
        ]);
    }
    println!("{table}");

    println!(
        "\nAssets ({reporting}): {}",
        ui::style_text(&ui::format_minor(report.assets.minor), ui::StyleType::TotalValue)
    );
    println!(
        "Liabilities ({reporting}): {}",
        ui::style_text(
            &ui::format_minor(report.liabilities.minor),
            ui::StyleType::TotalLabel
        )
    );
    println!(
        "Net worth ({reporting}): {}",
        ui::style_text(
            &ui::format_minor(report.net_worth.minor),
            ui::StyleType::TotalValue
        )
    );
    if report.incomplete {
        println!(
            "{}",
            ui::style_text(
                "Some balances could not be converted and were left out.",
                ui::StyleType::Error,
            )
        );
    }
    Ok(())
}
