use super::ui;
use crate::Engine;
use crate::aggregate::MissingRatePolicy;
use crate::config::AppConfig;
use crate::core::account::Transaction;
use crate::core::budget::CategoryId;
use crate::core::money::{Currency, Money};
use anyhow::Result;
use comfy_table::Cell;
use std::collections::HashMap;
use uuid::Uuid;

/// Config transactions carry free-form category labels; the engine works
/// on category ids. Build both directions of that mapping here.
fn transactions_from_config(
    config: &AppConfig,
) -> (Vec<Transaction>, HashMap<CategoryId, String>) {
    let mut ids_by_label: HashMap<String, CategoryId> = HashMap::new();
    let mut labels = HashMap::new();

    let transactions = config
        .transactions
        .iter()
        .map(|entry| {
            let category_id = entry.category.as_ref().map(|label| {
                *ids_by_label.entry(label.clone()).or_insert_with(|| {
                    let id = Uuid::new_v4();
                    labels.insert(id, label.clone());
                    id
                })
            });
            Transaction {
                id: Uuid::new_v4(),
                category_id,
                date: entry.date,
                amount: Money::new(
                    entry.amount_minor,
                    Currency::new(entry.currency.as_deref().unwrap_or(&config.currency)),
                ),
                direction: entry.direction,
            }
        })
        .collect();
    (transactions, labels)
}

pub async fn run(engine: &Engine, config: &AppConfig) -> Result<()> {
    let (transactions, labels) = transactions_from_config(config);
    let reporting = Currency::new(&config.currency);

    if transactions.is_empty() {
        println!("No transactions in the configuration.");
        return Ok(());
    }

    let pb = ui::new_progress_bar(transactions.len() as u64, true);
    pb.set_message("Converting transactions...");
    let cashflow = engine
        .cashflow(&transactions, &reporting, MissingRatePolicy::Skip)
        .await?;
    let spending = engine
        .spending_by_category(&transactions, &reporting, MissingRatePolicy::Skip)
        .await?;
    pb.finish_and_clear();

    println!(
        "Cashflow ({})\n",
        ui::style_text(reporting.as_str(), ui::StyleType::Title)
    );
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Month"),
        ui::header_cell("Inflow"),
        ui::header_cell("Outflow"),
        ui::header_cell("Net"),
    ]);
    for bucket in &cashflow.buckets {
        table.add_row(vec![
            Cell::new(bucket.month.format("%Y-%m").to_string()),
            ui::amount_cell(bucket.inflow_minor),
            ui::amount_cell(bucket.outflow_minor),
            ui::amount_cell(bucket.net_minor),
        ]);
    }
    println!("{table}");

    ui::print_separator();

    println!(
        "Spending by category ({})\n",
        ui::style_text(reporting.as_str(), ui::StyleType::Title)
    );
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Category"), ui::header_cell("Spent")]);
    for row in &spending.categories {
        let label = row
            .category_id
            .and_then(|id| labels.get(&id).cloned())
            .unwrap_or_else(|| "(uncategorized)".to_string());
        table.add_row(vec![Cell::new(label), ui::amount_cell(row.spent_minor)]);
    }
    println!("{table}");

    if cashflow.incomplete || spending.incomplete {
        println!(
            "{}",
            ui::style_text(
                &format!(
                    "{} transaction(s) could not be converted and were skipped.",
                    cashflow.skipped.max(spending.skipped)
                ),
                ui::StyleType::Error,
            )
        );
    }
    Ok(())
}
