use super::ui;
use crate::Engine;
use crate::core::money::Currency;
use anyhow::Result;
use chrono::NaiveDate;
use comfy_table::Cell;

pub async fn run(
    engine: &Engine,
    amount_minor: i64,
    from: &str,
    to: &str,
    on: NaiveDate,
) -> Result<()> {
    let from = Currency::new(from);
    let to = Currency::new(to);
    let conversion = engine.convert_amount(amount_minor, &from, &to, on).await?;

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell(&format!("Amount ({from})")),
        ui::header_cell(&format!("Amount ({to})")),
        ui::header_cell("Rate"),
        ui::header_cell("Rate date"),
        ui::header_cell("Source"),
    ]);
    table.add_row(vec![
        ui::amount_cell(amount_minor),
        ui::amount_cell(conversion.money.minor),
        Cell::new(conversion.rate.to_string()),
        Cell::new(conversion.rate_date.to_string()),
        Cell::new(&conversion.source),
    ]);
    println!("{table}");

    if conversion.approximated {
        println!(
            "{}",
            ui::style_text(
                &format!(
                    "No rate for {on}; using nearest prior rate from {}",
                    conversion.rate_date
                ),
                ui::StyleType::Subtle,
            )
        );
    }
    Ok(())
}
