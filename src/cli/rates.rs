use super::ui;
use crate::Engine;
use crate::core::money::Currency;
use anyhow::Result;
use chrono::NaiveDate;
use comfy_table::Cell;

pub async fn run(
    engine: &Engine,
    base: &str,
    target: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<()> {
    let base = Currency::new(base);
    let target = Currency::new(target);
    let rows = engine.historical_rates(&base, &target, start, end).await?;

    if rows.is_empty() {
        println!(
            "No stored rates for {base}->{target} between {start} and {end}. \
             Rates are persisted as conversions run."
        );
        return Ok(());
    }

    println!(
        "Rates: {}\n",
        ui::style_text(&format!("{base} -> {target}"), ui::StyleType::Title)
    );
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("Rate"),
        ui::header_cell("Source"),
    ]);
    for row in &rows {
        table.add_row(vec![
            Cell::new(row.date.to_string()),
            Cell::new(row.rate.to_string()),
            Cell::new(&row.source),
        ]);
    }
    println!("{table}");
    Ok(())
}
