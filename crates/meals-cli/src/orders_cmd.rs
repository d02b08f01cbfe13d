//! `meals orders`: kitchen meal counts per date, printed as a table.

use anyhow::Result;
use sqlx::PgPool;

use meals_core::report::{OrdersReport, meal_counts_report};

use crate::menu_cmds::window_args;

pub async fn run_orders(pool: &PgPool, from: Option<&str>, to: Option<&str>) -> Result<()> {
    let (from, to) = window_args(from, to)?;
    let report = meal_counts_report(pool, from, to).await?;

    if report.days.is_empty() {
        println!("No meals offered between {from} and {to}.");
        return Ok(());
    }

    print!("{}", format_report(&report));
    Ok(())
}

fn format_report(report: &OrdersReport) -> String {
    let mut out = format!(
        "Orders {} to {} ({} children registered)\n\n",
        report.from, report.to, report.total_children
    );
    out.push_str(&format!("{:<12} {:<32} {:>6}\n", "DATE", "MEAL", "COUNT"));
    out.push_str(&format!("{}\n", "-".repeat(52)));

    for day in &report.days {
        for (i, meal) in day.meals.iter().enumerate() {
            let date = if i == 0 { day.date.to_string() } else { String::new() };
            out.push_str(&format!("{:<12} {:<32} {:>6}\n", date, meal.name, meal.count));
        }
        out.push_str(&format!(
            "{:<12} {:<32} {:>6}\n",
            "",
            "(no choice yet)",
            day.without_choice
        ));
    }
    out
}
