//! Handlers for `meals menu` subcommands.
//!
//! - `meals menu import <file>`       -- apply a menu.toml to the database
//! - `meals menu show [--from] [--to]` -- list offered dates and meals
//! - `meals menu remove <date>`        -- withdraw a date and its choices

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use sqlx::PgPool;

use meals_core::date::parse_date_param;
use meals_core::menu::{import_menu, list_menu, parse_menu_toml, remove_date, render_menu_toml};
use meals_core::report::default_window;
use meals_db::models::RegistrationWithMeals;

use crate::MenuCommands;

pub async fn run_menu_command(command: MenuCommands, pool: &PgPool) -> Result<()> {
    match command {
        MenuCommands::Import { file } => cmd_import(pool, &file).await,
        MenuCommands::Show { from, to, toml } => {
            cmd_show(pool, from.as_deref(), to.as_deref(), toml).await
        }
        MenuCommands::Remove { date } => cmd_remove(pool, &date).await,
    }
}

/// Parse a `YYYY-MM-DD` command-line argument.
pub fn date_arg(raw: &str) -> Result<NaiveDate> {
    parse_date_param(raw).with_context(|| format!("invalid date {raw:?} (expected YYYY-MM-DD)"))
}

/// Resolve optional `--from`/`--to` arguments against the default window.
pub fn window_args(from: Option<&str>, to: Option<&str>) -> Result<(NaiveDate, NaiveDate)> {
    let (default_from, default_to) = default_window(Local::now().date_naive());
    let from = from.map(date_arg).transpose()?.unwrap_or(default_from);
    let to = to.map(date_arg).transpose()?.unwrap_or(default_to);
    if from > to {
        anyhow::bail!("--from {from} is after --to {to}");
    }
    Ok((from, to))
}

// -----------------------------------------------------------------------
// meals menu import <file>
// -----------------------------------------------------------------------

async fn cmd_import(pool: &PgPool, file_path: &str) -> Result<()> {
    let content = std::fs::read_to_string(file_path)
        .with_context(|| format!("failed to read menu file: {file_path}"))?;
    let menu = parse_menu_toml(&content)
        .with_context(|| format!("failed to parse menu file: {file_path}"))?;

    let summary = import_menu(pool, &menu).await?;

    println!("Menu imported.");
    println!();
    println!("  Meals defined: {}", summary.meals);
    println!("  Dates offered: {}", summary.dates);

    if !summary.dropped_choices.is_empty() {
        println!();
        println!("Choices removed because their meal is no longer offered:");
        for (date, count) in &summary.dropped_choices {
            println!("  {date}: {count}");
        }
    }

    Ok(())
}

// -----------------------------------------------------------------------
// meals menu show
// -----------------------------------------------------------------------

async fn cmd_show(pool: &PgPool, from: Option<&str>, to: Option<&str>, toml: bool) -> Result<()> {
    let (from, to) = window_args(from, to)?;
    let registrations = list_menu(pool, from, to).await?;

    if toml {
        print!("{}", render_menu_toml(&registrations)?);
        return Ok(());
    }

    if registrations.is_empty() {
        println!("No meals offered between {from} and {to}.");
        return Ok(());
    }

    print!("{}", format_menu_table(&registrations));
    Ok(())
}

fn format_menu_table(registrations: &[RegistrationWithMeals]) -> String {
    let mut out = format!("{:<12} {}\n", "DATE", "MEALS");
    out.push_str(&format!("{}\n", "-".repeat(60)));
    for reg in registrations {
        let names: Vec<&str> = reg.meals.iter().map(|m| m.name.as_str()).collect();
        let meals = if names.is_empty() {
            "(none)".to_owned()
        } else {
            names.join(", ")
        };
        out.push_str(&format!("{:<12} {}\n", reg.registration.date, meals));
    }
    out
}

// -----------------------------------------------------------------------
// meals menu remove <date>
// -----------------------------------------------------------------------

async fn cmd_remove(pool: &PgPool, raw: &str) -> Result<()> {
    let date = date_arg(raw)?;
    let removed = remove_date(pool, date).await?;
    if removed.registrations == 0 {
        anyhow::bail!("no meals are offered on {date}");
    }
    println!(
        "Removed {date} ({} meal(s), {} choice(s)).",
        removed.meal_links, removed.choices
    );
    Ok(())
}
