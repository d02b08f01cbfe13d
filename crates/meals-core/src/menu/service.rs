//! Applies a validated [`Menu`] to the database.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use meals_db::models::RegistrationWithMeals;
use meals_db::queries::registrations::RegistrationDeletion;
use meals_db::queries::{meals, registrations};

use super::parser::Menu;
use super::toml_format::{DateToml, MealToml, MenuToml};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub meals: usize,
    pub dates: usize,
    /// Dates whose existing choices pointed at a meal no longer offered,
    /// with the number of choices removed.
    pub dropped_choices: Vec<(NaiveDate, u64)>,
}

/// Import `menu` in one transaction.
///
/// Meals in the file are created or have their description refreshed. Each
/// date's meal set is replaced by the listed meals, which must be defined in
/// the file or already stored; if any are unknown nothing is written.
pub async fn import_menu(pool: &PgPool, menu: &Menu) -> Result<ImportSummary> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let mut ids: HashMap<String, Uuid> = HashMap::new();
    for meal in &menu.meals {
        let stored = meals::upsert_meal(&mut *tx, &meal.name, &meal.description).await?;
        ids.insert(stored.name, stored.id);
    }

    let mut missing = Vec::new();
    let mut resolved: Vec<(NaiveDate, Vec<Uuid>)> = Vec::with_capacity(menu.dates.len());
    for entry in &menu.dates {
        let mut meal_ids = Vec::with_capacity(entry.meals.len());
        for name in &entry.meals {
            if let Some(id) = ids.get(name) {
                meal_ids.push(*id);
                continue;
            }
            match meals::get_meal_by_name(&mut *tx, name).await? {
                Some(stored) => {
                    ids.insert(stored.name, stored.id);
                    meal_ids.push(stored.id);
                }
                None => missing.push(format!("meal {name:?} on {}", entry.date)),
            }
        }
        resolved.push((entry.date, meal_ids));
    }

    if !missing.is_empty() {
        // Rolls back on drop.
        bail!("menu references unknown meals:\n  {}", missing.join("\n  "));
    }

    let mut summary = ImportSummary {
        meals: menu.meals.len(),
        dates: resolved.len(),
        dropped_choices: Vec::new(),
    };
    for (date, meal_ids) in &resolved {
        let registration = registrations::upsert_registration(&mut *tx, *date).await?;
        let dropped =
            registrations::replace_registration_meals(&mut *tx, registration.id, meal_ids).await?;
        if dropped > 0 {
            warn!(%date, dropped, "removed choices for meals no longer offered");
            summary.dropped_choices.push((*date, dropped));
        }
    }

    tx.commit().await.context("failed to commit transaction")?;
    info!(meals = summary.meals, dates = summary.dates, "menu imported");
    Ok(summary)
}

/// Registrations in `[from, to]` with their meals.
pub async fn list_menu(
    pool: &PgPool,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<RegistrationWithMeals>> {
    registrations::list_registrations_with_meals(pool, from, to).await
}

/// Remove the registration for `date` together with its choices.
pub async fn remove_date(pool: &PgPool, date: NaiveDate) -> Result<RegistrationDeletion> {
    let removed = registrations::delete_registration_cascade(pool, date).await?;
    if removed.registrations > 0 {
        info!(%date, choices = removed.choices, "registration removed");
    }
    Ok(removed)
}

/// Serialize registrations back into `menu.toml` form, re-importable as is.
pub fn render_menu_toml(registrations: &[RegistrationWithMeals]) -> Result<String> {
    let mut meals: BTreeMap<&str, &str> = BTreeMap::new();
    for reg in registrations {
        for meal in &reg.meals {
            meals.insert(&meal.name, &meal.description);
        }
    }

    let menu = MenuToml {
        meals: meals
            .into_iter()
            .map(|(name, description)| MealToml {
                name: name.to_owned(),
                description: description.to_owned(),
            })
            .collect(),
        dates: registrations
            .iter()
            .filter(|reg| !reg.meals.is_empty())
            .map(|reg| DateToml {
                date: reg.registration.date.format("%Y-%m-%d").to_string(),
                meals: reg.meals.iter().map(|m| m.name.clone()).collect(),
            })
            .collect(),
    };

    toml::to_string_pretty(&menu).context("failed to serialize menu")
}
