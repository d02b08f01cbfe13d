//! Parses and validates `menu.toml`.
//!
//! Checks that meal names are non-blank and unique, dates are strict
//! `YYYY-MM-DD` and unique, and every date offers at least one meal, each
//! named once. Whether a referenced meal exists is decided at import time.

use std::collections::HashSet;

use chrono::NaiveDate;
use thiserror::Error;

use crate::date::parse_date_param;

use super::toml_format::{MealToml, MenuToml};

#[derive(Debug, Error)]
pub enum MenuParseError {
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("menu defines no meals and no dates")]
    Empty,

    #[error("meal name must not be blank")]
    BlankMealName,

    #[error("duplicate meal name: {0:?}")]
    DuplicateMealName(String),

    #[error("invalid date {0:?} (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("date {0} is listed more than once")]
    DuplicateDate(NaiveDate),

    #[error("date {0} offers no meals")]
    NoMealsOnDate(NaiveDate),

    #[error("date {date} lists meal {meal:?} more than once")]
    DuplicateMealOnDate { date: NaiveDate, meal: String },
}

/// A validated menu.
#[derive(Debug, Clone, PartialEq)]
pub struct Menu {
    pub meals: Vec<MealToml>,
    pub dates: Vec<MenuDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuDate {
    pub date: NaiveDate,
    pub meals: Vec<String>,
}

pub fn parse_menu_toml(content: &str) -> Result<Menu, MenuParseError> {
    let menu: MenuToml = toml::from_str(content)?;
    validate(menu)
}

fn validate(menu: MenuToml) -> Result<Menu, MenuParseError> {
    if menu.meals.is_empty() && menu.dates.is_empty() {
        return Err(MenuParseError::Empty);
    }

    let mut meals = Vec::with_capacity(menu.meals.len());
    let mut seen = HashSet::new();
    for meal in menu.meals {
        let name = meal.name.trim();
        if name.is_empty() {
            return Err(MenuParseError::BlankMealName);
        }
        if !seen.insert(name.to_owned()) {
            return Err(MenuParseError::DuplicateMealName(name.to_owned()));
        }
        meals.push(MealToml {
            name: name.to_owned(),
            description: meal.description.trim().to_owned(),
        });
    }

    let mut dates = Vec::with_capacity(menu.dates.len());
    let mut seen_dates = HashSet::new();
    for entry in menu.dates {
        let date = parse_date_param(entry.date.trim())
            .map_err(|_| MenuParseError::InvalidDate(entry.date.clone()))?;
        if !seen_dates.insert(date) {
            return Err(MenuParseError::DuplicateDate(date));
        }
        if entry.meals.is_empty() {
            return Err(MenuParseError::NoMealsOnDate(date));
        }

        let mut names = Vec::with_capacity(entry.meals.len());
        let mut on_date = HashSet::new();
        for meal in &entry.meals {
            let name = meal.trim();
            if name.is_empty() {
                return Err(MenuParseError::BlankMealName);
            }
            if !on_date.insert(name) {
                return Err(MenuParseError::DuplicateMealOnDate {
                    date,
                    meal: name.to_owned(),
                });
            }
            names.push(name.to_owned());
        }
        dates.push(MenuDate { date, meals: names });
    }
    dates.sort_by_key(|d| d.date);

    Ok(Menu { meals, dates })
}
