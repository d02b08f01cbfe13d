//! On-disk shape of a `menu.toml` file.
//!
//! ```toml
//! [[meals]]
//! name = "Roast chicken"
//! description = "With potatoes and gravy"
//!
//! [[dates]]
//! date = "2026-11-02"
//! meals = ["Roast chicken", "Vegetable curry"]
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MenuToml {
    /// Meals to create or update. Dates may also name meals that are
    /// already stored.
    #[serde(default)]
    pub meals: Vec<MealToml>,
    #[serde(default)]
    pub dates: Vec<DateToml>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MealToml {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// One `[[dates]]` entry. The date is kept as text so it can be checked
/// against the strict `YYYY-MM-DD` form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DateToml {
    pub date: String,
    pub meals: Vec<String>,
}
