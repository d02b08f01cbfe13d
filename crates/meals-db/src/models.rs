use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lowest and highest school year group a child may be placed in.
pub const YEAR_GROUP_RANGE: std::ops::RangeInclusive<i32> = 0..=13;

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A guardian account, one per identity-provider principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Parent {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A pupil whose meals are chosen by their parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Child {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub year_group: i32,
    pub class_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Child {
    /// First and last name joined, skipping an empty last name.
    pub fn display_name(&self) -> String {
        if self.last_name.is_empty() {
            self.first_name.clone()
        } else {
            format!("{} {}", self.first_name, self.last_name)
        }
    }
}

/// A named menu option. Read-only for the ordering workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Meal {
    pub id: Uuid,
    pub name: String,
    pub description: String,
}

/// A calendar date on which meals are offered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MealRegistration {
    pub id: Uuid,
    pub date: NaiveDate,
}

/// A registration together with the meals offered on its date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationWithMeals {
    pub registration: MealRegistration,
    pub meals: Vec<Meal>,
}

impl RegistrationWithMeals {
    pub fn offers(&self, meal_id: Uuid) -> bool {
        self.meals.iter().any(|m| m.id == meal_id)
    }
}

/// The meal picked for one child on one registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MealChoice {
    pub id: Uuid,
    pub child_id: Uuid,
    pub meal_registration_id: Uuid,
    pub meal_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Join rows
// ---------------------------------------------------------------------------

/// A choice looked up through its child's parent, with the date it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct OwnedChoice {
    pub id: Uuid,
    pub child_id: Uuid,
    pub meal_registration_id: Uuid,
    pub meal_id: Uuid,
    pub date: NaiveDate,
}

/// One line of a parent's choice history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ChoiceHistoryRow {
    pub choice_id: Uuid,
    pub child_id: Uuid,
    pub child_first_name: String,
    pub child_last_name: String,
    pub date: NaiveDate,
    pub meal_id: Uuid,
    pub meal_name: String,
}

/// Number of children who picked `meal_name` on `date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MealCountRow {
    pub date: NaiveDate,
    pub meal_id: Uuid,
    pub meal_name: String,
    pub count: i64,
}
