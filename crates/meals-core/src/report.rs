//! Kitchen totals: how many of each meal to prepare per date.

use std::collections::HashMap;

use chrono::{Days, NaiveDate};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use meals_db::models::{MealCountRow, RegistrationWithMeals};
use meals_db::queries::{children, choices, registrations};

use crate::context::RequestContext;
use crate::date::parse_date_param;
use crate::error::{WorkflowError, settle};
use crate::outcome::{Message, Outcome, Route};

/// Length of the report window when no end date is given.
pub const DEFAULT_WINDOW_DAYS: u64 = 28;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MealCount {
    pub meal_id: Uuid,
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCounts {
    pub date: NaiveDate,
    pub meals: Vec<MealCount>,
    pub total_choices: i64,
    /// Children registered in the system with no choice for this date.
    pub without_choice: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrdersReport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub total_children: i64,
    pub days: Vec<DayCounts>,
}

/// Combine registrations and per-meal counts into a report. Offered meals
/// without any row in `counts` are reported with zero.
pub fn build_report(
    from: NaiveDate,
    to: NaiveDate,
    total_children: i64,
    registrations: &[RegistrationWithMeals],
    counts: &[MealCountRow],
) -> OrdersReport {
    let by_pair: HashMap<(NaiveDate, Uuid), i64> = counts
        .iter()
        .map(|row| ((row.date, row.meal_id), row.count))
        .collect();

    let days = registrations
        .iter()
        .map(|reg| {
            let date = reg.registration.date;
            let meals: Vec<MealCount> = reg
                .meals
                .iter()
                .map(|meal| MealCount {
                    meal_id: meal.id,
                    name: meal.name.clone(),
                    count: by_pair.get(&(date, meal.id)).copied().unwrap_or(0),
                })
                .collect();
            let total_choices: i64 = meals.iter().map(|m| m.count).sum();
            DayCounts {
                date,
                meals,
                total_choices,
                without_choice: (total_children - total_choices).max(0),
            }
        })
        .collect();

    OrdersReport {
        from,
        to,
        total_children,
        days,
    }
}

/// Meal counts for every registration in `[from, to]`.
pub async fn meal_counts_report(
    pool: &PgPool,
    from: NaiveDate,
    to: NaiveDate,
) -> anyhow::Result<OrdersReport> {
    let total_children = children::count_children(pool).await?;
    let registrations = registrations::list_registrations_with_meals(pool, from, to).await?;
    let counts = choices::meal_counts(pool, from, to).await?;
    Ok(build_report(from, to, total_children, &registrations, &counts))
}

/// Default window: today through [`DEFAULT_WINDOW_DAYS`] days ahead.
pub fn default_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let to = today
        .checked_add_days(Days::new(DEFAULT_WINDOW_DAYS))
        .unwrap_or(NaiveDate::MAX);
    (today, to)
}

/// The staff orders page. Parents get [`Outcome::Forbidden`].
pub async fn staff_orders(
    pool: &PgPool,
    ctx: &RequestContext,
    from_param: Option<&str>,
    to_param: Option<&str>,
) -> Outcome<OrdersReport> {
    settle(
        try_staff_orders(pool, ctx, from_param, to_param).await,
        Route::StaffOrders,
    )
}

fn optional_date(param: Option<&str>) -> Result<Option<NaiveDate>, WorkflowError> {
    param
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(parse_date_param)
        .transpose()
}

async fn try_staff_orders(
    pool: &PgPool,
    ctx: &RequestContext,
    from_param: Option<&str>,
    to_param: Option<&str>,
) -> Result<Outcome<OrdersReport>, WorkflowError> {
    if !ctx.principal.is_staff() {
        return Err(WorkflowError::Forbidden);
    }

    let (default_from, default_to) = default_window(ctx.today);
    let from = optional_date(from_param)?.unwrap_or(default_from);
    let to = optional_date(to_param)?.unwrap_or(default_to);
    if from > to {
        return Ok(Outcome::redirect(
            Route::StaffOrders,
            Message::warning("The start date must not be after the end date."),
        ));
    }

    Ok(Outcome::render(meal_counts_report(pool, from, to).await?))
}
