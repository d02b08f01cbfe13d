//! A parent's recorded choices: history, and single-choice edit and delete.
//! Only choices for dates strictly after today may change.

use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use meals_db::models::{ChoiceHistoryRow, Meal, OwnedChoice, Parent};
use meals_db::queries::{children, choices, meals, registrations};

use crate::account::resolve_parent;
use crate::context::RequestContext;
use crate::date::format_date;
use crate::error::{WorkflowError, settle};
use crate::form::validate_meal_value;
use crate::outcome::{FieldError, Message, Outcome, Route};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub choice_id: Uuid,
    pub child_id: Uuid,
    pub child_name: String,
    pub date: NaiveDate,
    pub meal_id: Uuid,
    pub meal_name: String,
    /// Whether the choice can still be edited or removed.
    pub editable: bool,
}

impl HistoryEntry {
    fn from_row(row: ChoiceHistoryRow, ctx: &RequestContext) -> Self {
        let child_name = if row.child_last_name.is_empty() {
            row.child_first_name
        } else {
            format!("{} {}", row.child_first_name, row.child_last_name)
        };
        Self {
            choice_id: row.choice_id,
            child_id: row.child_id,
            child_name,
            date: row.date,
            meal_id: row.meal_id,
            meal_name: row.meal_name,
            editable: ctx.is_mutable(row.date),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryView {
    pub entries: Vec<HistoryEntry>,
}

/// Every choice the parent has made, newest date first.
pub async fn choice_history(pool: &PgPool, ctx: &RequestContext) -> Outcome<HistoryView> {
    settle(load_history(pool, ctx).await.map(Outcome::render), Route::History)
}

async fn load_history(pool: &PgPool, ctx: &RequestContext) -> Result<HistoryView, WorkflowError> {
    let parent = resolve_parent(pool, &ctx.principal).await?;
    let entries = choices::history_for_parent(pool, parent.id)
        .await?
        .into_iter()
        .map(|row| HistoryEntry::from_row(row, ctx))
        .collect();
    Ok(HistoryView { entries })
}

/// A single choice with the meals offered on its date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditChoiceView {
    pub choice_id: Uuid,
    pub child_name: String,
    pub date: NaiveDate,
    pub options: Vec<Meal>,
    pub selected: Uuid,
    pub editable: bool,
    pub submitted: Option<String>,
    pub errors: Vec<FieldError>,
}

/// Resolve `choice_id` through the caller's children.
async fn owned_choice(
    pool: &PgPool,
    ctx: &RequestContext,
    choice_id: Uuid,
) -> Result<(Parent, OwnedChoice), WorkflowError> {
    let parent = resolve_parent(pool, &ctx.principal).await?;
    let choice = choices::get_owned_choice(pool, parent.id, choice_id)
        .await?
        .ok_or_else(|| WorkflowError::NotFound("Meal choice".to_owned()))?;
    Ok((parent, choice))
}

async fn edit_view(
    pool: &PgPool,
    ctx: &RequestContext,
    parent: &Parent,
    choice: &OwnedChoice,
) -> Result<EditChoiceView, WorkflowError> {
    let child = children::get_owned_child(pool, parent.id, choice.child_id)
        .await?
        .ok_or_else(|| WorkflowError::NotFound("Child".to_owned()))?;
    let options = meals::list_meals_for_registration(pool, choice.meal_registration_id).await?;
    Ok(EditChoiceView {
        choice_id: choice.id,
        child_name: child.display_name(),
        date: choice.date,
        options,
        selected: choice.meal_id,
        editable: ctx.is_mutable(choice.date),
        submitted: None,
        errors: Vec::new(),
    })
}

pub async fn show_choice(
    pool: &PgPool,
    ctx: &RequestContext,
    choice_id: Uuid,
) -> Outcome<EditChoiceView> {
    settle(
        try_show_choice(pool, ctx, choice_id).await.map(Outcome::render),
        Route::History,
    )
}

async fn try_show_choice(
    pool: &PgPool,
    ctx: &RequestContext,
    choice_id: Uuid,
) -> Result<EditChoiceView, WorkflowError> {
    let (parent, choice) = owned_choice(pool, ctx, choice_id).await?;
    edit_view(pool, ctx, &parent, &choice).await
}

/// Point an existing choice at a different meal offered on the same date.
pub async fn edit_choice(
    pool: &PgPool,
    ctx: &RequestContext,
    choice_id: Uuid,
    meal: Option<&str>,
) -> Outcome<EditChoiceView> {
    settle(try_edit_choice(pool, ctx, choice_id, meal).await, Route::History)
}

async fn try_edit_choice(
    pool: &PgPool,
    ctx: &RequestContext,
    choice_id: Uuid,
    meal: Option<&str>,
) -> Result<Outcome<EditChoiceView>, WorkflowError> {
    let (parent, choice) = owned_choice(pool, ctx, choice_id).await?;
    if !ctx.is_mutable(choice.date) {
        return Err(WorkflowError::PastDateImmutable { date: choice.date });
    }

    let mut view = edit_view(pool, ctx, &parent, &choice).await?;

    // Registration before choice, the order menu changes lock in.
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let offered =
        registrations::lock_offered_meals(&mut *tx, choice.meal_registration_id).await?;
    let Some(locked) = choices::get_owned_choice_for_update(&mut *tx, parent.id, choice_id).await?
    else {
        return Err(WorkflowError::NotFound("Meal choice".to_owned()));
    };
    view.options.retain(|meal| offered.contains(&meal.id));

    let meal_id = match validate_meal_value(meal, &view.options) {
        Ok(meal_id) => meal_id,
        Err(message) => {
            view.submitted = meal.map(str::to_owned);
            view.errors = vec![FieldError::new("meal", message)];
            return Ok(Outcome::Invalid {
                view,
                messages: vec![Message::error("Nothing was saved. Please pick an offered meal.")],
            });
        }
    };

    choices::set_choice_meal(&mut *tx, locked.id, meal_id).await?;
    tx.commit().await.context("failed to commit meal choice")?;
    info!(%choice_id, date = %choice.date, %meal_id, "meal choice changed");

    Ok(Outcome::redirect(
        Route::History,
        Message::success(format!(
            "Meal for {} on {} updated.",
            view.child_name,
            format_date(choice.date)
        )),
    ))
}

/// Remove a choice, leaving its child undecided for that date again.
pub async fn delete_choice(pool: &PgPool, ctx: &RequestContext, choice_id: Uuid) -> Outcome<()> {
    settle(try_delete_choice(pool, ctx, choice_id).await, Route::History)
}

async fn try_delete_choice(
    pool: &PgPool,
    ctx: &RequestContext,
    choice_id: Uuid,
) -> Result<Outcome<()>, WorkflowError> {
    let (_, choice) = owned_choice(pool, ctx, choice_id).await?;
    if !ctx.is_mutable(choice.date) {
        return Err(WorkflowError::PastDateImmutable { date: choice.date });
    }

    choices::delete_choice(pool, choice.id).await?;
    info!(%choice_id, date = %choice.date, "meal choice removed");

    Ok(Outcome::redirect(
        Route::History,
        Message::success(format!(
            "Meal choice for {} removed.",
            format_date(choice.date)
        )),
    ))
}
