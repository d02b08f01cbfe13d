//! Children owned by the requesting parent. Every lookup is filtered by the
//! parent's id; a child id belonging to someone else is simply not found.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use meals_db::models::{Child, YEAR_GROUP_RANGE};
use meals_db::queries::children::{self, ChildFields};

use crate::account::resolve_parent;
use crate::context::RequestContext;
use crate::error::{WorkflowError, settle};
use crate::outcome::{FieldError, Message, Outcome, Route};

const MAX_NAME: usize = 100;
const MAX_CLASS_NAME: usize = 50;

/// Raw child form. Everything arrives as text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildInput {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub year_group: String,
    #[serde(default)]
    pub class_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidChild {
    pub first_name: String,
    pub last_name: String,
    pub year_group: i32,
    pub class_name: Option<String>,
}

impl ValidChild {
    fn fields(&self) -> ChildFields<'_> {
        ChildFields {
            first_name: &self.first_name,
            last_name: &self.last_name,
            year_group: self.year_group,
            class_name: self.class_name.as_deref(),
        }
    }
}

fn check_length(errors: &mut Vec<FieldError>, field: &str, value: &str, max: usize) {
    if value.chars().count() > max {
        errors.push(FieldError::new(field, format!("Must be at most {max} characters.")));
    }
}

/// Validate a child form, collecting an error for every bad field.
pub fn validate_child(input: &ChildInput) -> Result<ValidChild, Vec<FieldError>> {
    let mut errors = Vec::new();

    let first_name = input.first_name.trim();
    if first_name.is_empty() {
        errors.push(FieldError::new("first_name", "Please enter a first name."));
    }
    check_length(&mut errors, "first_name", first_name, MAX_NAME);

    let last_name = input.last_name.trim();
    check_length(&mut errors, "last_name", last_name, MAX_NAME);

    let year_group = match input.year_group.trim().parse::<i32>() {
        Ok(year) if YEAR_GROUP_RANGE.contains(&year) => Some(year),
        _ => {
            errors.push(FieldError::new(
                "year_group",
                format!(
                    "Year group must be a whole number from {} to {}.",
                    YEAR_GROUP_RANGE.start(),
                    YEAR_GROUP_RANGE.end()
                ),
            ));
            None
        }
    };

    let class_name = input.class_name.trim();
    check_length(&mut errors, "class_name", class_name, MAX_CLASS_NAME);

    match year_group {
        Some(year_group) if errors.is_empty() => Ok(ValidChild {
            first_name: first_name.to_owned(),
            last_name: last_name.to_owned(),
            year_group,
            class_name: (!class_name.is_empty()).then(|| class_name.to_owned()),
        }),
        _ => Err(errors),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildrenView {
    pub children: Vec<Child>,
}

/// Add or edit form, with the submitted values echoed back on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildFormView {
    /// `None` when adding.
    pub child_id: Option<Uuid>,
    pub input: ChildInput,
    pub errors: Vec<FieldError>,
}

fn invalid_form(
    child_id: Option<Uuid>,
    input: &ChildInput,
    errors: Vec<FieldError>,
) -> Outcome<ChildFormView> {
    Outcome::Invalid {
        view: ChildFormView {
            child_id,
            input: input.clone(),
            errors,
        },
        messages: vec![Message::error("Please correct the errors below.")],
    }
}

pub async fn list_children(pool: &PgPool, ctx: &RequestContext) -> Outcome<ChildrenView> {
    settle(load_children(pool, ctx).await.map(Outcome::render), Route::Children)
}

async fn load_children(pool: &PgPool, ctx: &RequestContext) -> Result<ChildrenView, WorkflowError> {
    let parent = resolve_parent(pool, &ctx.principal).await?;
    let children = children::list_children_for_parent(pool, parent.id).await?;
    Ok(ChildrenView { children })
}

/// An empty add-child form.
pub fn new_child_form() -> Outcome<ChildFormView> {
    Outcome::render(ChildFormView {
        child_id: None,
        input: ChildInput::default(),
        errors: Vec::new(),
    })
}

pub async fn add_child(
    pool: &PgPool,
    ctx: &RequestContext,
    input: &ChildInput,
) -> Outcome<ChildFormView> {
    settle(try_add_child(pool, ctx, input).await, Route::Children)
}

async fn try_add_child(
    pool: &PgPool,
    ctx: &RequestContext,
    input: &ChildInput,
) -> Result<Outcome<ChildFormView>, WorkflowError> {
    let valid = match validate_child(input) {
        Ok(valid) => valid,
        Err(errors) => return Ok(invalid_form(None, input, errors)),
    };

    let parent = resolve_parent(pool, &ctx.principal).await?;
    let child = children::insert_child(pool, parent.id, &valid.fields()).await?;
    info!(parent_id = %parent.id, child_id = %child.id, "child added");

    Ok(Outcome::redirect(
        Route::Children,
        Message::success(format!("{} was added.", child.display_name())),
    ))
}

pub async fn edit_child(
    pool: &PgPool,
    ctx: &RequestContext,
    child_id: Uuid,
    input: &ChildInput,
) -> Outcome<ChildFormView> {
    settle(try_edit_child(pool, ctx, child_id, input).await, Route::Children)
}

async fn try_edit_child(
    pool: &PgPool,
    ctx: &RequestContext,
    child_id: Uuid,
    input: &ChildInput,
) -> Result<Outcome<ChildFormView>, WorkflowError> {
    let parent = resolve_parent(pool, &ctx.principal).await?;
    if children::get_owned_child(pool, parent.id, child_id).await?.is_none() {
        return Err(WorkflowError::NotFound("Child".to_owned()));
    }

    let valid = match validate_child(input) {
        Ok(valid) => valid,
        Err(errors) => return Ok(invalid_form(Some(child_id), input, errors)),
    };

    let child = children::update_owned_child(pool, parent.id, child_id, &valid.fields())
        .await?
        .ok_or_else(|| WorkflowError::NotFound("Child".to_owned()))?;

    Ok(Outcome::redirect(
        Route::Children,
        Message::success(format!("{} was updated.", child.display_name())),
    ))
}

/// Delete a child and all of its meal choices.
pub async fn delete_child(pool: &PgPool, ctx: &RequestContext, child_id: Uuid) -> Outcome<()> {
    settle(try_delete_child(pool, ctx, child_id).await, Route::Children)
}

async fn try_delete_child(
    pool: &PgPool,
    ctx: &RequestContext,
    child_id: Uuid,
) -> Result<Outcome<()>, WorkflowError> {
    let parent = resolve_parent(pool, &ctx.principal).await?;
    if !children::delete_owned_child_cascade(pool, parent.id, child_id).await? {
        return Err(WorkflowError::NotFound("Child".to_owned()));
    }
    info!(parent_id = %parent.id, %child_id, "child removed");

    Ok(Outcome::redirect(
        Route::Children,
        Message::success("The child and their meal choices were removed."),
    ))
}
