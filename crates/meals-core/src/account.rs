//! The parent record behind an authenticated principal.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;

use meals_db::models::Parent;
use meals_db::queries::{children, parents};

use crate::context::RequestContext;
use crate::error::{WorkflowError, settle};
use crate::outcome::{FieldError, Message, Outcome, Route};
use crate::token::{Principal, Role};

const MAX_FULL_NAME: usize = 150;
const MAX_EMAIL: usize = 254;

/// Look up the parent for `principal`, creating one on first sight.
///
/// Staff principals never get a parent record: every parent page answers
/// them with [`WorkflowError::Forbidden`].
pub async fn resolve_parent(pool: &PgPool, principal: &Principal) -> Result<Parent, WorkflowError> {
    if principal.role != Role::Parent {
        return Err(WorkflowError::Forbidden);
    }
    Ok(parents::get_or_create_parent(pool, &principal.username).await?)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileView {
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
    pub role: Role,
    pub children: usize,
    pub errors: Vec<FieldError>,
}

/// Submitted profile form. Missing fields deserialize as empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileInput {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidProfile {
    pub full_name: String,
    /// `None` keeps the stored address.
    pub email: Option<String>,
}

pub fn validate_profile(input: &ProfileInput) -> Result<ValidProfile, Vec<FieldError>> {
    let mut errors = Vec::new();

    let full_name = input.full_name.trim();
    if full_name.is_empty() {
        errors.push(FieldError::new("full_name", "Please enter your name."));
    } else if full_name.chars().count() > MAX_FULL_NAME {
        errors.push(FieldError::new(
            "full_name",
            format!("Name must be at most {MAX_FULL_NAME} characters."),
        ));
    }

    let email = input.email.trim();
    if !email.is_empty() && (!email.contains('@') || email.len() > MAX_EMAIL) {
        errors.push(FieldError::new("email", "Please enter a valid email address."));
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(ValidProfile {
        full_name: full_name.to_owned(),
        email: (!email.is_empty()).then(|| email.to_owned()),
    })
}

async fn profile_view(
    pool: &PgPool,
    ctx: &RequestContext,
    parent: Parent,
) -> Result<ProfileView, WorkflowError> {
    let children = children::list_children_for_parent(pool, parent.id).await?;
    Ok(ProfileView {
        username: parent.username,
        full_name: parent.full_name,
        email: parent.email,
        role: ctx.principal.role,
        children: children.len(),
        errors: Vec::new(),
    })
}

pub async fn show_profile(pool: &PgPool, ctx: &RequestContext) -> Outcome<ProfileView> {
    settle(load_profile(pool, ctx).await.map(Outcome::render), Route::Account)
}

async fn load_profile(pool: &PgPool, ctx: &RequestContext) -> Result<ProfileView, WorkflowError> {
    let parent = resolve_parent(pool, &ctx.principal).await?;
    profile_view(pool, ctx, parent).await
}

pub async fn update_profile(
    pool: &PgPool,
    ctx: &RequestContext,
    input: &ProfileInput,
) -> Outcome<ProfileView> {
    settle(try_update_profile(pool, ctx, input).await, Route::Account)
}

async fn try_update_profile(
    pool: &PgPool,
    ctx: &RequestContext,
    input: &ProfileInput,
) -> Result<Outcome<ProfileView>, WorkflowError> {
    let parent = resolve_parent(pool, &ctx.principal).await?;

    let valid = match validate_profile(input) {
        Ok(valid) => valid,
        Err(errors) => {
            let mut view = profile_view(pool, ctx, parent).await?;
            view.full_name = input.full_name.clone();
            view.errors = errors;
            return Ok(Outcome::Invalid {
                view,
                messages: vec![Message::error("Please correct the errors below.")],
            });
        }
    };

    parents::update_parent_profile(pool, parent.id, &valid.full_name, valid.email.as_deref())
        .await?;
    Ok(Outcome::redirect(
        Route::Account,
        Message::success("Your details were updated."),
    ))
}

/// Delete the caller's parent record with all children and their choices.
pub async fn delete_account(pool: &PgPool, ctx: &RequestContext) -> Outcome<()> {
    settle(try_delete_account(pool, ctx).await, Route::Account)
}

async fn try_delete_account(
    pool: &PgPool,
    ctx: &RequestContext,
) -> Result<Outcome<()>, WorkflowError> {
    let parent = resolve_parent(pool, &ctx.principal).await?;
    let removed = parents::delete_parent_cascade(pool, parent.id).await?;
    info!(
        username = %parent.username,
        children = removed.children,
        choices = removed.choices,
        "parent account deleted"
    );
    Ok(Outcome::redirect(
        Route::Login,
        Message::info("Your account, children and meal choices were deleted."),
    ))
}
