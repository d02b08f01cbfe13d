//! The per-date ordering workflow: resolve a date, assemble one form per
//! child, persist a submission, and move on to the next undecided date.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use meals_db::models::{Child, RegistrationWithMeals};
use meals_db::queries::{children, choices, registrations};

use crate::account::resolve_parent;
use crate::availability::{self, Availability, Mode};
use crate::context::RequestContext;
use crate::date::{format_date, parse_date_param};
use crate::error::{WorkflowError, settle};
use crate::form::{self, ChoiceForm};
use crate::outcome::{FieldError, Message, Outcome, Route};
use crate::persist;

/// Everything the presentation layer needs for the order page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderView {
    pub parent_name: String,
    pub dates: Vec<NaiveDate>,
    pub selected_date: Option<NaiveDate>,
    pub mode: Mode,
    pub forms: Vec<ChoiceForm>,
    pub errors: Vec<FieldError>,
    pub nothing_to_order: bool,
}

/// Parent, children, and availability for one request.
struct Workflow {
    parent_name: String,
    children: Vec<Child>,
    child_ids: Vec<Uuid>,
    availability: Availability,
}

async fn start(pool: &PgPool, ctx: &RequestContext) -> Result<Workflow, WorkflowError> {
    let parent = resolve_parent(pool, &ctx.principal).await?;
    let children = children::list_children_for_parent(pool, parent.id).await?;
    let child_ids: Vec<Uuid> = children.iter().map(|c| c.id).collect();
    let availability = availability::load(pool, &child_ids, ctx.today).await?;
    Ok(Workflow {
        parent_name: parent.full_name,
        children,
        child_ids,
        availability,
    })
}

/// How a requested date resolved against the available dates.
enum Requested {
    Default,
    Available(NaiveDate),
    Rejected(Message),
}

fn interpret(param: Option<&str>, availability: &Availability) -> Requested {
    let Some(raw) = param.map(str::trim).filter(|p| !p.is_empty()) else {
        return Requested::Default;
    };
    match parse_date_param(raw) {
        Ok(date) if availability.contains(date) => Requested::Available(date),
        Ok(date) => Requested::Rejected(Message::warning(format!(
            "Meals cannot be ordered for {}.",
            format_date(date)
        ))),
        Err(_) => Requested::Rejected(Message::warning(format!(
            "{raw:?} is not a valid date (expected YYYY-MM-DD); showing the next available date instead."
        ))),
    }
}

async fn assemble_forms(
    pool: &PgPool,
    workflow: &Workflow,
    registration: Option<&RegistrationWithMeals>,
) -> Result<Vec<ChoiceForm>, WorkflowError> {
    let existing = match registration {
        Some(reg) => {
            choices::list_choices_for_registration(pool, reg.registration.id, &workflow.child_ids)
                .await?
        }
        None => Vec::new(),
    };
    Ok(form::assemble(registration, &workflow.children, &existing))
}

/// Show the order page for `date_param`, or for the next undecided date
/// when it is absent, malformed, or not orderable.
pub async fn show_order(
    pool: &PgPool,
    ctx: &RequestContext,
    date_param: Option<&str>,
) -> Outcome<OrderView> {
    settle(try_show_order(pool, ctx, date_param).await, Route::Order(None))
}

async fn try_show_order(
    pool: &PgPool,
    ctx: &RequestContext,
    date_param: Option<&str>,
) -> Result<Outcome<OrderView>, WorkflowError> {
    let workflow = start(pool, ctx).await?;
    let mut messages = Vec::new();

    let selected = match interpret(date_param, &workflow.availability) {
        Requested::Available(date) => Some(date),
        Requested::Default => workflow.availability.default_date(),
        Requested::Rejected(message) => {
            messages.push(message);
            workflow.availability.default_date()
        }
    };

    let registration = match selected {
        Some(date) => registrations::get_registration_with_meals(pool, date).await?,
        None => None,
    };
    let forms = assemble_forms(pool, &workflow, registration.as_ref()).await?;

    let nothing_to_order = registration.is_none();
    if nothing_to_order {
        messages.push(Message::info("There are no upcoming dates to order meals for."));
    } else if workflow.availability.mode == Mode::Reviewing {
        messages.push(Message::info(
            "Every upcoming date has a meal chosen for each child. You can still change them.",
        ));
    }
    debug!(?selected, mode = ?workflow.availability.mode, "order page resolved");

    Ok(Outcome::Render {
        view: OrderView {
            parent_name: workflow.parent_name,
            dates: workflow.availability.dates,
            selected_date: registration.as_ref().map(|r| r.registration.date),
            mode: workflow.availability.mode,
            forms,
            errors: Vec::new(),
            nothing_to_order,
        },
        messages,
    })
}

/// Apply a submission for one date. Any invalid field rejects the whole
/// submission and redisplays every form; on success the caller is sent to
/// the next undecided date, or the first date once everything is decided.
pub async fn submit_order(
    pool: &PgPool,
    ctx: &RequestContext,
    date_param: Option<&str>,
    submitted: &HashMap<String, String>,
) -> Outcome<OrderView> {
    settle(
        try_submit_order(pool, ctx, date_param, submitted).await,
        Route::Order(None),
    )
}

async fn try_submit_order(
    pool: &PgPool,
    ctx: &RequestContext,
    date_param: Option<&str>,
    submitted: &HashMap<String, String>,
) -> Result<Outcome<OrderView>, WorkflowError> {
    let workflow = start(pool, ctx).await?;
    let fallback = Route::Order(workflow.availability.default_date());

    let date = match interpret(date_param, &workflow.availability) {
        Requested::Available(date) => date,
        Requested::Rejected(message) => return Ok(Outcome::redirect(fallback, message)),
        Requested::Default => match workflow.availability.default_date() {
            Some(date) => date,
            None => {
                return Ok(Outcome::redirect(
                    Route::Order(None),
                    Message::info("There are no upcoming dates to order meals for."),
                ));
            }
        },
    };

    let Some(registration) = registrations::get_registration_with_meals(pool, date).await? else {
        return Ok(Outcome::redirect(
            fallback,
            Message::warning(format!("Meals cannot be ordered for {}.", format_date(date))),
        ));
    };
    let forms = assemble_forms(pool, &workflow, Some(&registration)).await?;

    let summary =
        match persist::apply_submission(pool, registration.registration.id, &forms, submitted)
            .await
        {
            Ok(summary) => summary,
            Err(WorkflowError::PartialValidationFailure(errors)) => {
                debug!(%date, failed = errors.len(), "order submission rejected");
                let forms = form::redisplay(forms, submitted, &errors);
                return Ok(Outcome::Invalid {
                    view: OrderView {
                        parent_name: workflow.parent_name,
                        dates: workflow.availability.dates,
                        selected_date: Some(date),
                        mode: workflow.availability.mode,
                        forms,
                        errors,
                        nothing_to_order: false,
                    },
                    messages: vec![Message::error(
                        "Nothing was saved. Please correct the highlighted choices.",
                    )],
                });
            }
            Err(err) => return Err(err),
        };

    info!(
        username = %ctx.principal.username,
        %date,
        created = summary.created,
        updated = summary.updated,
        unchanged = summary.unchanged,
        "meal choices saved"
    );

    let next = availability::load(pool, &workflow.child_ids, ctx.today).await?;
    let mut messages = vec![Message::success(format!(
        "Meal choices saved for {}.",
        format_date(date)
    ))];
    if next.mode == Mode::Reviewing {
        messages.push(Message::info(
            "Every upcoming date now has a meal chosen for each child.",
        ));
    }

    Ok(Outcome::Redirect {
        to: Route::Order(next.default_date()),
        messages,
    })
}
