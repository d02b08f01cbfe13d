//! Recoverable failures of the ordering workflow and how each one is shown
//! to the user.

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{error, warn};

use crate::outcome::{FieldError, Message, Outcome, Route};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("no children registered for this parent")]
    NoChildrenRegistered,

    #[error("invalid date {0:?} (expected YYYY-MM-DD)")]
    InvalidDateFormat(String),

    #[error("{} field(s) failed validation", .0.len())]
    PartialValidationFailure(Vec<FieldError>),

    #[error("choices for {date} can no longer be changed")]
    PastDateImmutable { date: NaiveDate },

    #[error("concurrent update conflict on meal choices")]
    PersistenceConflict,

    #[error("{0} not found")]
    NotFound(String),

    #[error("this page is not available to this account")]
    Forbidden,

    #[error("persistence failure: {0:#}")]
    UnexpectedPersistenceFailure(#[from] anyhow::Error),
}

impl WorkflowError {
    /// Turn the error into something the web layer can show. `fallback` is
    /// where the user lands when the error has no page of its own.
    pub fn into_outcome<V>(self, fallback: Route) -> Outcome<V> {
        match self {
            Self::NoChildrenRegistered => Outcome::redirect(
                Route::AddChild,
                Message::info("Add a child before choosing meals."),
            ),
            Self::InvalidDateFormat(raw) => Outcome::redirect(
                fallback,
                Message::warning(format!("{raw:?} is not a valid date.")),
            ),
            Self::PartialValidationFailure(errors) => Outcome::Redirect {
                to: fallback,
                messages: errors
                    .into_iter()
                    .map(|e| Message::error(format!("{}: {}", e.field, e.message)))
                    .collect(),
            },
            Self::PastDateImmutable { date } => Outcome::redirect(
                fallback,
                Message::error(format!(
                    "Meal choices for {} can no longer be changed.",
                    date.format("%Y-%m-%d")
                )),
            ),
            Self::PersistenceConflict => {
                warn!("meal choices changed concurrently; giving up after retry");
                Outcome::Failed {
                    messages: vec![Message::error(
                        "Your choices were changed somewhere else at the same time. Please try again.",
                    )],
                }
            }
            Self::NotFound(what) => Outcome::NotFound {
                messages: vec![Message::error(format!("{what} not found."))],
            },
            Self::Forbidden => Outcome::Forbidden {
                messages: vec![Message::error("You do not have access to this page.")],
            },
            Self::UnexpectedPersistenceFailure(err) => {
                error!(error = %format!("{err:#}"), "workflow persistence failure");
                Outcome::Failed {
                    messages: vec![Message::error("Something went wrong. Please try again.")],
                }
            }
        }
    }
}

/// Collapse a workflow result into an outcome.
pub fn settle<V>(result: Result<Outcome<V>, WorkflowError>, fallback: Route) -> Outcome<V> {
    result.unwrap_or_else(|err| err.into_outcome(fallback))
}
