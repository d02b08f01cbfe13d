//! Commits one date's worth of validated choices.
//!
//! All upserts for a submission share one transaction. If a concurrent
//! request inserted the same `(child, registration)` pair first, the unique
//! constraint rejects our insert; the whole unit is then retried once, which
//! finds the other row and updates it instead.
//!
//! The registration is locked before any choice is written and the meals
//! are checked against its offered set again under that lock, so a menu
//! import running alongside cannot leave a choice for a withdrawn meal.

use std::collections::HashMap;

use anyhow::Context;
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use meals_db::queries::choices::{self, Upserted};
use meals_db::queries::registrations;

use crate::error::WorkflowError;
use crate::form::{self, ChoiceForm, ValidChoice};
use crate::outcome::FieldError;

const MAX_ATTEMPTS: u32 = 2;

/// What a successful commit did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CommitSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl CommitSummary {
    fn record(&mut self, upserted: Upserted) {
        match upserted {
            Upserted::Created => self.created += 1,
            Upserted::Updated => self.updated += 1,
            Upserted::Unchanged => self.unchanged += 1,
        }
    }
}

/// How one commit attempt ended, short of an error.
enum Attempt {
    Committed(CommitSummary),
    /// Meals no longer offered once the registration was locked.
    Withdrawn(Vec<FieldError>),
}

/// Validate `submitted` against `forms` and, only if every field passes,
/// commit the choices for `registration_id`.
///
/// A single failing field yields [`WorkflowError::PartialValidationFailure`]
/// carrying every field error, and nothing is written.
pub async fn apply_submission(
    pool: &PgPool,
    registration_id: Uuid,
    forms: &[ChoiceForm],
    submitted: &HashMap<String, String>,
) -> Result<CommitSummary, WorkflowError> {
    let valid = form::validate_submission(forms, submitted)
        .map_err(WorkflowError::PartialValidationFailure)?;
    commit_choices(pool, registration_id, &valid).await
}

/// Upsert every choice in one transaction, retrying once on a unique
/// violation. A meal withdrawn from the date in the meantime fails its field
/// with [`form::NOT_OFFERED`] and nothing is written.
pub async fn commit_choices(
    pool: &PgPool,
    registration_id: Uuid,
    valid: &[ValidChoice],
) -> Result<CommitSummary, WorkflowError> {
    let mut attempt = 1;
    loop {
        match try_commit(pool, registration_id, valid).await {
            Ok(Attempt::Committed(summary)) => return Ok(summary),
            Ok(Attempt::Withdrawn(errors)) => {
                return Err(WorkflowError::PartialValidationFailure(errors));
            }
            Err(err) if is_unique_violation(&err) => {
                if attempt >= MAX_ATTEMPTS {
                    return Err(WorkflowError::PersistenceConflict);
                }
                warn!(
                    %registration_id,
                    attempt,
                    "meal choice inserted concurrently, retrying"
                );
                attempt += 1;
            }
            Err(err) => return Err(WorkflowError::UnexpectedPersistenceFailure(err)),
        }
    }
}

async fn try_commit(
    pool: &PgPool,
    registration_id: Uuid,
    valid: &[ValidChoice],
) -> anyhow::Result<Attempt> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let offered = registrations::lock_offered_meals(&mut *tx, registration_id).await?;
    let withdrawn: Vec<FieldError> = valid
        .iter()
        .filter(|choice| !offered.contains(&choice.meal_id))
        .map(|choice| FieldError::new(form::field_name(choice.child_id), form::NOT_OFFERED))
        .collect();
    if !withdrawn.is_empty() {
        debug!(%registration_id, withdrawn = withdrawn.len(), "meals withdrawn before commit");
        return Ok(Attempt::Withdrawn(withdrawn));
    }

    let mut summary = CommitSummary::default();

    for choice in valid {
        let (_, upserted) =
            choices::upsert_choice(&mut *tx, choice.child_id, registration_id, choice.meal_id)
                .await?;
        debug!(child_id = %choice.child_id, ?upserted, "meal choice upserted");
        summary.record(upserted);
    }

    tx.commit().await.context("failed to commit meal choices")?;
    Ok(Attempt::Committed(summary))
}

/// Whether `err` was caused by a unique-constraint violation.
fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|e| e.is_unique_violation())
}
