//! Works out which registration dates still need a decision.
//!
//! A date is undecided when at least one of the parent's children has no
//! choice for it. The first undecided date is where the parent is sent
//! next; once nothing is undecided the workflow falls back to the first
//! date and becomes a review of existing choices.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use meals_db::queries::{choices, registrations};

use crate::error::WorkflowError;

/// Where the parent is in the ordering workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// At least one date still lacks a choice for some child.
    Selecting,
    /// Every date has a choice for every child.
    Reviewing,
    /// No registration dates exist at all.
    NothingToOrder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    /// Orderable dates, strictly ascending.
    pub dates: Vec<NaiveDate>,
    pub first_undecided: Option<NaiveDate>,
    pub mode: Mode,
}

impl Availability {
    /// The date to show when the caller did not ask for one.
    pub fn default_date(&self) -> Option<NaiveDate> {
        self.first_undecided.or_else(|| self.dates.first().copied())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.dates.binary_search(&date).is_ok()
    }
}

/// Resolve availability from the registration dates, the parent's children,
/// and the set of `(child, date)` pairs that already have a choice.
pub fn resolve(
    dates: &[NaiveDate],
    children: &[Uuid],
    decided: &HashSet<(Uuid, NaiveDate)>,
) -> Result<Availability, WorkflowError> {
    if children.is_empty() {
        return Err(WorkflowError::NoChildrenRegistered);
    }

    let mut dates = dates.to_vec();
    dates.sort_unstable();
    dates.dedup();

    let first_undecided = dates
        .iter()
        .copied()
        .find(|date| children.iter().any(|child| !decided.contains(&(*child, *date))));

    let mode = match (first_undecided, dates.is_empty()) {
        (Some(_), _) => Mode::Selecting,
        (None, false) => Mode::Reviewing,
        (None, true) => Mode::NothingToOrder,
    };

    Ok(Availability {
        dates,
        first_undecided,
        mode,
    })
}

/// Load orderable dates (strictly after `today`) and existing choices for
/// `children`, then [`resolve`].
pub async fn load(
    pool: &PgPool,
    children: &[Uuid],
    today: NaiveDate,
) -> Result<Availability, WorkflowError> {
    if children.is_empty() {
        return Err(WorkflowError::NoChildrenRegistered);
    }
    let dates = registrations::list_dates_after(pool, today).await?;
    let decided: HashSet<(Uuid, NaiveDate)> = choices::list_decided_pairs(pool, children, today)
        .await?
        .into_iter()
        .collect();
    resolve(&dates, children, &decided)
}
