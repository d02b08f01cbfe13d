//! Database query functions for the `meal_choices` table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::{ChoiceHistoryRow, MealChoice, MealCountRow, OwnedChoice};

/// Look up the choice for a (child, registration) pair, locking the row for
/// the rest of the caller's transaction.
pub async fn find_choice_for_update(
    conn: &mut PgConnection,
    child_id: Uuid,
    registration_id: Uuid,
) -> Result<Option<MealChoice>> {
    let choice = sqlx::query_as::<_, MealChoice>(
        "SELECT * FROM meal_choices \
         WHERE child_id = $1 AND meal_registration_id = $2 \
         FOR UPDATE",
    )
    .bind(child_id)
    .bind(registration_id)
    .fetch_optional(conn)
    .await
    .context("failed to look up meal choice")?;

    Ok(choice)
}

pub async fn insert_choice(
    conn: &mut PgConnection,
    child_id: Uuid,
    registration_id: Uuid,
    meal_id: Uuid,
) -> Result<MealChoice> {
    let choice = sqlx::query_as::<_, MealChoice>(
        "INSERT INTO meal_choices (child_id, meal_registration_id, meal_id) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(child_id)
    .bind(registration_id)
    .bind(meal_id)
    .fetch_one(conn)
    .await
    .context("failed to insert meal choice")?;

    Ok(choice)
}

pub async fn set_choice_meal(conn: &mut PgConnection, id: Uuid, meal_id: Uuid) -> Result<MealChoice> {
    let choice = sqlx::query_as::<_, MealChoice>(
        "UPDATE meal_choices SET meal_id = $1, updated_at = now() \
         WHERE id = $2 \
         RETURNING *",
    )
    .bind(meal_id)
    .bind(id)
    .fetch_optional(conn)
    .await
    .context("failed to update meal choice")?;

    choice.with_context(|| format!("meal choice {id} not found"))
}

/// Whether [`upsert_choice`] created a row or overwrote an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Created,
    Updated,
    Unchanged,
}

/// Record `meal_id` for the pair: look the row up, then update it or create
/// it.
///
/// Two transactions racing on an absent pair can both miss the lookup; the
/// `(child_id, meal_registration_id)` unique constraint then rejects the
/// second insert, and the caller is expected to retry.
pub async fn upsert_choice(
    conn: &mut PgConnection,
    child_id: Uuid,
    registration_id: Uuid,
    meal_id: Uuid,
) -> Result<(MealChoice, Upserted)> {
    match find_choice_for_update(&mut *conn, child_id, registration_id).await? {
        Some(existing) if existing.meal_id == meal_id => Ok((existing, Upserted::Unchanged)),
        Some(existing) => {
            let updated = set_choice_meal(conn, existing.id, meal_id).await?;
            Ok((updated, Upserted::Updated))
        }
        None => {
            let created = insert_choice(conn, child_id, registration_id, meal_id).await?;
            Ok((created, Upserted::Created))
        }
    }
}

/// Choices on one registration for the given children.
pub async fn list_choices_for_registration(
    pool: &PgPool,
    registration_id: Uuid,
    child_ids: &[Uuid],
) -> Result<Vec<MealChoice>> {
    let choices = sqlx::query_as::<_, MealChoice>(
        "SELECT * FROM meal_choices \
         WHERE meal_registration_id = $1 AND child_id = ANY($2::uuid[])",
    )
    .bind(registration_id)
    .bind(child_ids)
    .fetch_all(pool)
    .await
    .context("failed to list choices for registration")?;

    Ok(choices)
}

/// Every (child, date) pair with a choice, for dates strictly after `after`.
pub async fn list_decided_pairs(
    pool: &PgPool,
    child_ids: &[Uuid],
    after: NaiveDate,
) -> Result<Vec<(Uuid, NaiveDate)>> {
    let rows: Vec<(Uuid, NaiveDate)> = sqlx::query_as(
        "SELECT mc.child_id, r.date \
         FROM meal_choices mc \
         JOIN meal_registrations r ON r.id = mc.meal_registration_id \
         WHERE mc.child_id = ANY($1::uuid[]) AND r.date > $2",
    )
    .bind(child_ids)
    .bind(after)
    .fetch_all(pool)
    .await
    .context("failed to list decided dates")?;

    Ok(rows)
}

const OWNED_CHOICE: &str = "SELECT mc.id, mc.child_id, mc.meal_registration_id, mc.meal_id, r.date \
     FROM meal_choices mc \
     JOIN children c ON c.id = mc.child_id \
     JOIN meal_registrations r ON r.id = mc.meal_registration_id \
     WHERE mc.id = $1 AND c.parent_id = $2";

/// Fetch a choice only if its child belongs to `parent_id`.
pub async fn get_owned_choice(
    pool: &PgPool,
    parent_id: Uuid,
    id: Uuid,
) -> Result<Option<OwnedChoice>> {
    let choice = sqlx::query_as::<_, OwnedChoice>(OWNED_CHOICE)
        .bind(id)
        .bind(parent_id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch meal choice")?;

    Ok(choice)
}

/// [`get_owned_choice`] inside the caller's transaction, locking the choice
/// row. A choice deleted concurrently comes back as `None`.
pub async fn get_owned_choice_for_update(
    conn: &mut PgConnection,
    parent_id: Uuid,
    id: Uuid,
) -> Result<Option<OwnedChoice>> {
    let choice = sqlx::query_as::<_, OwnedChoice>(&format!("{OWNED_CHOICE} FOR UPDATE OF mc"))
        .bind(id)
        .bind(parent_id)
        .fetch_optional(conn)
        .await
        .context("failed to lock meal choice")?;

    Ok(choice)
}

pub async fn delete_choice(pool: &PgPool, id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM meal_choices WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to delete meal choice")?;

    Ok(result.rows_affected())
}

/// A parent's choices, newest date first.
pub async fn history_for_parent(pool: &PgPool, parent_id: Uuid) -> Result<Vec<ChoiceHistoryRow>> {
    let rows = sqlx::query_as::<_, ChoiceHistoryRow>(
        "SELECT mc.id AS choice_id, c.id AS child_id, \
                c.first_name AS child_first_name, c.last_name AS child_last_name, \
                r.date, m.id AS meal_id, m.name AS meal_name \
         FROM meal_choices mc \
         JOIN children c ON c.id = mc.child_id \
         JOIN meal_registrations r ON r.id = mc.meal_registration_id \
         JOIN meals m ON m.id = mc.meal_id \
         WHERE c.parent_id = $1 \
         ORDER BY r.date DESC, c.year_group, c.first_name",
    )
    .bind(parent_id)
    .fetch_all(pool)
    .await
    .context("failed to list choice history")?;

    Ok(rows)
}

/// Per date and offered meal, how many children picked it. Meals nobody
/// picked appear with a count of zero.
pub async fn meal_counts(pool: &PgPool, from: NaiveDate, to: NaiveDate) -> Result<Vec<MealCountRow>> {
    let rows = sqlx::query_as::<_, MealCountRow>(
        "SELECT r.date, m.id AS meal_id, m.name AS meal_name, COUNT(mc.id) AS count \
         FROM meal_registrations r \
         JOIN registration_meals rm ON rm.registration_id = r.id \
         JOIN meals m ON m.id = rm.meal_id \
         LEFT JOIN meal_choices mc \
                ON mc.meal_registration_id = r.id AND mc.meal_id = m.id \
         WHERE r.date BETWEEN $1 AND $2 \
         GROUP BY r.date, m.id, m.name \
         ORDER BY r.date ASC, m.name ASC",
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
    .context("failed to aggregate meal counts")?;

    Ok(rows)
}
