//! Database query functions for the `meal_registrations` and
//! `registration_meals` tables.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::{Meal, MealRegistration, RegistrationWithMeals};
use crate::queries::meals::list_meals_for_registration;

/// Insert the registration for `date`, or return the existing one.
pub async fn upsert_registration<'e>(
    executor: impl PgExecutor<'e>,
    date: NaiveDate,
) -> Result<MealRegistration> {
    // The no-op update makes RETURNING yield the existing row on conflict.
    let registration = sqlx::query_as::<_, MealRegistration>(
        "INSERT INTO meal_registrations (date) VALUES ($1) \
         ON CONFLICT (date) DO UPDATE SET date = EXCLUDED.date \
         RETURNING *",
    )
    .bind(date)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to upsert registration for {date}"))?;

    Ok(registration)
}

pub async fn get_registration_by_date(
    pool: &PgPool,
    date: NaiveDate,
) -> Result<Option<MealRegistration>> {
    let registration =
        sqlx::query_as::<_, MealRegistration>("SELECT * FROM meal_registrations WHERE date = $1")
            .bind(date)
            .fetch_optional(pool)
            .await
            .context("failed to fetch registration by date")?;

    Ok(registration)
}

/// Fetch a registration and the meals attached to it.
pub async fn get_registration_with_meals(
    pool: &PgPool,
    date: NaiveDate,
) -> Result<Option<RegistrationWithMeals>> {
    let Some(registration) = get_registration_by_date(pool, date).await? else {
        return Ok(None);
    };
    let meals = list_meals_for_registration(pool, registration.id).await?;
    Ok(Some(RegistrationWithMeals {
        registration,
        meals,
    }))
}

/// Registration dates strictly after `after`, ascending.
pub async fn list_dates_after(pool: &PgPool, after: NaiveDate) -> Result<Vec<NaiveDate>> {
    let rows: Vec<(NaiveDate,)> =
        sqlx::query_as("SELECT date FROM meal_registrations WHERE date > $1 ORDER BY date ASC")
            .bind(after)
            .fetch_all(pool)
            .await
            .context("failed to list registration dates")?;

    Ok(rows.into_iter().map(|(date,)| date).collect())
}

/// Every registration in `[from, to]` with its meals, ascending by date.
pub async fn list_registrations_with_meals(
    pool: &PgPool,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<RegistrationWithMeals>> {
    #[derive(sqlx::FromRow)]
    struct Row {
        registration_id: Uuid,
        date: NaiveDate,
        meal_id: Option<Uuid>,
        meal_name: Option<String>,
        meal_description: Option<String>,
    }

    let rows = sqlx::query_as::<_, Row>(
        "SELECT r.id AS registration_id, r.date, \
                m.id AS meal_id, m.name AS meal_name, m.description AS meal_description \
         FROM meal_registrations r \
         LEFT JOIN registration_meals rm ON rm.registration_id = r.id \
         LEFT JOIN meals m ON m.id = rm.meal_id \
         WHERE r.date BETWEEN $1 AND $2 \
         ORDER BY r.date ASC, m.name ASC",
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
    .context("failed to list registrations with meals")?;

    let mut by_date: BTreeMap<NaiveDate, RegistrationWithMeals> = BTreeMap::new();
    for row in rows {
        let entry = by_date
            .entry(row.date)
            .or_insert_with(|| RegistrationWithMeals {
                registration: MealRegistration {
                    id: row.registration_id,
                    date: row.date,
                },
                meals: Vec::new(),
            });
        if let (Some(id), Some(name)) = (row.meal_id, row.meal_name) {
            entry.meals.push(Meal {
                id,
                name,
                description: row.meal_description.unwrap_or_default(),
            });
        }
    }

    Ok(by_date.into_values().collect())
}

/// Lock a registration against meal-set changes until the caller's
/// transaction ends and return the ids of the meals it offers. A
/// registration that no longer exists offers nothing.
///
/// Writers of `meal_choices` take this lock before touching choice rows;
/// [`replace_registration_meals`] and [`delete_registration_cascade`] take
/// the registration `FOR UPDATE` first as well, so the lock order is always
/// registration, then choices.
pub async fn lock_offered_meals(conn: &mut PgConnection, registration_id: Uuid) -> Result<Vec<Uuid>> {
    let locked = sqlx::query_as::<_, (Uuid,)>(
        "SELECT id FROM meal_registrations WHERE id = $1 FOR SHARE",
    )
    .bind(registration_id)
    .fetch_optional(&mut *conn)
    .await
    .context("failed to lock registration")?;
    if locked.is_none() {
        return Ok(Vec::new());
    }

    let rows: Vec<(Uuid,)> =
        sqlx::query_as("SELECT meal_id FROM registration_meals WHERE registration_id = $1")
            .bind(registration_id)
            .fetch_all(&mut *conn)
            .await
            .context("failed to list offered meals")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Replace the meal set of a registration and drop choices that pointed at
/// a meal no longer offered. Returns the number of dropped choices.
///
/// Runs on the caller's connection so it can join a wider transaction.
pub async fn replace_registration_meals(
    conn: &mut PgConnection,
    registration_id: Uuid,
    meal_ids: &[Uuid],
) -> Result<u64> {
    sqlx::query("SELECT id FROM meal_registrations WHERE id = $1 FOR UPDATE")
        .bind(registration_id)
        .execute(&mut *conn)
        .await
        .context("failed to lock registration")?;

    sqlx::query("DELETE FROM registration_meals WHERE registration_id = $1")
        .bind(registration_id)
        .execute(&mut *conn)
        .await
        .context("failed to clear registration meals")?;

    sqlx::query(
        "INSERT INTO registration_meals (registration_id, meal_id) \
         SELECT $1, meal_id FROM UNNEST($2::uuid[]) AS t(meal_id) \
         ON CONFLICT DO NOTHING",
    )
    .bind(registration_id)
    .bind(meal_ids)
    .execute(&mut *conn)
    .await
    .context("failed to attach meals to registration")?;

    let dropped = sqlx::query(
        "DELETE FROM meal_choices \
         WHERE meal_registration_id = $1 AND NOT (meal_id = ANY($2::uuid[]))",
    )
    .bind(registration_id)
    .bind(meal_ids)
    .execute(&mut *conn)
    .await
    .context("failed to drop choices for withdrawn meals")?
    .rows_affected();

    Ok(dropped)
}

/// Counts of rows removed by [`delete_registration_cascade`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrationDeletion {
    pub choices: u64,
    pub meal_links: u64,
    pub registrations: u64,
}

/// Delete the registration for `date`, its meal links, and all choices
/// made for it, in one transaction.
pub async fn delete_registration_cascade(
    pool: &PgPool,
    date: NaiveDate,
) -> Result<RegistrationDeletion> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let Some((id,)) = sqlx::query_as::<_, (Uuid,)>(
        "SELECT id FROM meal_registrations WHERE date = $1 FOR UPDATE",
    )
    .bind(date)
    .fetch_optional(&mut *tx)
    .await
    .context("failed to lock registration")?
    else {
        return Ok(RegistrationDeletion::default());
    };

    let choices = sqlx::query("DELETE FROM meal_choices WHERE meal_registration_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("failed to delete choices for registration")?
        .rows_affected();

    let meal_links = sqlx::query("DELETE FROM registration_meals WHERE registration_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("failed to delete registration meals")?
        .rows_affected();

    let registrations = sqlx::query("DELETE FROM meal_registrations WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("failed to delete registration")?
        .rows_affected();

    tx.commit().await.context("failed to commit transaction")?;

    Ok(RegistrationDeletion {
        choices,
        meal_links,
        registrations,
    })
}
