//! Database query functions for the `meals` table.

use anyhow::{Context, Result};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::Meal;

/// Insert a meal, or refresh the description of the existing meal with the
/// same name. Returns the stored row.
pub async fn upsert_meal<'e>(
    executor: impl PgExecutor<'e>,
    name: &str,
    description: &str,
) -> Result<Meal> {
    let meal = sqlx::query_as::<_, Meal>(
        "INSERT INTO meals (name, description) VALUES ($1, $2) \
         ON CONFLICT (name) DO UPDATE SET description = EXCLUDED.description \
         RETURNING *",
    )
    .bind(name)
    .bind(description)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to upsert meal {name:?}"))?;

    Ok(meal)
}

pub async fn get_meal(pool: &PgPool, id: Uuid) -> Result<Option<Meal>> {
    let meal = sqlx::query_as::<_, Meal>("SELECT * FROM meals WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch meal")?;

    Ok(meal)
}

pub async fn get_meal_by_name<'e>(executor: impl PgExecutor<'e>, name: &str) -> Result<Option<Meal>> {
    let meal = sqlx::query_as::<_, Meal>("SELECT * FROM meals WHERE name = $1")
        .bind(name)
        .fetch_optional(executor)
        .await
        .with_context(|| format!("failed to look up meal {name:?}"))?;

    Ok(meal)
}

/// List the whole meal catalogue by name.
pub async fn list_meals(pool: &PgPool) -> Result<Vec<Meal>> {
    let meals = sqlx::query_as::<_, Meal>("SELECT * FROM meals ORDER BY name")
        .fetch_all(pool)
        .await
        .context("failed to list meals")?;

    Ok(meals)
}

/// List the meals offered by one registration, by name.
pub async fn list_meals_for_registration(pool: &PgPool, registration_id: Uuid) -> Result<Vec<Meal>> {
    let meals = sqlx::query_as::<_, Meal>(
        "SELECT m.* FROM meals m \
         JOIN registration_meals rm ON rm.meal_id = m.id \
         WHERE rm.registration_id = $1 \
         ORDER BY m.name",
    )
    .bind(registration_id)
    .fetch_all(pool)
    .await
    .context("failed to list meals for registration")?;

    Ok(meals)
}
