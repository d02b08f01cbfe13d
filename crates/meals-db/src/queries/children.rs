//! Database query functions for the `children` table.
//!
//! Every lookup that takes a child ID also takes the owning parent's ID, so
//! a client-supplied identifier alone never reaches another family's rows.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Child;

/// Column values for inserting or updating a child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildFields<'a> {
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub year_group: i32,
    pub class_name: Option<&'a str>,
}

pub async fn insert_child(pool: &PgPool, parent_id: Uuid, fields: &ChildFields<'_>) -> Result<Child> {
    let child = sqlx::query_as::<_, Child>(
        "INSERT INTO children (parent_id, first_name, last_name, year_group, class_name) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING *",
    )
    .bind(parent_id)
    .bind(fields.first_name)
    .bind(fields.last_name)
    .bind(fields.year_group)
    .bind(fields.class_name)
    .fetch_one(pool)
    .await
    .context("failed to insert child")?;

    Ok(child)
}

/// List a parent's children ordered by year group, then name.
pub async fn list_children_for_parent(pool: &PgPool, parent_id: Uuid) -> Result<Vec<Child>> {
    let children = sqlx::query_as::<_, Child>(
        "SELECT * FROM children \
         WHERE parent_id = $1 \
         ORDER BY year_group, first_name, last_name, id",
    )
    .bind(parent_id)
    .fetch_all(pool)
    .await
    .context("failed to list children for parent")?;

    Ok(children)
}

/// Fetch a child only if it belongs to `parent_id`.
pub async fn get_owned_child(pool: &PgPool, parent_id: Uuid, id: Uuid) -> Result<Option<Child>> {
    let child =
        sqlx::query_as::<_, Child>("SELECT * FROM children WHERE id = $1 AND parent_id = $2")
            .bind(id)
            .bind(parent_id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch child")?;

    Ok(child)
}

/// Update a child owned by `parent_id`. Returns `None` when no such child.
pub async fn update_owned_child(
    pool: &PgPool,
    parent_id: Uuid,
    id: Uuid,
    fields: &ChildFields<'_>,
) -> Result<Option<Child>> {
    let child = sqlx::query_as::<_, Child>(
        "UPDATE children \
         SET first_name = $1, last_name = $2, year_group = $3, class_name = $4 \
         WHERE id = $5 AND parent_id = $6 \
         RETURNING *",
    )
    .bind(fields.first_name)
    .bind(fields.last_name)
    .bind(fields.year_group)
    .bind(fields.class_name)
    .bind(id)
    .bind(parent_id)
    .fetch_optional(pool)
    .await
    .context("failed to update child")?;

    Ok(child)
}

/// Delete a child owned by `parent_id` together with its meal choices.
///
/// Returns `false` (and deletes nothing) when the child does not exist or
/// belongs to someone else.
pub async fn delete_owned_child_cascade(pool: &PgPool, parent_id: Uuid, id: Uuid) -> Result<bool> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let owned: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM children WHERE id = $1 AND parent_id = $2 FOR UPDATE")
            .bind(id)
            .bind(parent_id)
            .fetch_optional(&mut *tx)
            .await
            .context("failed to lock child")?;

    if owned.is_none() {
        // Rolls back on drop.
        return Ok(false);
    }

    sqlx::query("DELETE FROM meal_choices WHERE child_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("failed to delete meal choices for child")?;

    sqlx::query("DELETE FROM children WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("failed to delete child")?;

    tx.commit().await.context("failed to commit transaction")?;
    Ok(true)
}

/// Total number of children across all parents.
pub async fn count_children(pool: &PgPool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM children")
        .fetch_one(pool)
        .await
        .context("failed to count children")?;

    Ok(count)
}
