//! Database query functions for the `parents` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::Parent;

/// Insert a new parent row.
pub async fn insert_parent(
    pool: &PgPool,
    username: &str,
    full_name: &str,
    email: Option<&str>,
) -> Result<Parent> {
    let parent = sqlx::query_as::<_, Parent>(
        "INSERT INTO parents (username, full_name, email) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(username)
    .bind(full_name)
    .bind(email)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert parent {username:?}"))?;

    Ok(parent)
}

pub async fn get_parent(pool: &PgPool, id: Uuid) -> Result<Option<Parent>> {
    let parent = sqlx::query_as::<_, Parent>("SELECT * FROM parents WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch parent")?;

    Ok(parent)
}

pub async fn get_parent_by_username(pool: &PgPool, username: &str) -> Result<Option<Parent>> {
    let parent = sqlx::query_as::<_, Parent>("SELECT * FROM parents WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await
        .context("failed to fetch parent by username")?;

    Ok(parent)
}

/// Fetch the parent for `username`, creating it with the username as its
/// display name when absent.
///
/// Concurrent first requests for the same principal are resolved by the
/// unique constraint: the losing insert does nothing and the row is read back.
pub async fn get_or_create_parent(pool: &PgPool, username: &str) -> Result<Parent> {
    let inserted = sqlx::query_as::<_, Parent>(
        "INSERT INTO parents (username, full_name) \
         VALUES ($1, $1) \
         ON CONFLICT (username) DO NOTHING \
         RETURNING *",
    )
    .bind(username)
    .fetch_optional(pool)
    .await
    .context("failed to create parent")?;

    if let Some(parent) = inserted {
        info!(username, parent_id = %parent.id, "parent record created");
        return Ok(parent);
    }

    get_parent_by_username(pool, username)
        .await?
        .with_context(|| format!("parent {username:?} vanished after conflict"))
}

/// Change a parent's display name (and optionally email).
pub async fn update_parent_profile(
    pool: &PgPool,
    id: Uuid,
    full_name: &str,
    email: Option<&str>,
) -> Result<Parent> {
    let parent = sqlx::query_as::<_, Parent>(
        "UPDATE parents SET full_name = $1, email = COALESCE($2, email) \
         WHERE id = $3 \
         RETURNING *",
    )
    .bind(full_name)
    .bind(email)
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to update parent profile")?;

    parent.with_context(|| format!("parent {id} not found"))
}

/// Counts of rows removed by [`delete_parent_cascade`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParentDeletion {
    pub choices: u64,
    pub children: u64,
    pub parents: u64,
}

/// Delete a parent, their children, and every choice made for those
/// children, in one transaction. Meals and registrations are untouched.
pub async fn delete_parent_cascade(pool: &PgPool, id: Uuid) -> Result<ParentDeletion> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let choices = sqlx::query(
        "DELETE FROM meal_choices \
         WHERE child_id IN (SELECT id FROM children WHERE parent_id = $1)",
    )
    .bind(id)
    .execute(&mut *tx)
    .await
    .context("failed to delete meal choices for parent")?
    .rows_affected();

    let children = sqlx::query("DELETE FROM children WHERE parent_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("failed to delete children for parent")?
        .rows_affected();

    let parents = sqlx::query("DELETE FROM parents WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("failed to delete parent")?
        .rows_affected();

    tx.commit().await.context("failed to commit transaction")?;

    Ok(ParentDeletion {
        choices,
        children,
        parents,
    })
}
