//! Shared test utilities for meals integration tests.
//!
//! One PostgreSQL server is shared per test binary and every test gets its
//! own freshly migrated database on it.
//!
//! - **`MEALS_TEST_PG_URL`** set: use that server directly (e.g. a CI
//!   service container).
//! - otherwise: start a container through testcontainers on first use.

use std::time::Duration;

use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgConnection, PgPool};
use testcontainers::ContainerAsync;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use meals_db::models::{Child, Meal, MealRegistration, Parent};
use meals_db::pool;
use meals_db::queries::children::{self, ChildFields};
use meals_db::queries::{meals, parents, registrations};

struct SharedPg {
    base_url: String,
    /// Keeps the container alive. `None` for an external server.
    _container: Option<ContainerAsync<Postgres>>,
}

static SHARED_PG: OnceCell<SharedPg> = OnceCell::const_new();

async fn init_shared_pg() -> SharedPg {
    if let Ok(url) = std::env::var("MEALS_TEST_PG_URL") {
        return SharedPg {
            base_url: url,
            _container: None,
        };
    }

    let container = Postgres::default()
        .with_tag("16")
        .start()
        .await
        .expect("failed to start PostgreSQL container");

    let host = container.get_host().await.expect("failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("failed to get mapped port");

    SharedPg {
        base_url: format!("postgresql://postgres:postgres@{host}:{port}"),
        _container: Some(container),
    }
}

/// Server root URL (no database name) of the shared PostgreSQL.
pub async fn pg_url() -> &'static str {
    let shared = SHARED_PG.get_or_init(init_shared_pg).await;
    &shared.base_url
}

async fn maintenance_pool() -> PgPool {
    let maint_url = format!("{}/postgres", pg_url().await);
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&maint_url)
        .await
        .expect("failed to connect to maintenance database")
}

/// Create a uniquely-named, migrated database. Returns `(pool, db_name)`;
/// pass `db_name` to [`drop_test_db`] when done.
pub async fn create_test_db() -> (PgPool, String) {
    let maint_pool = maintenance_pool().await;
    let db_name = format!("meals_test_{}", Uuid::new_v4().simple());
    let stmt = format!("CREATE DATABASE {db_name}");
    maint_pool
        .execute(stmt.as_str())
        .await
        .unwrap_or_else(|e| panic!("failed to create temp database {db_name}: {e}"));
    maint_pool.close().await;

    let temp_url = format!("{}/{db_name}", pg_url().await);
    let temp_pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&temp_url)
        .await
        .unwrap_or_else(|e| panic!("failed to connect to temp database {db_name}: {e}"));

    pool::run_migrations(&temp_pool)
        .await
        .expect("migrations should succeed");

    (temp_pool, db_name)
}

/// Terminate connections to and drop a temporary database.
pub async fn drop_test_db(db_name: &str) {
    let maint_pool = maintenance_pool().await;

    let terminate = format!(
        "SELECT pg_terminate_backend(pid) \
         FROM pg_stat_activity \
         WHERE datname = '{db_name}' AND pid <> pg_backend_pid()"
    );
    let _ = maint_pool.execute(terminate.as_str()).await;

    let stmt = format!("DROP DATABASE IF EXISTS {db_name}");
    let _ = maint_pool.execute(stmt.as_str()).await;
    maint_pool.close().await;
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub async fn seed_parent(pool: &PgPool, username: &str) -> Parent {
    parents::insert_parent(pool, username, &format!("{username} full name"), None)
        .await
        .expect("insert_parent should succeed")
}

pub async fn seed_child(pool: &PgPool, parent_id: Uuid, first_name: &str, year_group: i32) -> Child {
    let fields = ChildFields {
        first_name,
        last_name: "Tester",
        year_group,
        class_name: None,
    };
    children::insert_child(pool, parent_id, &fields)
        .await
        .expect("insert_child should succeed")
}

pub async fn seed_meal(pool: &PgPool, name: &str) -> Meal {
    meals::upsert_meal(pool, name, "")
        .await
        .expect("upsert_meal should succeed")
}

/// Create the registration for `date` offering exactly `offered`.
pub async fn seed_registration(pool: &PgPool, date: NaiveDate, offered: &[&Meal]) -> MealRegistration {
    let registration = registrations::upsert_registration(pool, date)
        .await
        .expect("upsert_registration should succeed");
    let ids: Vec<Uuid> = offered.iter().map(|m| m.id).collect();
    let mut conn = pool.acquire().await.expect("acquire should succeed");
    registrations::replace_registration_meals(&mut conn, registration.id, &ids)
        .await
        .expect("replace_registration_meals should succeed");
    registration
}

/// Count the choice rows for a (child, registration) pair.
pub async fn count_choices(pool: &PgPool, child_id: Uuid, registration_id: Uuid) -> i64 {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM meal_choices WHERE child_id = $1 AND meal_registration_id = $2",
    )
    .bind(child_id)
    .bind(registration_id)
    .fetch_one(pool)
    .await
    .expect("count should succeed");
    count
}

/// The meal recorded for a (child, registration) pair, if any.
pub async fn chosen_meal(pool: &PgPool, child_id: Uuid, registration_id: Uuid) -> Option<Uuid> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        "SELECT meal_id FROM meal_choices WHERE child_id = $1 AND meal_registration_id = $2",
    )
    .bind(child_id)
    .bind(registration_id)
    .fetch_optional(pool)
    .await
    .expect("meal lookup should succeed");
    row.map(|(meal_id,)| meal_id)
}

// ---------------------------------------------------------------------------
// Lock choreography
// ---------------------------------------------------------------------------

/// Server process id of `conn`, for [`wait_until_blocked_by`].
pub async fn backend_pid(conn: &mut PgConnection) -> i32 {
    let (pid,): (i32,) = sqlx::query_as("SELECT pg_backend_pid()")
        .fetch_one(conn)
        .await
        .expect("pg_backend_pid should succeed");
    pid
}

/// Wait until some session is blocked on a lock held by backend `pid`.
/// Panics after ten seconds.
pub async fn wait_until_blocked_by(pool: &PgPool, pid: i32) {
    for _ in 0..500 {
        let (waiting,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM pg_stat_activity WHERE $1 = ANY(pg_blocking_pids(pid))",
        )
        .bind(pid)
        .fetch_one(pool)
        .await
        .expect("lock query should succeed");
        if waiting > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no session became blocked by backend {pid}");
}
