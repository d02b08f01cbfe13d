//! Integration tests for the explicit cascade deletes.

use chrono::NaiveDate;
use sqlx::PgPool;

use meals_db::queries::{children, choices, meals, parents, registrations};
use meals_test_utils::{
    count_choices, create_test_db, drop_test_db, seed_child, seed_meal, seed_parent,
    seed_registration,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn count(pool: &PgPool, table: &str) -> i64 {
    let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap();
    n
}

#[tokio::test]
async fn deleting_parent_removes_children_and_choices_only() {
    let (pool, db_name) = create_test_db().await;

    let parent = seed_parent(&pool, "parent1").await;
    let other = seed_parent(&pool, "parent2").await;
    let c1 = seed_child(&pool, parent.id, "Alice", 3).await;
    let c2 = seed_child(&pool, parent.id, "Bob", 4).await;
    let other_child = seed_child(&pool, other.id, "Carol", 5).await;
    let meal = seed_meal(&pool, "Meal A").await;
    let reg = seed_registration(&pool, date(2030, 1, 7), &[&meal]).await;

    let mut conn = pool.acquire().await.unwrap();
    for child in [&c1, &c2, &other_child] {
        choices::upsert_choice(&mut conn, child.id, reg.id, meal.id)
            .await
            .unwrap();
    }
    drop(conn);

    let deleted = parents::delete_parent_cascade(&pool, parent.id).await.unwrap();
    assert_eq!(deleted.choices, 2);
    assert_eq!(deleted.children, 2);
    assert_eq!(deleted.parents, 1);

    assert!(parents::get_parent(&pool, parent.id).await.unwrap().is_none());
    assert!(
        children::list_children_for_parent(&pool, parent.id)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(count_choices(&pool, c1.id, reg.id).await, 0);
    assert_eq!(count_choices(&pool, other_child.id, reg.id).await, 1);
    assert_eq!(count(&pool, "meals").await, 1);
    assert_eq!(count(&pool, "meal_registrations").await, 1);
    assert_eq!(count(&pool, "registration_meals").await, 1);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn child_delete_is_filtered_by_parent() {
    let (pool, db_name) = create_test_db().await;

    let owner = seed_parent(&pool, "owner").await;
    let intruder = seed_parent(&pool, "intruder").await;
    let child = seed_child(&pool, owner.id, "Alice", 2).await;

    let removed = children::delete_owned_child_cascade(&pool, intruder.id, child.id)
        .await
        .unwrap();
    assert!(!removed);
    assert!(
        children::get_owned_child(&pool, owner.id, child.id)
            .await
            .unwrap()
            .is_some()
    );

    let removed = children::delete_owned_child_cascade(&pool, owner.id, child.id)
        .await
        .unwrap();
    assert!(removed);
    assert!(
        children::get_owned_child(&pool, owner.id, child.id)
            .await
            .unwrap()
            .is_none()
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn deleting_registration_removes_its_choices() {
    let (pool, db_name) = create_test_db().await;

    let parent = seed_parent(&pool, "parent1").await;
    let child = seed_child(&pool, parent.id, "Alice", 3).await;
    let meal = seed_meal(&pool, "Meal A").await;
    let reg = seed_registration(&pool, date(2030, 1, 7), &[&meal]).await;

    let mut conn = pool.acquire().await.unwrap();
    choices::upsert_choice(&mut conn, child.id, reg.id, meal.id)
        .await
        .unwrap();
    drop(conn);

    let deleted = registrations::delete_registration_cascade(&pool, reg.date)
        .await
        .unwrap();
    assert_eq!(deleted.choices, 1);
    assert_eq!(deleted.meal_links, 1);
    assert_eq!(deleted.registrations, 1);
    assert!(meals::get_meal(&pool, meal.id).await.unwrap().is_some());

    let nothing = registrations::delete_registration_cascade(&pool, date(2030, 1, 8))
        .await
        .unwrap();
    assert_eq!(nothing.registrations, 0);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn get_or_create_parent_is_idempotent() {
    let (pool, db_name) = create_test_db().await;

    let first = parents::get_or_create_parent(&pool, "newcomer").await.unwrap();
    assert_eq!(first.full_name, "newcomer");
    let second = parents::get_or_create_parent(&pool, "newcomer").await.unwrap();
    assert_eq!(first.id, second.id);

    pool.close().await;
    drop_test_db(&db_name).await;
}
