//! Integration tests for meal choice queries.

use chrono::NaiveDate;

use meals_db::queries::{choices, registrations};
use meals_db::queries::choices::Upserted;
use meals_test_utils::{
    count_choices, create_test_db, drop_test_db, seed_child, seed_meal, seed_parent,
    seed_registration,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn upsert_creates_then_updates_same_row() {
    let (pool, db_name) = create_test_db().await;

    let parent = seed_parent(&pool, "parent1").await;
    let child = seed_child(&pool, parent.id, "Alice", 3).await;
    let a = seed_meal(&pool, "Meal A").await;
    let b = seed_meal(&pool, "Meal B").await;
    let reg = seed_registration(&pool, date(2030, 3, 4), &[&a, &b]).await;

    let mut conn = pool.acquire().await.unwrap();
    let (first, how) = choices::upsert_choice(&mut conn, child.id, reg.id, a.id)
        .await
        .unwrap();
    assert_eq!(how, Upserted::Created);

    let (again, how) = choices::upsert_choice(&mut conn, child.id, reg.id, a.id)
        .await
        .unwrap();
    assert_eq!(how, Upserted::Unchanged);
    assert_eq!(again.id, first.id);

    let (changed, how) = choices::upsert_choice(&mut conn, child.id, reg.id, b.id)
        .await
        .unwrap();
    assert_eq!(how, Upserted::Updated);
    assert_eq!(changed.id, first.id);
    assert_eq!(changed.meal_id, b.id);
    drop(conn);

    assert_eq!(count_choices(&pool, child.id, reg.id).await, 1);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn duplicate_insert_hits_unique_constraint() {
    let (pool, db_name) = create_test_db().await;

    let parent = seed_parent(&pool, "parent1").await;
    let child = seed_child(&pool, parent.id, "Alice", 3).await;
    let a = seed_meal(&pool, "Meal A").await;
    let reg = seed_registration(&pool, date(2030, 3, 4), &[&a]).await;

    let mut conn = pool.acquire().await.unwrap();
    choices::insert_choice(&mut conn, child.id, reg.id, a.id)
        .await
        .unwrap();
    let err = choices::insert_choice(&mut conn, child.id, reg.id, a.id)
        .await
        .expect_err("second insert must violate the unique pair");

    let db_err = err
        .downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .expect("should be a database error");
    assert!(db_err.is_unique_violation());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn decided_pairs_and_ownership() {
    let (pool, db_name) = create_test_db().await;

    let parent = seed_parent(&pool, "parent1").await;
    let stranger = seed_parent(&pool, "parent2").await;
    let child = seed_child(&pool, parent.id, "Alice", 3).await;
    let a = seed_meal(&pool, "Meal A").await;
    let early = seed_registration(&pool, date(2030, 3, 4), &[&a]).await;
    let late = seed_registration(&pool, date(2030, 3, 5), &[&a]).await;

    let mut conn = pool.acquire().await.unwrap();
    let (c1, _) = choices::upsert_choice(&mut conn, child.id, early.id, a.id)
        .await
        .unwrap();
    choices::upsert_choice(&mut conn, child.id, late.id, a.id)
        .await
        .unwrap();
    drop(conn);

    let pairs = choices::list_decided_pairs(&pool, &[child.id], date(2030, 3, 4))
        .await
        .unwrap();
    assert_eq!(pairs, vec![(child.id, date(2030, 3, 5))]);

    let dates = registrations::list_dates_after(&pool, date(2030, 3, 1))
        .await
        .unwrap();
    assert_eq!(dates, vec![date(2030, 3, 4), date(2030, 3, 5)]);

    let owned = choices::get_owned_choice(&pool, parent.id, c1.id)
        .await
        .unwrap()
        .expect("owner should see the choice");
    assert_eq!(owned.date, date(2030, 3, 4));
    assert!(
        choices::get_owned_choice(&pool, stranger.id, c1.id)
            .await
            .unwrap()
            .is_none()
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn meal_counts_include_unpicked_meals() {
    let (pool, db_name) = create_test_db().await;

    let parent = seed_parent(&pool, "parent1").await;
    let c1 = seed_child(&pool, parent.id, "Alice", 3).await;
    let c2 = seed_child(&pool, parent.id, "Bob", 4).await;
    let a = seed_meal(&pool, "Meal A").await;
    let b = seed_meal(&pool, "Meal B").await;
    let reg = seed_registration(&pool, date(2030, 6, 10), &[&a, &b]).await;

    let mut conn = pool.acquire().await.unwrap();
    choices::upsert_choice(&mut conn, c1.id, reg.id, a.id).await.unwrap();
    choices::upsert_choice(&mut conn, c2.id, reg.id, a.id).await.unwrap();
    drop(conn);

    let rows = choices::meal_counts(&pool, date(2030, 6, 1), date(2030, 6, 30))
        .await
        .unwrap();
    let summary: Vec<(&str, i64)> = rows.iter().map(|r| (r.meal_name.as_str(), r.count)).collect();
    assert_eq!(summary, vec![("Meal A", 2), ("Meal B", 0)]);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn replacing_meal_set_drops_withdrawn_choices() {
    let (pool, db_name) = create_test_db().await;

    let parent = seed_parent(&pool, "parent1").await;
    let child = seed_child(&pool, parent.id, "Alice", 3).await;
    let a = seed_meal(&pool, "Meal A").await;
    let b = seed_meal(&pool, "Meal B").await;
    let reg = seed_registration(&pool, date(2030, 6, 10), &[&a, &b]).await;

    let mut conn = pool.acquire().await.unwrap();
    choices::upsert_choice(&mut conn, child.id, reg.id, a.id).await.unwrap();
    let dropped = registrations::replace_registration_meals(&mut conn, reg.id, &[b.id])
        .await
        .unwrap();
    drop(conn);

    assert_eq!(dropped, 1);
    assert_eq!(count_choices(&pool, child.id, reg.id).await, 0);
    let with_meals = registrations::get_registration_with_meals(&pool, reg.date)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(with_meals.meals, vec![b]);

    pool.close().await;
    drop_test_db(&db_name).await;
}
