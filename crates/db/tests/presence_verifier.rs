//! Integration tests for the Postgres presence verifier.
//!
//! Each test gets a fresh database from `sqlx::test` and creates its own
//! table. Run with `DATABASE_URL` set and `--ignored`.

use std::collections::HashMap;
use std::sync::Arc;

use assert_matches::assert_matches;
use serde_json::json;
use sqlx::PgPool;
use verity_core::{CoreError, Factory, PresenceVerifier, Record, RuleSet};
use verity_db::DatabasePresenceVerifier;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn seed_users(pool: &PgPool) {
    sqlx::query(
        "CREATE TABLE users (\
            id BIGINT PRIMARY KEY, \
            email TEXT NOT NULL, \
            status TEXT NOT NULL DEFAULT 'active', \
            deleted_at TIMESTAMPTZ)",
    )
    .execute(pool)
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO users (id, email, status, deleted_at) VALUES \
            (1, 'a@example.com', 'active', NULL), \
            (2, 'b@example.com', 'banned', NULL), \
            (3, 'c@example.com', 'active', now())",
    )
    .execute(pool)
    .await
    .unwrap();
}

fn extras(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn record(value: serde_json::Value) -> Record {
    value.as_object().cloned().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Verifier
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_get_count_with_exclusion(pool: PgPool) {
    seed_users(&pool).await;
    let verifier = DatabasePresenceVerifier::new(pool);

    let count = verifier
        .get_count("users", "email", "a@example.com", None, None, &[])
        .await
        .unwrap();
    assert_eq!(count, 1);

    let count = verifier
        .get_count("users", "email", "a@example.com", Some("1"), None, &[])
        .await
        .unwrap();
    assert_eq!(count, 0);

    let count = verifier
        .get_count("users", "email", "a@example.com", Some("NULL"), Some("id"), &[])
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_get_count_extra_filters(pool: PgPool) {
    seed_users(&pool).await;
    let verifier = DatabasePresenceVerifier::new(pool);

    let live = extras(&[("deleted_at", "NULL")]);
    let count = verifier
        .get_count("users", "email", "c@example.com", None, None, &live)
        .await
        .unwrap();
    assert_eq!(count, 0);

    let not_banned = extras(&[("status", "banned")]);
    let count = verifier
        .get_count("users", "email", "b@example.com", None, None, &not_banned)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_get_multi_count_matches_numeric_column(pool: PgPool) {
    seed_users(&pool).await;
    let verifier = DatabasePresenceVerifier::new(pool);

    let values = vec!["1".to_string(), "2".to_string(), "9".to_string()];
    let count = verifier
        .get_multi_count("users", "id", &values, &[])
        .await
        .unwrap();
    assert_eq!(count, 2);

    let count = verifier.get_multi_count("users", "id", &[], &[]).await.unwrap();
    assert_eq!(count, 0);
}

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_non_numeric_value_against_integer_column_counts_zero(pool: PgPool) {
    seed_users(&pool).await;
    let verifier = DatabasePresenceVerifier::new(pool);

    let count = verifier
        .get_count("users", "id", "abc", None, None, &[])
        .await
        .unwrap();
    assert_eq!(count, 0);

    let count = verifier
        .get_count("users", "id", "2", None, None, &[])
        .await
        .unwrap();
    assert_eq!(count, 1);

    let values = vec!["1".to_string(), "x".to_string()];
    let count = verifier
        .get_multi_count("users", "id", &values, &[])
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_varchar_column_compares_without_truncation(pool: PgPool) {
    sqlx::query("CREATE TABLE handles (id BIGINT PRIMARY KEY, handle VARCHAR(4) NOT NULL)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO handles (id, handle) VALUES (1, 'abcd')")
        .execute(&pool)
        .await
        .unwrap();
    let verifier = DatabasePresenceVerifier::new(pool);

    let count = verifier
        .get_count("handles", "handle", "abcd", None, None, &[])
        .await
        .unwrap();
    assert_eq!(count, 1);

    let count = verifier
        .get_count("handles", "handle", "abcdef", None, None, &[])
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_missing_table_is_store_error(pool: PgPool) {
    let verifier = DatabasePresenceVerifier::new(pool);
    let result = verifier
        .get_count("no_such_table", "email", "a", None, None, &[])
        .await;
    assert!(result.is_err());
}

// ---------------------------------------------------------------------------
// Through the factory
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_unique_and_exists_rules(pool: PgPool) {
    seed_users(&pool).await;
    let factory = Factory::new(None, Some(Arc::new(DatabasePresenceVerifier::new(pool))));

    let rules = RuleSet::new()
        .with("email", "required|email|unique:users,email,1")
        .unwrap()
        .with("owner_ids", "array|exists:users,id,deleted_at,NULL")
        .unwrap();

    let data = record(json!({"email": "a@example.com", "owner_ids": [1, 2]}));
    let mut v = factory.make(&data, rules.clone(), HashMap::new());
    assert!(v.validate().await.unwrap());

    let data = record(json!({"email": "b@example.com", "owner_ids": [1, 3]}));
    let mut v = factory.make(&data, rules, HashMap::new());
    assert!(!v.validate().await.unwrap());
    assert_eq!(
        v.failures().get("email"),
        ["The email has already been taken."]
    );
    assert_eq!(
        v.failures().get("owner_ids"),
        ["The selected owner ids is invalid."]
    );
}

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_store_failure_surfaces_as_error(pool: PgPool) {
    let factory = Factory::new(None, Some(Arc::new(DatabasePresenceVerifier::new(pool))));
    let data = record(json!({"email": "a@example.com"}));
    let mut v = factory.make(
        &data,
        RuleSet::new().with("email", "unique:missing_table").unwrap(),
        HashMap::new(),
    );
    assert_matches!(v.validate().await, Err(CoreError::Store(_)));
}
