//! Integration tests for `SqlStore` on in-memory SQLite.

use chronicle_core::context::Context;
use chronicle_core::error::{Error, ErrorKind};
use chronicle_core::store::Store;
use chronicle_sql::{Dialect, SqlStore, create_schema};
use chronicle_test_support::{conformance, record, records};
use sqlx::Row;

async fn sqlite_store() -> SqlStore {
    let store = SqlStore::connect("sqlite::memory:", "events").await.unwrap();
    create_schema(store.pool(), store.table(), store.dialect())
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn test_sqlite_store_conforms() {
    let store = sqlite_store().await;

    conformance::run_all(&store).await;
}

#[tokio::test]
async fn test_connect_infers_dialect() {
    let store = sqlite_store().await;

    assert_eq!(store.dialect(), Dialect::Sqlite);
}

#[tokio::test]
async fn test_schema_creation_is_idempotent() {
    let store = sqlite_store().await;

    let again = create_schema(store.pool(), "events", Dialect::Sqlite).await;

    assert!(again.is_ok());
}

#[tokio::test]
async fn test_direct_insert_blocks_save_of_same_version() {
    // Arrange
    let store = sqlite_store().await;
    let ctx = Context::background();
    sqlx::query(
        "INSERT INTO events (aggregate_id, version, payload, occurred_at_millis) \
         VALUES ('a', 3, X'7B7D', 42)",
    )
    .execute(store.pool())
    .await
    .unwrap();

    // Act
    let duplicate = store.save(&ctx, "a", &records([3])).await;
    let next = store.save(&ctx, "a", &records([4])).await;

    // Assert
    match duplicate {
        Err(Error::DuplicateVersion { aggregate_id, version, source }) => {
            assert_eq!(aggregate_id, "a");
            assert_eq!(version, Some(3));
            assert!(source.is_some());
        }
        other => panic!("expected DuplicateVersion, got {other:?}"),
    }
    assert!(next.is_ok());

    let history = store.fetch(&ctx, "a", 0).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].version, 3);
    assert_eq!(history[0].data, b"{}".to_vec());
    assert_eq!(history[0].at.as_i64(), 42);
    assert_eq!(history[1], record(4));
}

#[tokio::test]
async fn test_failed_batch_rolls_back_earlier_inserts() {
    // Arrange
    let store = sqlite_store().await;
    let ctx = Context::background();
    store.save(&ctx, "a", &records([3])).await.unwrap();

    // Act
    let result = store.save(&ctx, "a", &records([1, 2, 3])).await;

    // Assert
    assert_eq!(result.unwrap_err().kind(), ErrorKind::DuplicateVersion);
    let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM events WHERE aggregate_id = 'a'")
        .fetch_one(store.pool())
        .await
        .unwrap()
        .get("n");
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_missing_table_is_storage_error() {
    let store = SqlStore::connect("sqlite::memory:", "events").await.unwrap();

    let result = store.fetch(&Context::background(), "a", 0).await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::StorageError);
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected() {
    let bad_table = SqlStore::connect("sqlite::memory:", "events;--").await;
    let bad_scheme = SqlStore::connect("oracle://localhost/db", "events").await;

    assert_eq!(bad_table.unwrap_err().kind(), ErrorKind::InvalidConfig);
    assert_eq!(bad_scheme.unwrap_err().kind(), ErrorKind::InvalidConfig);
}
