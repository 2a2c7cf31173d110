//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p record-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use record_store::{PostgresRecordStore, PutOptions, RecordStore, StoreError, Version};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Create a temporary pool just for migrations
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_records_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresRecordStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE records")
        .execute(&pool)
        .await
        .unwrap();

    PostgresRecordStore::new(pool)
}

#[tokio::test]
async fn put_and_get_record() {
    let store = get_test_store().await;

    let payload = serde_json::json!({"quantity_on_hand": 10, "quantity_reserved": 0});
    let version = store
        .put("inventory", "SKU-1@W1", payload.clone(), PutOptions::expect_new())
        .await
        .unwrap();
    assert_eq!(version, Version::first());

    let record = store.get("inventory", "SKU-1@W1").await.unwrap().unwrap();
    assert_eq!(record.payload, payload);
    assert_eq!(record.version, Version::first());
    assert_eq!(record.collection, "inventory");
    assert_eq!(record.key, "SKU-1@W1");
}

#[tokio::test]
async fn get_missing_record_returns_none() {
    let store = get_test_store().await;
    let record = store.get("inventory", "SKU-404@W1").await.unwrap();
    assert!(record.is_none());
}

#[tokio::test]
async fn version_conflict_on_stale_write() {
    let store = get_test_store().await;

    let v1 = store
        .put("checkouts", "c1", serde_json::json!({"state": "initiated"}), PutOptions::expect_new())
        .await
        .unwrap();
    store
        .put(
            "checkouts",
            "c1",
            serde_json::json!({"state": "payment_pending"}),
            PutOptions::expect_version(v1),
        )
        .await
        .unwrap();

    // A writer still holding version 1 must fail
    let result = store
        .put(
            "checkouts",
            "c1",
            serde_json::json!({"state": "failed"}),
            PutOptions::expect_version(v1),
        )
        .await;
    assert!(matches!(result, Err(StoreError::VersionConflict { .. })));

    // The stored payload is the second writer's
    let record = store.get("checkouts", "c1").await.unwrap().unwrap();
    assert_eq!(record.payload["state"], "payment_pending");
}

#[tokio::test]
async fn expect_new_rejects_existing_record() {
    let store = get_test_store().await;

    store
        .put("escrows", "t1", serde_json::json!({"amount": 100}), PutOptions::expect_new())
        .await
        .unwrap();

    let result = store
        .put("escrows", "t1", serde_json::json!({"amount": 200}), PutOptions::expect_new())
        .await;
    assert!(matches!(result, Err(StoreError::VersionConflict { .. })));
}

#[tokio::test]
async fn delete_then_get_returns_none() {
    let store = get_test_store().await;

    store
        .put("reservations", "r1", serde_json::json!({"status": "held"}), PutOptions::expect_new())
        .await
        .unwrap();
    store
        .delete("reservations", "r1", PutOptions::new())
        .await
        .unwrap();

    assert!(store.get("reservations", "r1").await.unwrap().is_none());

    // Deleting again is a no-op
    store
        .delete("reservations", "r1", PutOptions::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn list_returns_collection_in_key_order() {
    let store = get_test_store().await;

    store
        .put("inventory", "SKU-2@W1", serde_json::json!(2), PutOptions::new())
        .await
        .unwrap();
    store
        .put("inventory", "SKU-1@W1", serde_json::json!(1), PutOptions::new())
        .await
        .unwrap();
    store
        .put("checkouts", "c1", serde_json::json!(3), PutOptions::new())
        .await
        .unwrap();

    let records = store.list("inventory").await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].key, "SKU-1@W1");
    assert_eq!(records[1].key, "SKU-2@W1");
}

#[tokio::test]
async fn stream_collection_yields_all_records() {
    use futures_util::StreamExt;

    let store = get_test_store().await;

    for i in 0..5 {
        store
            .put(
                "reservations",
                &format!("r{i}"),
                serde_json::json!({"status": "held"}),
                PutOptions::new(),
            )
            .await
            .unwrap();
    }

    let stream = store.stream_collection("reservations").await.unwrap();
    let records: Vec<_> = stream.collect().await;
    assert_eq!(records.len(), 5);
    assert!(records.iter().all(|r| r.is_ok()));
}

#[tokio::test]
async fn get_version_tracks_writes() {
    let store = get_test_store().await;

    assert!(store.get_version("rmas", "RMA-1").await.unwrap().is_none());

    let v1 = store
        .put("rmas", "RMA-1", serde_json::json!({"state": "requested"}), PutOptions::expect_new())
        .await
        .unwrap();
    store
        .put(
            "rmas",
            "RMA-1",
            serde_json::json!({"state": "approved"}),
            PutOptions::expect_version(v1),
        )
        .await
        .unwrap();

    assert_eq!(
        store.get_version("rmas", "RMA-1").await.unwrap(),
        Some(Version::new(2))
    );
}

#[tokio::test]
async fn concurrent_writers_serialize_per_record() {
    let store = Arc::new(get_test_store().await);

    store
        .put("inventory", "SKU-HOT@W1", serde_json::json!({"n": 0}), PutOptions::expect_new())
        .await
        .unwrap();

    // Two writers read the same version; exactly one may win
    let v = store
        .get_version("inventory", "SKU-HOT@W1")
        .await
        .unwrap()
        .unwrap();

    let a = store.clone();
    let b = store.clone();
    let (ra, rb) = tokio::join!(
        a.put("inventory", "SKU-HOT@W1", serde_json::json!({"n": 1}), PutOptions::expect_version(v)),
        b.put("inventory", "SKU-HOT@W1", serde_json::json!({"n": 2}), PutOptions::expect_version(v)),
    );

    let wins = [ra.is_ok(), rb.is_ok()].iter().filter(|w| **w).count();
    assert_eq!(wins, 1);
}
