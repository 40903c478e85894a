//! Snapshot cache behavior against a real (in-memory) SQLite backend.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use chrono::Local;
use docmirror_lib::api::query::Query;
use docmirror_lib::api::query::QueryPage;
use docmirror_lib::cache::KeyValueStore;
use docmirror_lib::cache::SnapshotCache;
use docmirror_lib::cache::SqliteStore;
use docmirror_lib::error::ApiError;
use docmirror_lib::error::Error;
use docmirror_lib::model::DatasetRecord;
use docmirror_lib::store::DocumentStore;
use docmirror_lib::store::MemoryStore;

async fn setup() -> (Arc<SqliteStore>, Arc<MemoryStore>, SnapshotCache) {
    let kv = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let store = Arc::new(MemoryStore::new());
    let snapshots = SnapshotCache::new(kv.clone(), store.clone());
    (kv, store, snapshots)
}

fn record(id: &str, name: &str) -> DatasetRecord {
    DatasetRecord::new(id).set("name", name)
}

#[tokio::test]
async fn test_read_after_write_returns_exactly_what_was_written() {
    let (_, _, snapshots) = setup().await;

    let records = vec![record("srv-01", "alpha"), record("srv-02", "beta")];
    snapshots.write("servers", &records).await.unwrap();

    assert_eq!(snapshots.read("servers").await.unwrap(), records);
}

#[tokio::test]
async fn test_load_is_cache_first_read_through() {
    let (_, store, snapshots) = setup().await;
    store.insert("servers", record("srv-01", "alpha"));

    let first = snapshots.load("servers", "servers").await;
    assert!(first.is_fresh());
    assert_eq!(first.data().len(), 1);

    // A remote write after the snapshot is not visible through load.
    store.insert("servers", record("srv-02", "beta"));
    let second = snapshots.load("servers", "servers").await;
    assert!(second.is_cached());
    assert_eq!(second.data().len(), 1);
}

#[tokio::test]
async fn test_force_refresh_drops_and_refetches() {
    let (_, store, snapshots) = setup().await;
    store.insert("servers", record("srv-01", "alpha"));
    snapshots.load("servers", "servers").await;

    store.insert("servers", record("srv-02", "beta"));
    let refreshed = snapshots.force_refresh("servers", "servers").await;

    assert!(refreshed.is_fresh());
    assert_eq!(refreshed.data().len(), 2);
}

struct FailingStore;

#[async_trait]
impl DocumentStore for FailingStore {
    async fn query(&self, _collection: &str, _query: &Query) -> Result<QueryPage, Error> {
        Err(ApiError::http(503, "unavailable").into())
    }

    async fn delete_batch(&self, _collection: &str, _ids: &[String]) -> Result<(), Error> {
        Err(ApiError::http(503, "unavailable").into())
    }
}

#[tokio::test]
async fn test_load_swallows_fetch_failure_and_resolves_empty() {
    let kv = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let snapshots = SnapshotCache::new(kv, Arc::new(FailingStore));

    let response = snapshots.load("servers", "servers").await;
    assert!(response.cache.is_none());
    assert!(response.data().is_empty());

    // Nothing was persisted for the failed fetch.
    assert!(snapshots.read("servers").await.is_none());
}

#[tokio::test]
async fn test_cleanup_stale_removes_only_other_days() {
    let (kv, _, snapshots) = setup().await;

    snapshots
        .write("servers", &[record("srv-01", "alpha")])
        .await
        .unwrap();

    // Seed an entry keyed to yesterday, as a previous session would have.
    let yesterday = (Local::now() - Duration::days(1)).format("%Y-%m-%d");
    let stale_key = format!("snapshot_servers_{yesterday}");
    kv.set(&stale_key, b"{}".to_vec()).await.unwrap();

    assert_eq!(snapshots.cleanup_stale().await, 1);

    assert!(kv.get(&stale_key).await.unwrap().is_none());
    assert_eq!(snapshots.read("servers").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_clear_all_removes_every_snapshot() {
    let (kv, _, snapshots) = setup().await;

    snapshots.write("servers", &[record("s", "a")]).await.unwrap();
    snapshots.write("devices", &[record("d", "b")]).await.unwrap();

    assert_eq!(snapshots.clear_all().await, 2);
    assert!(snapshots.read("servers").await.is_none());
    assert_eq!(kv.keys("snapshot_").await.unwrap().len(), 0);
}

#[tokio::test]
async fn test_corrupt_entry_is_discarded_as_a_miss() {
    let (kv, _, snapshots) = setup().await;

    let key = snapshots.key_for("servers");
    kv.set(&key, b"not json at all".to_vec()).await.unwrap();

    assert!(snapshots.read("servers").await.is_none());
    // The malformed entry was deleted, not left to fail again.
    assert!(kv.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_custom_prefix_isolates_snapshot_keys() {
    let kv = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let store = Arc::new(MemoryStore::new());
    let snapshots =
        SnapshotCache::new(kv.clone(), store.clone()).with_prefix("mirror_");

    snapshots.write("servers", &[record("s1", "a")]).await.unwrap();

    assert!(snapshots.key_for("servers").starts_with("mirror_servers_"));
    assert_eq!(kv.keys("mirror_").await.unwrap().len(), 1);
    assert!(kv.keys("snapshot_").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_status_reports_count_and_age() {
    let (_, _, snapshots) = setup().await;
    snapshots
        .write("servers", &[record("s1", "a"), record("s2", "b")])
        .await
        .unwrap();

    let status = snapshots.status(&["servers", "devices"]).await;

    let servers = &status["servers"];
    assert!(servers.cached);
    assert_eq!(servers.count, 2);
    assert_eq!(servers.age.as_deref(), Some("0h 0m ago"));

    let devices = &status["devices"];
    assert!(!devices.cached);
    assert_eq!(devices.count, 0);
}
