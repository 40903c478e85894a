//! Query engine behavior: caching, batch deletion, streaming traversal.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use docmirror_lib::api::BatchDeleteOptions;
use docmirror_lib::api::QueryEngine;
use docmirror_lib::api::QueryOptions;
use docmirror_lib::api::query::Filter;
use docmirror_lib::api::query::OrderBy;
use docmirror_lib::cache::CacheConfig;
use docmirror_lib::cache::InMemoryCache;
use docmirror_lib::model::DatasetRecord;
use docmirror_lib::rate_limit::RateLimiter;
use docmirror_lib::store::MemoryStore;

fn engine() -> (Arc<MemoryStore>, QueryEngine) {
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(InMemoryCache::new());
    let limiter = RateLimiter::new(10_000, Duration::from_secs(60));
    let engine = QueryEngine::new(store.clone(), cache, limiter);
    (store, engine)
}

fn seed(store: &MemoryStore, collection: &str, count: usize) {
    for i in 1..=count {
        store.insert(
            collection,
            DatasetRecord::new(format!("doc-{i:03}")).set("rank", i as i64),
        );
    }
}

#[tokio::test]
async fn test_get_documents_serves_repeat_queries_from_cache() {
    let (store, engine) = engine();
    seed(&store, "servers", 3);

    let first = engine
        .get_documents("servers", QueryOptions::new())
        .await
        .unwrap();
    assert!(first.is_fresh());
    assert_eq!(first.data().len(), 3);

    // A remote write invisible to the cached result.
    seed(&store, "servers", 4);

    let second = engine
        .get_documents("servers", QueryOptions::new())
        .await
        .unwrap();
    assert!(second.is_cached());
    assert_eq!(second.data().len(), 3);
}

#[tokio::test]
async fn test_invalidate_cache_by_collection_substring() {
    let (store, engine) = engine();
    seed(&store, "servers", 2);

    engine
        .get_documents("servers", QueryOptions::new())
        .await
        .unwrap();
    seed(&store, "servers", 3);

    assert_eq!(engine.invalidate_cache("servers").await, 1);

    let refreshed = engine
        .get_documents("servers", QueryOptions::new())
        .await
        .unwrap();
    assert!(refreshed.is_fresh());
    assert_eq!(refreshed.data().len(), 3);
}

#[tokio::test]
async fn test_zero_ttl_config_expires_immediately() {
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(InMemoryCache::new());
    let limiter = RateLimiter::new(10_000, Duration::from_secs(60));
    let engine = QueryEngine::new(store.clone(), cache, limiter)
        .with_config(CacheConfig::new().with_query_ttl(Duration::ZERO));
    seed(&store, "servers", 2);

    engine
        .get_documents("servers", QueryOptions::new())
        .await
        .unwrap();
    seed(&store, "servers", 3);

    // The cached entry expired at once, so the second query refetches.
    let second = engine
        .get_documents("servers", QueryOptions::new())
        .await
        .unwrap();
    assert!(second.is_fresh());
    assert_eq!(second.data().len(), 3);
}

#[tokio::test]
async fn test_no_cache_always_fetches() {
    let (store, engine) = engine();
    seed(&store, "servers", 2);

    engine
        .get_documents("servers", QueryOptions::new().no_cache())
        .await
        .unwrap();
    seed(&store, "servers", 3);

    let second = engine
        .get_documents("servers", QueryOptions::new().no_cache())
        .await
        .unwrap();
    assert!(second.cache.is_none());
    assert_eq!(second.data().len(), 3);
}

#[tokio::test]
async fn test_pagination_carries_a_continuation_cursor() {
    let (store, engine) = engine();
    seed(&store, "servers", 5);

    let options = QueryOptions::new().order_by(OrderBy::asc("rank")).limit(2);
    let first = engine
        .get_documents("servers", options.clone())
        .await
        .unwrap();
    let cursor = first.data().next_cursor().unwrap().to_string();

    let second = engine
        .get_documents("servers", options.after(cursor))
        .await
        .unwrap();

    let ids: Vec<&str> = second.data().records().iter().map(|r| r.id()).collect();
    assert_eq!(ids, ["doc-003", "doc-004"]);
}

#[tokio::test]
async fn test_batch_delete_respects_exact_cap() {
    let (store, engine) = engine();
    seed(&store, "logs", 25);

    let deleted = engine
        .batch_delete(
            "logs",
            Vec::new(),
            BatchDeleteOptions::new()
                .with_batch_size(4)
                .with_max_delete_count(10),
        )
        .await
        .unwrap();

    assert_eq!(deleted, 10);
    assert_eq!(store.len("logs"), 15);
}

#[tokio::test]
async fn test_batch_delete_stops_on_exhaustion() {
    let (store, engine) = engine();
    seed(&store, "logs", 5);

    let deleted = engine
        .batch_delete("logs", Vec::new(), BatchDeleteOptions::default())
        .await
        .unwrap();

    assert_eq!(deleted, 5);
    assert!(store.is_empty("logs"));
}

#[tokio::test]
async fn test_batch_delete_honors_filters() {
    let (store, engine) = engine();
    seed(&store, "logs", 10);

    let deleted = engine
        .batch_delete(
            "logs",
            vec![Filter::le("rank", 4)],
            BatchDeleteOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(deleted, 4);
    assert_eq!(store.len("logs"), 6);
}

#[tokio::test]
async fn test_delete_old_documents_uses_date_cutoff() {
    let (store, engine) = engine();
    store.insert(
        "logs",
        DatasetRecord::new("old-1").set("createdAt", "2020-01-01T00:00:00Z"),
    );
    store.insert(
        "logs",
        DatasetRecord::new("old-2").set("createdAt", "2021-06-01T12:00:00Z"),
    );
    store.insert(
        "logs",
        DatasetRecord::new("recent").set(
            "createdAt",
            Utc::now().to_rfc3339(),
        ),
    );

    let deleted = engine.delete_old_documents("logs", "createdAt", 3).await.unwrap();

    assert_eq!(deleted, 2);
    assert!(store.get("logs", "recent").is_some());
}

#[tokio::test]
async fn test_process_in_batches_streams_every_record() {
    let (store, engine) = engine();
    seed(&store, "logs", 10);

    let mut pages = Vec::new();
    let total = engine
        .process_in_batches(
            "logs",
            Vec::new(),
            |records| {
                pages.push(records.len());
                async { Ok(()) }
            },
            3,
        )
        .await
        .unwrap();

    assert_eq!(total, 10);
    assert_eq!(pages, [3, 3, 3, 1]);
}
