//! Cached reads, paced batch deletion, and streaming traversal.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Months;
use chrono::SecondsFormat;
use chrono::Utc;
use sha2::Digest;
use sha2::Sha256;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::api::query::Filter;
use crate::api::query::OrderBy;
use crate::api::query::Query;
use crate::api::query::QueryPage;
use crate::cache::CacheConfig;
use crate::cache::CacheProvider;
use crate::cache::CachedValue;
use crate::cache::InMemoryCache;
use crate::error::Error;
use crate::model::DatasetRecord;
use crate::rate_limit::RateLimiter;
use crate::response::Response;
use crate::store::DocumentStore;

/// Pause between consecutive delete batches, so bulk deletion does not
/// saturate the store's write capacity.
const BATCH_DELETE_PAUSE: Duration = Duration::from_millis(100);

/// Options for a cached document query.
///
/// # Example
///
/// ```
/// use docmirror_lib::api::QueryOptions;
/// use docmirror_lib::api::query::{Filter, OrderBy};
///
/// let options = QueryOptions::new()
///     .filter(Filter::eq("status", "active"))
///     .order_by(OrderBy::desc("updatedAt"))
///     .limit(20);
/// ```
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Filter conditions; all must hold.
    pub filters: Vec<Filter>,
    /// Result ordering.
    pub order_by: Option<OrderBy>,
    /// Page size. Default: 50.
    pub limit: usize,
    /// Continuation cursor from a previous page.
    pub cursor: Option<String>,
    /// Whether to consult and fill the ephemeral cache. Default: true.
    pub use_cache: bool,
    /// Cache key override. Defaults to a key derived from the collection
    /// name and the serialized query.
    pub cache_key: Option<String>,
    /// TTL override for the cached result. Defaults to the engine's TTL.
    pub cache_max_age: Option<Duration>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            order_by: None,
            limit: 50,
            cursor: None,
            use_cache: true,
            cache_key: None,
            cache_max_age: None,
        }
    }
}

impl QueryOptions {
    /// Creates options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a filter condition.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Sets the result ordering.
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }

    /// Sets the page size.
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = n;
        self
    }

    /// Continues after the given cursor.
    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Bypasses the ephemeral cache for this query.
    pub fn no_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    /// Overrides the cache key.
    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Overrides the cached result TTL.
    pub fn cache_max_age(mut self, ttl: Duration) -> Self {
        self.cache_max_age = Some(ttl);
        self
    }

    fn to_query(&self) -> Query {
        Query {
            filters: self.filters.clone(),
            order_by: self.order_by.clone(),
            limit: Some(self.limit),
            cursor: self.cursor.clone(),
        }
    }
}

/// Options for [`QueryEngine::batch_delete`].
#[derive(Debug, Clone)]
pub struct BatchDeleteOptions {
    /// Documents deleted per batch. Default: 500.
    pub batch_size: usize,
    /// Upper bound on total deletions. Default: 5000.
    pub max_delete_count: usize,
}

impl Default for BatchDeleteOptions {
    fn default() -> Self {
        Self {
            batch_size: 500,
            max_delete_count: 5000,
        }
    }
}

impl BatchDeleteOptions {
    /// Creates options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-batch size.
    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    /// Sets the total deletion cap.
    pub fn with_max_delete_count(mut self, n: usize) -> Self {
        self.max_delete_count = n;
        self
    }
}

/// Read and bulk-write front end over a [`DocumentStore`].
///
/// Reads can be served from the ephemeral TTL cache; every remote call first
/// acquires the shared rate limiter.
pub struct QueryEngine {
    store: Arc<dyn DocumentStore>,
    cache: Arc<InMemoryCache>,
    limiter: RateLimiter,
    config: CacheConfig,
}

impl QueryEngine {
    /// Creates an engine over the given store, cache, and limiter, with the
    /// default [`CacheConfig`].
    pub fn new(store: Arc<dyn DocumentStore>, cache: Arc<InMemoryCache>, limiter: RateLimiter) -> Self {
        Self {
            store,
            cache,
            limiter,
            config: CacheConfig::default(),
        }
    }

    /// Sets the cache configuration.
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs a filtered, ordered, paginated query, serving from the ephemeral
    /// cache when permitted.
    ///
    /// The returned page carries an opaque continuation cursor for
    /// subsequent pagination.
    pub async fn get_documents(
        &self,
        collection: &str,
        options: QueryOptions,
    ) -> Result<Response<QueryPage>, Error> {
        let query = options.to_query();
        let key = options
            .cache_key
            .clone()
            .unwrap_or_else(|| derive_cache_key(collection, &query));

        if options.use_cache {
            if let Some(cached) = self.cache.get(&key).await {
                match serde_json::from_slice::<QueryPage>(&cached.data) {
                    Ok(page) => {
                        debug!(key, "query cache hit");
                        return Ok(Response::cache_hit(page, cached.created_at));
                    }
                    Err(err) => {
                        warn!(key, %err, "discarding corrupt cached query result");
                        self.cache.remove(&key).await;
                    }
                }
            }
        }

        self.limiter.acquire().await;
        let page = self.store.query(collection, &query).await?;

        if options.use_cache {
            let ttl = options.cache_max_age.unwrap_or(self.config.query_ttl);
            if let Ok(bytes) = serde_json::to_vec(&page) {
                self.cache.set(&key, CachedValue::with_ttl(bytes, ttl)).await;
            }
            return Ok(Response::cache_miss(page, Utc::now()));
        }

        Ok(Response::new(page))
    }

    /// Deletes every document matching `filters`, in paced batches.
    ///
    /// Stops when no more documents match, when a batch comes back short
    /// (exhaustion), or when exactly `max_delete_count` documents have been
    /// deleted. Returns the total deleted. A failing batch aborts the
    /// operation with [`Error::Batch`]; earlier deletions stay committed.
    pub async fn batch_delete(
        &self,
        collection: &str,
        filters: Vec<Filter>,
        options: BatchDeleteOptions,
    ) -> Result<usize, Error> {
        let mut total = 0;

        loop {
            let remaining = options.max_delete_count - total;
            if remaining == 0 {
                break;
            }
            let request_limit = options.batch_size.min(remaining);

            let query = Query::new()
                .filters(filters.iter().cloned())
                .limit(request_limit);

            self.limiter.acquire().await;
            let page = self
                .store
                .query(collection, &query)
                .await
                .map_err(|err| batch_error(total, err))?;

            if page.is_empty() {
                break;
            }

            let ids: Vec<String> = page.records().iter().map(|r| r.id().to_string()).collect();

            self.limiter.acquire().await;
            self.store
                .delete_batch(collection, &ids)
                .await
                .map_err(|err| batch_error(total, err))?;

            total += ids.len();
            debug!(collection, count = ids.len(), total, "batch deleted documents");

            if ids.len() < request_limit {
                break;
            }
            if total < options.max_delete_count {
                tokio::time::sleep(BATCH_DELETE_PAUSE).await;
            }
        }

        info!(collection, total, "batch delete finished");
        Ok(total)
    }

    /// Deletes documents whose `date_field` is older than `months_old`
    /// months.
    pub async fn delete_old_documents(
        &self,
        collection: &str,
        date_field: &str,
        months_old: u32,
    ) -> Result<usize, Error> {
        let cutoff = Utc::now() - Months::new(months_old);
        self.batch_delete(
            collection,
            vec![Filter::lt(
                date_field,
                cutoff.to_rfc3339_opts(SecondsFormat::Millis, true),
            )],
            BatchDeleteOptions::default(),
        )
        .await
    }

    /// Streams every matching document through `process`, one page at a
    /// time, without touching the cache (streaming reads are one-shot).
    ///
    /// Returns the total number of records processed.
    pub async fn process_in_batches<F, Fut>(
        &self,
        collection: &str,
        filters: Vec<Filter>,
        mut process: F,
        batch_size: usize,
    ) -> Result<usize, Error>
    where
        F: FnMut(Vec<DatasetRecord>) -> Fut,
        Fut: Future<Output = Result<(), Error>>,
    {
        let mut total = 0;
        let mut cursor: Option<String> = None;

        loop {
            let mut query = Query::new()
                .filters(filters.iter().cloned())
                .limit(batch_size);
            if let Some(ref c) = cursor {
                query = query.after(c.clone());
            }

            self.limiter.acquire().await;
            let page = self.store.query(collection, &query).await?;
            if page.is_empty() {
                break;
            }

            let count = page.len();
            cursor = page.next_cursor().map(str::to_string);
            process(page.into_records()).await?;
            total += count;

            if count < batch_size || cursor.is_none() {
                break;
            }
        }

        Ok(total)
    }

    /// Removes every cached query result whose key contains `pattern`.
    ///
    /// Derived keys embed the collection name, so passing a collection name
    /// invalidates all of its cached queries. Returns the number removed.
    pub async fn invalidate_cache(&self, pattern: &str) -> usize {
        let removed = self.cache.remove_matching(pattern);
        debug!(pattern, removed, "invalidated cached queries");
        removed
    }
}

fn batch_error(deleted: usize, source: Error) -> Error {
    Error::Batch {
        deleted,
        source: Box::new(source),
    }
}

/// Derives a deterministic cache key from the collection and query shape.
fn derive_cache_key(collection: &str, query: &Query) -> String {
    let serialized = serde_json::to_string(query).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("query_{}:{}", collection, &digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_keys_are_deterministic_and_distinct() {
        let a = Query::new().filter(Filter::eq("status", "active")).limit(10);
        let b = Query::new().filter(Filter::eq("status", "idle")).limit(10);

        assert_eq!(
            derive_cache_key("servers", &a),
            derive_cache_key("servers", &a)
        );
        assert_ne!(
            derive_cache_key("servers", &a),
            derive_cache_key("servers", &b)
        );
        assert_ne!(
            derive_cache_key("servers", &a),
            derive_cache_key("devices", &a)
        );
    }

    #[test]
    fn test_derived_key_embeds_collection() {
        let key = derive_cache_key("servers", &Query::new());
        assert!(key.contains("servers"));
    }
}
