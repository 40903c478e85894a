//! Response snapshot storage for the gateway.

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use dashmap::DashMap;

/// A stored copy of an upstream response.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, in order.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Vec<u8>,
    /// When the copy was stored.
    pub stored_at: DateTime<Utc>,
}

impl CachedResponse {
    /// Creates a response snapshot stored now.
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
            stored_at: Utc::now(),
        }
    }
}

/// Normalizes a request into its cache key: method plus full URL.
pub fn request_key(method: &str, url: &str) -> String {
    format!("{method} {url}")
}

/// Storage abstraction for response snapshots, partitioned into named
/// namespaces so a whole deployment generation can be dropped at once.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Looks up a stored response by namespace and request key.
    async fn match_request(&self, namespace: &str, key: &str) -> Option<CachedResponse>;

    /// Stores a response, replacing any previous copy for the key.
    async fn put(&self, namespace: &str, key: &str, response: CachedResponse);

    /// Drops an entire namespace. Returns `true` if it existed.
    async fn delete_namespace(&self, namespace: &str) -> bool;

    /// Lists all namespaces that currently hold entries.
    async fn namespaces(&self) -> Vec<String>;

    /// Drops every namespace. Returns how many were dropped.
    async fn clear_all(&self) -> usize;
}

/// An in-memory [`ResponseCache`].
#[derive(Debug, Default)]
pub struct MemoryResponseCache {
    spaces: DashMap<String, DashMap<String, CachedResponse>>,
}

impl MemoryResponseCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            spaces: DashMap::new(),
        }
    }

    /// Returns the number of entries in a namespace.
    pub fn len(&self, namespace: &str) -> usize {
        self.spaces.get(namespace).map_or(0, |space| space.len())
    }

    /// Returns `true` if the namespace is empty or absent.
    pub fn is_empty(&self, namespace: &str) -> bool {
        self.len(namespace) == 0
    }
}

#[async_trait]
impl ResponseCache for MemoryResponseCache {
    async fn match_request(&self, namespace: &str, key: &str) -> Option<CachedResponse> {
        self.spaces
            .get(namespace)?
            .get(key)
            .map(|entry| entry.value().clone())
    }

    async fn put(&self, namespace: &str, key: &str, response: CachedResponse) {
        self.spaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), response);
    }

    async fn delete_namespace(&self, namespace: &str) -> bool {
        self.spaces.remove(namespace).is_some()
    }

    async fn namespaces(&self) -> Vec<String> {
        self.spaces.iter().map(|entry| entry.key().clone()).collect()
    }

    async fn clear_all(&self) -> usize {
        let count = self.spaces.len();
        self.spaces.clear();
        count
    }
}
