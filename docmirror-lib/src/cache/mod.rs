//! Caching layer
//!
//! Two cooperating stores: an ephemeral TTL cache (`CacheProvider`,
//! implemented by [`InMemoryCache`]) used by the query engine, and a plain
//! persistent key-value store (`KeyValueStore`, implemented by
//! [`SqliteStore`]) underneath the calendar-day [`SnapshotCache`].

mod config;
mod memory;
mod snapshot;
mod sqlite;
mod sweep;

pub use config::*;
pub use memory::*;
pub use snapshot::*;
pub use sqlite::*;
pub use sweep::*;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;

use crate::error::StorageError;

/// A cached value with metadata about when it was cached and when it expires.
#[derive(Debug, Clone)]
pub struct CachedValue {
    /// The cached data, serialized as bytes (via serde_json).
    pub data: Vec<u8>,
    /// When this value was cached.
    pub created_at: DateTime<Utc>,
    /// When this value expires and should no longer be returned.
    pub expires_at: DateTime<Utc>,
}

impl CachedValue {
    /// Creates a new cached value.
    pub fn new(data: Vec<u8>, created_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            data,
            created_at,
            expires_at,
        }
    }

    /// Creates a new cached value with a TTL from now.
    pub fn with_ttl(data: Vec<u8>, ttl: std::time::Duration) -> Self {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
        Self {
            data,
            created_at: now,
            expires_at,
        }
    }

    /// Returns `true` if this cached value has expired.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Trait for TTL cache providers.
///
/// Implementations store and retrieve cached values by string keys. The
/// provider is responsible for:
/// - Never returning expired values from `get()`
/// - Storing values with their expiration metadata
/// - Providing garbage collection for expired entries
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Retrieves a cached value by key.
    ///
    /// Returns `None` if the key doesn't exist or the value has expired.
    /// An expired entry is evicted as a side effect of the lookup.
    async fn get(&self, key: &str) -> Option<CachedValue>;

    /// Stores a value in the cache.
    async fn set(&self, key: &str, value: CachedValue);

    /// Removes a value from the cache.
    async fn remove(&self, key: &str);

    /// Clears all values from the cache.
    async fn clear(&self);

    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    async fn gc(&self) -> usize;
}

/// Trait for persistent string-keyed storage.
///
/// The snapshot cache sits on top of this: plain bytes in, plain bytes out,
/// with prefix enumeration for cleanup sweeps. No expiry semantics live at
/// this level.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Retrieves the bytes stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Stores `data` under `key`, replacing any previous value.
    async fn set(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError>;

    /// Removes the entry under `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Returns all keys starting with `prefix`.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}
