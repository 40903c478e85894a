//! SQLite-backed persistent key-value store.

use std::path::Path;

use async_sqlite::Client;
use async_sqlite::ClientBuilder;
use async_sqlite::JournalMode;
use async_sqlite::rusqlite;
use async_trait::async_trait;
use chrono::Utc;

use super::KeyValueStore;
use crate::error::StorageError;

/// A persistent key-value store backed by SQLite.
///
/// Data is stored in a SQLite database file and persists across process
/// restarts. Uses WAL journal mode for better concurrent read performance.
///
/// # Example
///
/// ```ignore
/// use docmirror_lib::cache::SqliteStore;
///
/// // File-based store
/// let store = SqliteStore::open("docmirror.db").await?;
///
/// // In-memory store (for testing)
/// let store = SqliteStore::open_in_memory().await?;
/// ```
pub struct SqliteStore {
    client: Client,
}

impl SqliteStore {
    /// Opens a store at the specified path.
    ///
    /// Creates the database file and table if they don't exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let client = ClientBuilder::new()
            .path(path)
            .journal_mode(JournalMode::Wal)
            .open()
            .await?;

        Self::init_schema(&client).await?;

        Ok(Self { client })
    }

    /// Opens an in-memory store.
    ///
    /// Useful for testing. Data is lost when the store is dropped.
    pub async fn open_in_memory() -> Result<Self, StorageError> {
        let client = ClientBuilder::new().path(":memory:").open().await?;

        Self::init_schema(&client).await?;

        Ok(Self { client })
    }

    /// Initializes the table schema.
    async fn init_schema(client: &Client) -> Result<(), StorageError> {
        client
            .conn(|conn| {
                conn.execute(
                    "CREATE TABLE IF NOT EXISTS kv (
                        key TEXT PRIMARY KEY,
                        data BLOB NOT NULL,
                        stored_at INTEGER NOT NULL
                    )",
                    [],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Returns the number of entries in the store.
    pub async fn len(&self) -> Result<usize, StorageError> {
        let count = self
            .client
            .conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM kv", [], |row| row.get::<_, i64>(0))
            })
            .await?;
        Ok(count as usize)
    }

    /// Returns `true` if the store is empty.
    pub async fn is_empty(&self) -> Result<bool, StorageError> {
        self.len().await.map(|len| len == 0)
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let key = key.to_string();

        let result = self
            .client
            .conn(move |conn| {
                conn.query_row("SELECT data FROM kv WHERE key = ?", [key], |row| {
                    row.get::<_, Vec<u8>>(0)
                })
                .map(Some)
                .or_else(|err| match err {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })
            })
            .await?;

        Ok(result)
    }

    async fn set(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        let key = key.to_string();
        let stored_at = Utc::now().timestamp();

        self.client
            .conn(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO kv (key, data, stored_at) VALUES (?, ?, ?)",
                    rusqlite::params![key, data, stored_at],
                )
            })
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let key = key.to_string();

        self.client
            .conn(move |conn| conn.execute("DELETE FROM kv WHERE key = ?", [key]))
            .await?;
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        // LIKE special characters in the prefix would widen the match, so
        // filter on a range instead: prefix <= key < prefix + u{10FFFF}.
        let start = prefix.to_string();
        let end = format!("{prefix}\u{10FFFF}");

        let keys = self
            .client
            .conn(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT key FROM kv WHERE key >= ? AND key < ? ORDER BY key")?;
                let rows = stmt.query_map([start, end], |row| row.get::<_, String>(0))?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .await?;

        Ok(keys)
    }
}
