//! Calendar-day dataset snapshots.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Local;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::KeyValueStore;
use crate::error::Error;
use crate::error::StorageError;
use crate::model::DatasetRecord;
use crate::response::Response;
use crate::store::DocumentStore;

/// A full materialized copy of a dataset, one entry per calendar day.
///
/// Keys embed the local calendar date (`snapshot_servers_2025-03-01`), which
/// is the single freshness rule: a snapshot is live exactly while its key is
/// today's key, rolling over at local midnight. Entries under other days are
/// never read, only reaped by [`cleanup_stale`](Self::cleanup_stale).
///
/// Entries persist across restarts via the [`KeyValueStore`] backend.
pub struct SnapshotCache {
    kv: Arc<dyn KeyValueStore>,
    store: Arc<dyn DocumentStore>,
    prefix: String,
}

/// The persisted form of one snapshot.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry {
    records: Vec<DatasetRecord>,
    stored_at: DateTime<Utc>,
}

/// Diagnostics for one dataset's snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotStatus {
    /// Whether a live (today's) snapshot exists.
    pub cached: bool,
    /// Number of records in the snapshot.
    pub count: usize,
    /// When the snapshot was written.
    pub stored_at: Option<DateTime<Utc>>,
    /// Human-readable age, e.g. `"3h 12m ago"`.
    pub age: Option<String>,
}

impl SnapshotCache {
    /// Creates a snapshot cache over the given persistent store and remote
    /// document store, with the default key prefix.
    pub fn new(kv: Arc<dyn KeyValueStore>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            kv,
            store,
            prefix: "snapshot_".to_string(),
        }
    }

    /// Overrides the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Returns today's key for a dataset.
    pub fn key_for(&self, dataset: &str) -> String {
        format!("{}{}_{}", self.prefix, dataset, today())
    }

    /// Returns the cached records for a dataset, if a live snapshot exists.
    ///
    /// A malformed persisted entry is discarded and treated as a miss.
    pub async fn read(&self, dataset: &str) -> Option<Vec<DatasetRecord>> {
        self.read_entry(dataset).await.map(|entry| entry.records)
    }

    async fn read_entry(&self, dataset: &str) -> Option<SnapshotEntry> {
        let key = self.key_for(dataset);

        let bytes = match self.kv.get(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                warn!(key, %err, "snapshot read failed");
                return None;
            }
        };

        match serde_json::from_slice::<SnapshotEntry>(&bytes) {
            Ok(entry) => {
                debug!(dataset, count = entry.records.len(), "using cached snapshot");
                Some(entry)
            }
            Err(err) => {
                warn!(key, %err, "discarding corrupt snapshot entry");
                let _ = self.kv.remove(&key).await;
                None
            }
        }
    }

    /// Overwrites today's snapshot for a dataset.
    pub async fn write(&self, dataset: &str, records: &[DatasetRecord]) -> Result<(), Error> {
        let key = self.key_for(dataset);
        let entry = SnapshotEntry {
            records: records.to_vec(),
            stored_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&entry)
            .map_err(|err| StorageError::corrupt(&key, err.to_string()))?;

        self.kv.set(&key, bytes).await?;
        debug!(dataset, count = records.len(), "cached snapshot");
        Ok(())
    }

    /// Cache-first read-through load of a dataset.
    ///
    /// Returns the live snapshot if one exists; otherwise fetches the full
    /// remote collection, persists it, and returns it. A fetch failure is
    /// logged and resolves to an empty sequence; it is never propagated, so
    /// callers cannot tell an empty dataset from a failed fetch here.
    pub async fn load(&self, dataset: &str, collection: &str) -> Response<Vec<DatasetRecord>> {
        if let Some(entry) = self.read_entry(dataset).await {
            return Response::cache_hit(entry.records, entry.stored_at);
        }

        debug!(dataset, collection, "fetching full collection");
        match self.store.fetch_all(collection).await {
            Ok(records) => {
                if let Err(err) = self.write(dataset, &records).await {
                    warn!(dataset, %err, "failed to persist snapshot");
                }
                Response::cache_miss(records, Utc::now())
            }
            Err(err) => {
                warn!(dataset, %err, "fetch failed, resolving to empty dataset");
                Response::new(Vec::new())
            }
        }
    }

    /// Deletes any existing snapshot for the dataset, then loads fresh.
    pub async fn force_refresh(
        &self,
        dataset: &str,
        collection: &str,
    ) -> Response<Vec<DatasetRecord>> {
        info!(dataset, "force refreshing snapshot");
        let key = self.key_for(dataset);
        if let Err(err) = self.kv.remove(&key).await {
            warn!(key, %err, "failed to drop snapshot before refresh");
        }
        self.load(dataset, collection).await
    }

    /// Deletes every snapshot whose embedded date is not today's.
    ///
    /// Intended to run once at process start. Returns the number removed.
    pub async fn cleanup_stale(&self) -> usize {
        let suffix = format!("_{}", today());
        let keys = match self.kv.keys(&self.prefix).await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(%err, "snapshot cleanup failed to enumerate keys");
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys {
            if !key.ends_with(&suffix) {
                match self.kv.remove(&key).await {
                    Ok(()) => {
                        debug!(key, "removed stale snapshot");
                        removed += 1;
                    }
                    Err(err) => warn!(key, %err, "failed to remove stale snapshot"),
                }
            }
        }

        info!(removed, "cleaned up stale snapshots");
        removed
    }

    /// Deletes every snapshot entry regardless of date. Returns the count.
    pub async fn clear_all(&self) -> usize {
        let keys = match self.kv.keys(&self.prefix).await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(%err, "snapshot clear failed to enumerate keys");
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys {
            if self.kv.remove(&key).await.is_ok() {
                removed += 1;
            }
        }

        info!(removed, "cleared all snapshots");
        removed
    }

    /// Returns per-dataset snapshot diagnostics.
    pub async fn status(&self, datasets: &[&str]) -> HashMap<String, SnapshotStatus> {
        let mut out = HashMap::new();
        for dataset in datasets {
            let status = match self.read_entry(dataset).await {
                Some(entry) => SnapshotStatus {
                    cached: true,
                    count: entry.records.len(),
                    age: Some(humanize_age(entry.stored_at)),
                    stored_at: Some(entry.stored_at),
                },
                None => SnapshotStatus {
                    cached: false,
                    count: 0,
                    stored_at: None,
                    age: None,
                },
            };
            out.insert((*dataset).to_string(), status);
        }
        out
    }

    /// Returns a human-readable age for the dataset's live snapshot.
    pub async fn age(&self, dataset: &str) -> Option<String> {
        self.read_entry(dataset)
            .await
            .map(|entry| humanize_age(entry.stored_at))
    }
}

/// Today's date in local time, as embedded in snapshot keys.
fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

fn humanize_age(stored_at: DateTime<Utc>) -> String {
    let age = Utc::now().signed_duration_since(stored_at);
    let hours = age.num_hours();
    let minutes = age.num_minutes() - hours * 60;
    format!("{hours}h {minutes}m ago")
}
