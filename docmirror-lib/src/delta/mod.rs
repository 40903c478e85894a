//! Incremental synchronization of remote collections into snapshots.
//!
//! A [`DeltaSync`] runs one poll listener per dataset. Each tick fetches
//! only the records changed since the last successful check, merges them
//! into the [`SnapshotCache`], and publishes a [`DeltaEvent`] for
//! subscribers. Collections that cannot serve incremental queries fall back
//! to a full refresh.

mod listener;
mod merge;

pub use merge::WATCHED_FIELDS;
pub use merge::record_changed;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cache::SnapshotCache;
use crate::connectivity::Connectivity;
use crate::model::DatasetRecord;
use crate::store::DocumentStore;

use listener::CheckMode;

/// Options for one dataset listener.
#[derive(Debug, Clone)]
pub struct DeltaOptions {
    /// Remote collection name. Defaults to the dataset name.
    pub collection: Option<String>,
    /// Maximum records fetched per check. Default: 10.
    pub batch_size: usize,
    /// Poll period. Default: 5 minutes.
    pub poll_interval: Duration,
}

impl Default for DeltaOptions {
    fn default() -> Self {
        Self {
            collection: None,
            batch_size: 10,
            poll_interval: Duration::from_secs(300),
        }
    }
}

impl DeltaOptions {
    /// Creates options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the remote collection name.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Sets the per-check batch size.
    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    /// Sets the poll period.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// A change notification published after a merge that altered the snapshot.
#[derive(Debug, Clone)]
pub struct DeltaEvent {
    /// The dataset that changed.
    pub dataset: String,
    /// The records that were added or replaced.
    pub changed: Vec<DatasetRecord>,
    /// When the merge completed.
    pub timestamp: DateTime<Utc>,
}

/// Diagnostics for one listener.
#[derive(Debug, Clone)]
pub struct ListenerStatus {
    /// The remote collection being polled.
    pub collection: String,
    /// Records fetched per check.
    pub batch_size: usize,
    /// Poll period.
    pub poll_interval: Duration,
    /// When the last check ran, if any.
    pub last_check: Option<DateTime<Utc>>,
    /// The change-timestamp checkpoint.
    pub last_seen: DateTime<Utc>,
}

/// Diagnostics for the whole synchronizer.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    /// Current connectivity.
    pub online: bool,
    /// Per-dataset listener status.
    pub listeners: HashMap<String, ListenerStatus>,
}

pub(crate) struct ListenerState {
    pub(crate) dataset: String,
    pub(crate) collection: String,
    pub(crate) batch_size: usize,
    pub(crate) poll_interval: Duration,
    pub(crate) last_seen: Mutex<DateTime<Utc>>,
    pub(crate) last_check: Mutex<Option<DateTime<Utc>>>,
    /// Serializes checks per dataset; timer ticks skip when held.
    pub(crate) in_flight: Mutex<()>,
}

struct Listener {
    state: Arc<ListenerState>,
    cancel: CancellationToken,
}

pub(crate) struct DeltaSyncInner {
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) snapshots: Arc<SnapshotCache>,
    pub(crate) connectivity: Connectivity,
    pub(crate) events: broadcast::Sender<DeltaEvent>,
    listeners: DashMap<String, Listener>,
    shutdown: CancellationToken,
}

/// The delta synchronizer.
///
/// Cheap to clone; clones share the same listener registry and event
/// channel. Must be created inside a tokio runtime (it spawns a
/// connectivity watcher).
///
/// # Example
///
/// ```ignore
/// let sync = DeltaSync::new(store, snapshots, connectivity);
/// let mut events = sync.subscribe();
///
/// sync.start("servers", DeltaOptions::new().with_batch_size(25));
///
/// while let Ok(event) = events.recv().await {
///     println!("{} changed: {} records", event.dataset, event.changed.len());
/// }
/// ```
#[derive(Clone)]
pub struct DeltaSync {
    inner: Arc<DeltaSyncInner>,
}

impl DeltaSync {
    /// Creates a synchronizer over the given store and snapshot cache.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        snapshots: Arc<SnapshotCache>,
        connectivity: Connectivity,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        let inner = Arc::new(DeltaSyncInner {
            store,
            snapshots,
            connectivity,
            events,
            listeners: DashMap::new(),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(watch_connectivity(inner.clone()));

        Self { inner }
    }

    /// Starts delta updates for a dataset.
    ///
    /// A listener already registered under the name is stopped first
    /// (restart, not stacking). Starting while offline is a no-op and
    /// returns `false`.
    ///
    /// The checkpoint is seeded one hour in the past so writes made just
    /// before the listener existed are still picked up; the watched-field
    /// merge bounds the cost of that re-delivery.
    pub fn start(&self, dataset: &str, options: DeltaOptions) -> bool {
        if !self.inner.connectivity.is_online() {
            info!(dataset, "offline, not starting delta updates");
            return false;
        }

        self.stop(dataset);

        let collection = options
            .collection
            .unwrap_or_else(|| dataset.to_string());
        info!(dataset, collection, "starting delta updates");

        let state = Arc::new(ListenerState {
            dataset: dataset.to_string(),
            collection,
            batch_size: options.batch_size,
            poll_interval: options.poll_interval,
            last_seen: Mutex::new(Utc::now() - chrono::Duration::hours(1)),
            last_check: Mutex::new(None),
            in_flight: Mutex::new(()),
        });

        let cancel = self.inner.shutdown.child_token();
        tokio::spawn(listener::run(
            self.inner.clone(),
            state.clone(),
            cancel.clone(),
        ));

        self.inner
            .listeners
            .insert(dataset.to_string(), Listener { state, cancel });
        true
    }

    /// Stops the listener for a dataset, if one is registered.
    ///
    /// Cancellation is not preemptive: a check already in flight completes
    /// and still performs its merge.
    pub fn stop(&self, dataset: &str) -> bool {
        match self.inner.listeners.remove(dataset) {
            Some((_, listener)) => {
                listener.cancel.cancel();
                info!(dataset, "stopped delta updates");
                true
            }
            None => false,
        }
    }

    /// Stops every registered listener.
    pub fn stop_all(&self) {
        let datasets: Vec<String> = self
            .inner
            .listeners
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for dataset in datasets {
            self.stop(&dataset);
        }
        info!("stopped all delta updates");
    }

    /// Stops all listeners and the connectivity watcher.
    pub fn shutdown(&self) {
        self.stop_all();
        self.inner.shutdown.cancel();
    }

    /// Runs one check immediately, outside the regular schedule.
    ///
    /// Waits for any in-flight check first, then checks, so the snapshot
    /// reflects the result when this returns. No-op (returning `false`)
    /// for a dataset without an active listener.
    pub async fn force_check(&self, dataset: &str) -> bool {
        let state = match self.inner.listeners.get(dataset) {
            Some(listener) => listener.state.clone(),
            None => return false,
        };
        info!(dataset, "force checking for updates");
        listener::check_for_updates(&self.inner, &state, CheckMode::Wait).await;
        true
    }

    /// Returns `true` if the dataset has an active listener.
    pub fn is_active(&self, dataset: &str) -> bool {
        self.inner.listeners.contains_key(dataset)
    }

    /// Subscribes to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<DeltaEvent> {
        self.inner.events.subscribe()
    }

    /// Returns synchronizer diagnostics.
    pub async fn status(&self) -> SyncStatus {
        let states: Vec<Arc<ListenerState>> = self
            .inner
            .listeners
            .iter()
            .map(|entry| entry.state.clone())
            .collect();

        let mut listeners = HashMap::new();
        for state in states {
            let last_seen = *state.last_seen.lock().await;
            let last_check = *state.last_check.lock().await;
            listeners.insert(
                state.dataset.clone(),
                ListenerStatus {
                    collection: state.collection.clone(),
                    batch_size: state.batch_size,
                    poll_interval: state.poll_interval,
                    last_check,
                    last_seen,
                },
            );
        }

        SyncStatus {
            online: self.inner.connectivity.is_online(),
            listeners,
        }
    }
}

/// Watches connectivity; the offline→online edge triggers an immediate
/// check for every registered dataset, independent of each one's timer.
async fn watch_connectivity(inner: Arc<DeltaSyncInner>) {
    let mut rx = inner.connectivity.watch();
    let mut was_online = *rx.borrow();

    loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let online = *rx.borrow_and_update();
                if online && !was_online {
                    info!("back online, checking all registered datasets");
                    let states: Vec<Arc<ListenerState>> = inner
                        .listeners
                        .iter()
                        .map(|entry| entry.state.clone())
                        .collect();
                    for state in states {
                        let inner = inner.clone();
                        tokio::spawn(async move {
                            listener::check_for_updates(&inner, &state, CheckMode::Wait).await;
                        });
                    }
                } else if !online {
                    info!("offline, serving cached data only");
                }
                was_online = online;
            }
        }
    }
}
