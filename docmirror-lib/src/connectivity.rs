//! Shared online/offline state.

use std::sync::Arc;

use tokio::sync::watch;

/// A process-wide connectivity flag.
///
/// The application flips this as its transport comes and goes; the delta
/// synchronizer short-circuits checks while offline and sweeps all datasets
/// on the offline→online edge. Cheap to clone; clones share the same flag.
///
/// # Example
///
/// ```
/// use docmirror_lib::connectivity::Connectivity;
///
/// let connectivity = Connectivity::online();
/// connectivity.set_online(false);
/// assert!(!connectivity.is_online());
/// ```
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    /// Creates a flag with the given initial state.
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    /// Creates a flag that starts online.
    pub fn online() -> Self {
        Self::new(true)
    }

    /// Returns the current state.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Updates the state, notifying watchers on change.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
    }

    /// Returns a receiver that observes state transitions.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::online()
    }
}
