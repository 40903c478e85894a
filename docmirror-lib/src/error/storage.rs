//! Local storage error types

/// Errors from the persistent local key-value store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Underlying SQLite error.
    #[error("Storage error: {0}")]
    Sqlite(#[from] async_sqlite::Error),

    /// A persisted entry could not be decoded.
    ///
    /// Read paths treat this as a cache miss and discard the entry rather
    /// than propagating it.
    #[error("Corrupt entry at '{key}': {message}")]
    Corrupt {
        /// The key holding the malformed entry.
        key: String,
        /// What failed to decode.
        message: String,
    },
}

impl StorageError {
    /// Creates a corrupt-entry error.
    pub fn corrupt(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.into(),
            message: message.into(),
        }
    }
}
