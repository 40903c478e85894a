//! Error types

mod api;
mod storage;

pub use api::*;
pub use storage::*;

/// Top-level error type for the library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error from the remote document store.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Error from the persistent local store.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The collection does not support incremental change queries on the
    /// given field (missing index or missing field).
    #[error("collection '{collection}' does not support incremental queries on '{field}'")]
    MissingCapability {
        /// The remote collection name.
        collection: String,
        /// The change-timestamp field that is unsupported.
        field: String,
    },

    /// A batch operation failed partway through.
    ///
    /// Deletions committed before the failure are not rolled back; `deleted`
    /// reports how many were.
    #[error("batch operation aborted after {deleted} deletions: {source}")]
    Batch {
        /// Documents deleted before the failure.
        deleted: usize,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Returns `true` if the remote store signalled that incremental change
    /// queries are unsupported on the target collection.
    ///
    /// The HTTP store surfaces this as a typed variant; other stores may
    /// report it via an error code on the HTTP response.
    pub fn is_missing_capability(&self) -> bool {
        match self {
            Self::MissingCapability { .. } => true,
            Self::Api(api) => matches!(
                api.error_code(),
                Some("failed-precondition") | Some("invalid-argument")
            ),
            _ => false,
        }
    }

    /// Returns `true` if retrying the operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api(api) => api.is_retryable(),
            _ => false,
        }
    }
}
