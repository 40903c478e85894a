//! The remote document store seam.

mod memory;

pub use memory::*;

use async_trait::async_trait;

use crate::api::query::Query;
use crate::api::query::QueryPage;
use crate::error::Error;
use crate::model::DatasetRecord;

/// The narrow interface this library needs from a remote document store:
/// collection-scoped queries with filters, ordering, limit, and cursor
/// pagination, plus batched atomic deletes.
///
/// [`HttpStore`](crate::HttpStore) talks to a real backend;
/// [`MemoryStore`] evaluates queries locally for tests and offline use.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Runs a query against one collection, returning a single page.
    async fn query(&self, collection: &str, query: &Query) -> Result<QueryPage, Error>;

    /// Deletes the given documents as one atomic batch.
    async fn delete_batch(&self, collection: &str, ids: &[String]) -> Result<(), Error>;

    /// Fetches an entire collection, following continuation cursors.
    async fn fetch_all(&self, collection: &str) -> Result<Vec<DatasetRecord>, Error> {
        let mut records = Vec::new();
        let mut query = Query::new();

        loop {
            let page = self.query(collection, &query).await?;
            let next = page.next_cursor().map(str::to_string);
            records.extend(page.into_records());

            match next {
                Some(cursor) => query.cursor = Some(cursor),
                None => break,
            }
        }

        Ok(records)
    }
}
