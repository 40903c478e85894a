//! Query result pages and continuation cursors.

use serde::Deserialize;
use serde::Serialize;

use crate::model::DatasetRecord;

/// One page of query results.
///
/// `next_cursor` is an opaque continuation token: pass it back via
/// [`Query::after`](super::Query::after) to fetch the following page. A page
/// without a cursor is the last one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPage {
    records: Vec<DatasetRecord>,
    next_cursor: Option<String>,
}

impl QueryPage {
    /// Creates a final page (no continuation).
    pub fn new(records: Vec<DatasetRecord>) -> Self {
        Self {
            records,
            next_cursor: None,
        }
    }

    /// Attaches a continuation cursor.
    pub fn with_next_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.next_cursor = Some(cursor.into());
        self
    }

    /// Returns the records in this page.
    pub fn records(&self) -> &[DatasetRecord] {
        &self.records
    }

    /// Returns the continuation cursor, if there are more pages.
    pub fn next_cursor(&self) -> Option<&str> {
        self.next_cursor.as_deref()
    }

    /// Returns the number of records in this page.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if this page has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Consumes the page and returns its records.
    pub fn into_records(self) -> Vec<DatasetRecord> {
        self.records
    }
}
