//! Query types for the remote document store.

mod filter;
mod order;
mod page;
pub(crate) mod url;

pub use filter::*;
pub use order::*;
pub use page::*;

pub(crate) use filter::compare_values;

use serde::Serialize;

/// A filtered, ordered, paginated query over one collection.
///
/// # Example
///
/// ```
/// use docmirror_lib::api::query::{Filter, OrderBy, Query};
///
/// let query = Query::new()
///     .filter(Filter::eq("status", "active"))
///     .order_by(OrderBy::desc("updatedAt"))
///     .limit(20);
/// ```
#[derive(Debug, Clone, Default, Serialize)]
pub struct Query {
    /// Filter conditions; all must hold.
    pub filters: Vec<Filter>,
    /// Result ordering.
    pub order_by: Option<OrderBy>,
    /// Maximum number of records to return.
    pub limit: Option<usize>,
    /// Opaque continuation cursor from a previous page.
    pub cursor: Option<String>,
}

impl Query {
    /// Creates an empty query (full collection scan).
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a filter condition.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Adds several filter conditions.
    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    /// Sets the result ordering.
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }

    /// Limits the number of records returned.
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Continues after the given cursor.
    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }
}
