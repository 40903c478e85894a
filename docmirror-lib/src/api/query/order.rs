//! Ordering types for document queries.

use serde::Serialize;

/// Sort direction for ordering results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    /// Ascending order (A-Z, 0-9, oldest first).
    Ascending,
    /// Descending order (Z-A, 9-0, newest first).
    Descending,
}

impl Direction {
    /// Returns the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Ascending => "asc",
            Direction::Descending => "desc",
        }
    }
}

/// An ordering clause for a query.
///
/// # Example
///
/// ```
/// use docmirror_lib::api::query::OrderBy;
///
/// let newest_first = OrderBy::desc("updatedAt");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderBy {
    /// The field to order by.
    pub field: String,
    /// The sort direction.
    pub direction: Direction,
}

impl OrderBy {
    /// Creates an ascending order clause.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Ascending,
        }
    }

    /// Creates a descending order clause.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Descending,
        }
    }
}
