//! Filter conditions for document queries.

use std::cmp::Ordering;

use chrono::DateTime;
use serde::Serialize;
use serde_json::Value;

use crate::model::DatasetRecord;

/// A filter condition for querying records.
///
/// A query carries a flat sequence of filters, all of which must hold
/// (implicit AND). Values are plain JSON values; timestamps travel as
/// RFC 3339 strings and compare chronologically.
///
/// # Example
///
/// ```
/// use docmirror_lib::api::query::Filter;
///
/// let active = Filter::eq("isActive", true);
/// let recent = Filter::gt("updatedAt", "2025-03-01T00:00:00Z");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Filter {
    /// Equality: `field == value`
    Eq(String, Value),
    /// Not equal: `field != value`
    Ne(String, Value),
    /// Greater than: `field > value`
    Gt(String, Value),
    /// Greater than or equal: `field >= value`
    Ge(String, Value),
    /// Less than: `field < value`
    Lt(String, Value),
    /// Less than or equal: `field <= value`
    Le(String, Value),
    /// Contains substring.
    Contains(String, String),
    /// Field is absent or null.
    IsNull(String),
}

impl Filter {
    /// Creates an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    /// Creates a not-equal filter.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Ne(field.into(), value.into())
    }

    /// Creates a greater-than filter.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Gt(field.into(), value.into())
    }

    /// Creates a greater-than-or-equal filter.
    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Ge(field.into(), value.into())
    }

    /// Creates a less-than filter.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Lt(field.into(), value.into())
    }

    /// Creates a less-than-or-equal filter.
    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Le(field.into(), value.into())
    }

    /// Creates a contains filter.
    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Contains(field.into(), value.into())
    }

    /// Creates an is-null filter.
    pub fn is_null(field: impl Into<String>) -> Self {
        Filter::IsNull(field.into())
    }

    /// Returns the field this filter applies to.
    pub fn field(&self) -> &str {
        match self {
            Filter::Eq(f, _)
            | Filter::Ne(f, _)
            | Filter::Gt(f, _)
            | Filter::Ge(f, _)
            | Filter::Lt(f, _)
            | Filter::Le(f, _)
            | Filter::Contains(f, _)
            | Filter::IsNull(f) => f,
        }
    }

    /// Evaluates this filter against a record.
    ///
    /// This is the semantics the in-memory store runs; remote stores are
    /// expected to match it.
    pub fn matches(&self, record: &DatasetRecord) -> bool {
        match self {
            Filter::Eq(field, value) => cmp_field(record, field, value) == Some(Ordering::Equal),
            Filter::Ne(field, value) => cmp_field(record, field, value) != Some(Ordering::Equal),
            Filter::Gt(field, value) => cmp_field(record, field, value) == Some(Ordering::Greater),
            Filter::Ge(field, value) => matches!(
                cmp_field(record, field, value),
                Some(Ordering::Greater) | Some(Ordering::Equal)
            ),
            Filter::Lt(field, value) => cmp_field(record, field, value) == Some(Ordering::Less),
            Filter::Le(field, value) => matches!(
                cmp_field(record, field, value),
                Some(Ordering::Less) | Some(Ordering::Equal)
            ),
            Filter::Contains(field, needle) => record
                .field_value(field)
                .and_then(|v| v.as_str().map(|s| s.contains(needle.as_str())))
                .unwrap_or(false),
            Filter::IsNull(field) => {
                matches!(record.field_value(field), None | Some(Value::Null))
            }
        }
    }
}

fn cmp_field(record: &DatasetRecord, field: &str, value: &Value) -> Option<Ordering> {
    compare_values(&record.field_value(field)?, value)
}

/// Compares two JSON values the way query ordering does.
///
/// Strings that both parse as RFC 3339 timestamps compare chronologically,
/// so mixed-precision timestamps order correctly. Values of different kinds
/// are incomparable.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => {
            match (
                DateTime::parse_from_rfc3339(a),
                DateTime::parse_from_rfc3339(b),
            ) {
                (Ok(a), Ok(b)) => Some(a.cmp(&b)),
                _ => Some(a.cmp(b)),
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DatasetRecord {
        DatasetRecord::new("r1")
            .set("name", "alpha")
            .set("count", 3)
            .set("owner", Value::Null)
            .with_updated_at("2025-03-01T10:00:00Z".parse().unwrap())
    }

    #[test]
    fn test_equality_and_ordering() {
        let r = record();
        assert!(Filter::eq("name", "alpha").matches(&r));
        assert!(!Filter::eq("name", "beta").matches(&r));
        assert!(Filter::gt("count", 2).matches(&r));
        assert!(Filter::le("count", 3).matches(&r));
        assert!(Filter::ne("count", 4).matches(&r));
    }

    #[test]
    fn test_timestamps_compare_chronologically() {
        let r = record();
        // Different precision than the record's own representation.
        assert!(Filter::gt("updatedAt", "2025-03-01T09:59:59+00:00").matches(&r));
        assert!(!Filter::gt("updatedAt", "2025-03-01T10:00:00.000Z").matches(&r));
        assert!(Filter::eq("updatedAt", "2025-03-01T10:00:00Z").matches(&r));
    }

    #[test]
    fn test_is_null_matches_absent_and_null() {
        let r = record();
        assert!(Filter::is_null("owner").matches(&r));
        assert!(Filter::is_null("missing").matches(&r));
        assert!(!Filter::is_null("name").matches(&r));
    }

    #[test]
    fn test_missing_field_never_orders() {
        let r = record();
        assert!(!Filter::gt("missing", 1).matches(&r));
        assert!(!Filter::lt("missing", 1).matches(&r));
    }

    #[test]
    fn test_contains() {
        let r = record();
        assert!(Filter::contains("name", "lph").matches(&r));
        assert!(!Filter::contains("name", "beta").matches(&r));
    }
}
