//! Query string generation for the HTTP document store.

use serde_json::Value;

use super::Filter;
use super::Query;

/// Serializes a query into URL query parameters.
///
/// Produces zero or more `where=`, plus `orderBy=`, `limit=`, and `after=`
/// parameters, all percent-encoded.
pub(crate) fn query_string(query: &Query) -> String {
    let mut params = Vec::new();

    for filter in &query.filters {
        params.push(format!(
            "where={}",
            urlencoding::encode(&filter_to_string(filter))
        ));
    }

    if let Some(ref order) = query.order_by {
        params.push(format!(
            "orderBy={}",
            urlencoding::encode(&format!("{} {}", order.field, order.direction.as_str()))
        ));
    }

    if let Some(limit) = query.limit {
        params.push(format!("limit={limit}"));
    }

    if let Some(ref cursor) = query.cursor {
        params.push(format!("after={}", urlencoding::encode(cursor)));
    }

    params.join("&")
}

/// Renders one filter as a `field op literal` expression.
pub(crate) fn filter_to_string(filter: &Filter) -> String {
    match filter {
        Filter::Eq(field, value) => format!("{} == {}", field, value_to_literal(value)),
        Filter::Ne(field, value) => format!("{} != {}", field, value_to_literal(value)),
        Filter::Gt(field, value) => format!("{} > {}", field, value_to_literal(value)),
        Filter::Ge(field, value) => format!("{} >= {}", field, value_to_literal(value)),
        Filter::Lt(field, value) => format!("{} < {}", field, value_to_literal(value)),
        Filter::Le(field, value) => format!("{} <= {}", field, value_to_literal(value)),
        Filter::Contains(field, value) => {
            format!("contains({},{})", field, escape_string(value))
        }
        Filter::IsNull(field) => format!("{field} == null"),
    }
}

/// Renders a JSON value as a filter literal.
fn value_to_literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => escape_string(s),
        // Arrays and objects have no literal form; their JSON is quoted.
        other => escape_string(&other.to_string()),
    }
}

/// Quotes a string literal, doubling embedded single quotes.
fn escape_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::query::OrderBy;

    #[test]
    fn test_simple_filters() {
        assert_eq!(
            filter_to_string(&Filter::eq("name", "alpha")),
            "name == 'alpha'"
        );
        assert_eq!(filter_to_string(&Filter::gt("count", 10)), "count > 10");
        assert_eq!(
            filter_to_string(&Filter::is_null("owner")),
            "owner == null"
        );
        assert_eq!(
            filter_to_string(&Filter::eq("isActive", true)),
            "isActive == true"
        );
    }

    #[test]
    fn test_string_escaping() {
        assert_eq!(
            filter_to_string(&Filter::eq("name", "o'brien")),
            "name == 'o''brien'"
        );
        assert_eq!(
            filter_to_string(&Filter::contains("name", "srv")),
            "contains(name,'srv')"
        );
    }

    #[test]
    fn test_full_query_string() {
        let query = Query::new()
            .filter(Filter::gt("updatedAt", "2025-03-01T00:00:00Z"))
            .order_by(OrderBy::desc("updatedAt"))
            .limit(10)
            .after("srv-42");

        assert_eq!(
            query_string(&query),
            "where=updatedAt%20%3E%20%272025-03-01T00%3A00%3A00Z%27&orderBy=updatedAt%20desc&limit=10&after=srv-42"
        );
    }

    #[test]
    fn test_empty_query_string() {
        assert_eq!(query_string(&Query::new()), "");
    }
}
