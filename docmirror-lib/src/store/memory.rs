//! In-memory document store.

use std::cmp::Ordering;

use async_trait::async_trait;
use dashmap::DashMap;

use super::DocumentStore;
use crate::api::query::Direction;
use crate::api::query::Query;
use crate::api::query::QueryPage;
use crate::api::query::compare_values;
use crate::error::Error;
use crate::model::DatasetRecord;

/// A document store held entirely in memory.
///
/// Evaluates filters, ordering, limits, and cursors locally with the same
/// semantics remote stores are expected to provide. Useful for tests and
/// offline development; data is lost when the store is dropped.
///
/// # Example
///
/// ```
/// use docmirror_lib::model::DatasetRecord;
/// use docmirror_lib::store::MemoryStore;
///
/// let store = MemoryStore::new();
/// store.insert("servers", DatasetRecord::new("srv-01").set("name", "alpha"));
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, Vec<DatasetRecord>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
        }
    }

    /// Inserts a record, replacing any record with the same id.
    pub fn insert(&self, collection: &str, record: DatasetRecord) {
        let mut records = self.collections.entry(collection.to_string()).or_default();
        match records.iter_mut().find(|r| r.id() == record.id()) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }

    /// Inserts several records.
    pub fn insert_many(
        &self,
        collection: &str,
        records: impl IntoIterator<Item = DatasetRecord>,
    ) {
        for record in records {
            self.insert(collection, record);
        }
    }

    /// Returns a record by id.
    pub fn get(&self, collection: &str, id: &str) -> Option<DatasetRecord> {
        self.collections
            .get(collection)?
            .iter()
            .find(|r| r.id() == id)
            .cloned()
    }

    /// Returns the number of records in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, |r| r.len())
    }

    /// Returns `true` if the collection is empty or absent.
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn query(&self, collection: &str, query: &Query) -> Result<QueryPage, Error> {
        let mut matched: Vec<DatasetRecord> = self
            .collections
            .get(collection)
            .map(|records| records.value().clone())
            .unwrap_or_default()
            .into_iter()
            .filter(|record| query.filters.iter().all(|f| f.matches(record)))
            .collect();

        if let Some(ref order) = query.order_by {
            matched.sort_by(|a, b| {
                let ord = match (a.field_value(&order.field), b.field_value(&order.field)) {
                    (Some(a), Some(b)) => compare_values(&a, &b).unwrap_or(Ordering::Equal),
                    // Records without the ordered field sort last.
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                match order.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        let start = match &query.cursor {
            Some(cursor) => match matched.iter().position(|r| r.id() == cursor.as_str()) {
                Some(index) => index + 1,
                // A cursor whose record no longer matches ends the traversal.
                None => return Ok(QueryPage::new(Vec::new())),
            },
            None => 0,
        };

        let tail = &matched[start.min(matched.len())..];
        let taken = match query.limit {
            Some(limit) => limit.min(tail.len()),
            None => tail.len(),
        };
        let records: Vec<DatasetRecord> = tail[..taken].to_vec();

        let mut page = QueryPage::new(records);
        if taken < tail.len() {
            if let Some(last) = tail[..taken].last() {
                page = page.with_next_cursor(last.id());
            }
        }

        Ok(page)
    }

    async fn delete_batch(&self, collection: &str, ids: &[String]) -> Result<(), Error> {
        if let Some(mut records) = self.collections.get_mut(collection) {
            records.retain(|r| !ids.iter().any(|id| id == r.id()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::query::Filter;
    use crate::api::query::OrderBy;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_many(
            "servers",
            (1..=5).map(|i| {
                DatasetRecord::new(format!("srv-{i:02}"))
                    .set("rank", i)
                    .set("status", if i % 2 == 0 { "idle" } else { "busy" })
            }),
        );
        store
    }

    #[tokio::test]
    async fn test_filter_and_order() {
        let store = seeded();
        let query = Query::new()
            .filter(Filter::eq("status", "busy"))
            .order_by(OrderBy::desc("rank"));

        let page = store.query("servers", &query).await.unwrap();
        let ids: Vec<&str> = page.records().iter().map(|r| r.id()).collect();
        assert_eq!(ids, ["srv-05", "srv-03", "srv-01"]);
        assert_eq!(page.next_cursor(), None);
    }

    #[tokio::test]
    async fn test_cursor_pagination() {
        let store = seeded();
        let query = Query::new().order_by(OrderBy::asc("rank")).limit(2);

        let first = store.query("servers", &query).await.unwrap();
        assert_eq!(first.len(), 2);
        let cursor = first.next_cursor().unwrap().to_string();
        assert_eq!(cursor, "srv-02");

        let second = store
            .query("servers", &query.clone().after(cursor))
            .await
            .unwrap();
        let ids: Vec<&str> = second.records().iter().map(|r| r.id()).collect();
        assert_eq!(ids, ["srv-03", "srv-04"]);
    }

    #[tokio::test]
    async fn test_exact_final_page_has_no_cursor() {
        let store = seeded();
        let query = Query::new().order_by(OrderBy::asc("rank")).limit(5);

        let page = store.query("servers", &query).await.unwrap();
        assert_eq!(page.len(), 5);
        assert_eq!(page.next_cursor(), None);
    }

    #[tokio::test]
    async fn test_fetch_all_follows_cursors() {
        let store = seeded();
        let all = store.fetch_all("servers").await.unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn test_delete_batch() {
        let store = seeded();
        store
            .delete_batch("servers", &["srv-01".into(), "srv-04".into()])
            .await
            .unwrap();
        assert_eq!(store.len("servers"), 3);
        assert!(store.get("servers", "srv-01").is_none());
    }

    #[tokio::test]
    async fn test_insert_replaces_by_id() {
        let store = seeded();
        store.insert("servers", DatasetRecord::new("srv-01").set("rank", 99));
        assert_eq!(store.len("servers"), 5);
        assert_eq!(
            store.get("servers", "srv-01").unwrap().get_i64("rank"),
            Some(99)
        );
    }
}
