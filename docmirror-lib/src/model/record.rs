//! Dynamic dataset record

use std::collections::HashMap;

use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// A record from a remote document collection.
///
/// Records hold field values as a `HashMap<String, serde_json::Value>`,
/// allowing dynamic access to any field. The `id` is remote-assigned and is
/// the record's identity; `updated_at` is the store's change timestamp,
/// present when the collection maintains one.
///
/// # Example
///
/// ```
/// use docmirror_lib::model::DatasetRecord;
///
/// let record = DatasetRecord::new("srv-01")
///     .set("name", "build server")
///     .set("isActive", true);
///
/// assert_eq!(record.get_str("name"), Some("build server"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    /// The remote-assigned document id.
    pub(crate) id: String,

    /// The change timestamp maintained by the remote store.
    #[serde(
        rename = "updatedAt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub(crate) updated_at: Option<DateTime<Utc>>,

    /// All remaining field values.
    #[serde(flatten)]
    pub(crate) fields: HashMap<String, Value>,
}

impl DatasetRecord {
    /// Creates a new record with the given id and no fields.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            updated_at: None,
            fields: HashMap::new(),
        }
    }

    /// Returns the record id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the change timestamp, if the record carries one.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Sets the change timestamp (builder pattern).
    pub fn with_updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }

    /// Sets a field value (builder pattern).
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Inserts a field value.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Returns a reference to the field value, if it exists.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns `true` if the record contains the given field.
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Returns a reference to all fields.
    pub fn fields(&self) -> &HashMap<String, Value> {
        &self.fields
    }

    /// Returns a string field as `&str`.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Returns a boolean field.
    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.fields.get(field).and_then(Value::as_bool)
    }

    /// Returns an integer field.
    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.fields.get(field).and_then(Value::as_i64)
    }

    /// Resolves a field by name the way queries see it.
    ///
    /// `id` and `updatedAt` are materialized from their dedicated slots
    /// (`updatedAt` as an RFC 3339 string); everything else comes from the
    /// field map. Filter evaluation and ordering in the in-memory store go
    /// through this accessor.
    pub fn field_value(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(Value::String(self.id.clone())),
            "updatedAt" => self
                .updated_at
                .map(|at| Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true))),
            _ => self.fields.get(field).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_json_round_trip() {
        let json = r#"{"id":"srv-01","updatedAt":"2025-03-01T10:00:00Z","name":"alpha","isActive":true}"#;
        let record: DatasetRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.id(), "srv-01");
        assert_eq!(record.get_str("name"), Some("alpha"));
        assert_eq!(record.get_bool("isActive"), Some(true));
        assert_eq!(
            record.updated_at(),
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap())
        );

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["id"], "srv-01");
        assert_eq!(back["name"], "alpha");
    }

    #[test]
    fn test_missing_updated_at_is_none() {
        let record: DatasetRecord = serde_json::from_str(r#"{"id":"a","name":"x"}"#).unwrap();
        assert_eq!(record.updated_at(), None);
        assert_eq!(record.field_value("updatedAt"), None);
    }

    #[test]
    fn test_field_value_materializes_id_and_timestamp() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let record = DatasetRecord::new("a").with_updated_at(at);

        assert_eq!(record.field_value("id"), Some(Value::String("a".into())));
        assert_eq!(
            record.field_value("updatedAt"),
            Some(Value::String("2025-03-01T10:00:00.000Z".into()))
        );
    }
}
