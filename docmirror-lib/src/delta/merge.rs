//! Merging delta batches into dataset snapshots.

use tracing::debug;
use tracing::warn;

use crate::cache::SnapshotCache;
use crate::model::DatasetRecord;

/// The change-timestamp field delta queries filter and order on.
pub(crate) const CHANGE_FIELD: &str = "updatedAt";

/// The fields compared to decide whether a merged record really changed.
///
/// Anything outside this set is carried along but never marks the dataset
/// as changed on its own.
pub const WATCHED_FIELDS: [&str; 6] = ["name", "status", "owner", "type", "updatedAt", "isActive"];

/// Returns `true` if any watched field differs between the cached and the
/// incoming version of a record.
pub fn record_changed(old: &DatasetRecord, new: &DatasetRecord) -> bool {
    WATCHED_FIELDS.iter().any(|field| {
        if *field == CHANGE_FIELD {
            old.updated_at() != new.updated_at()
        } else {
            old.get(field) != new.get(field)
        }
    })
}

/// Merges a delta batch into the dataset's live snapshot.
///
/// Replaces records whose watched fields changed, appends unseen ids, and
/// writes the snapshot back only when something actually changed. Returns
/// the records that did.
pub(crate) async fn apply_updates(
    snapshots: &SnapshotCache,
    dataset: &str,
    updates: &[DatasetRecord],
) -> Vec<DatasetRecord> {
    let mut records = snapshots.read(dataset).await.unwrap_or_default();
    let mut changed = Vec::new();

    for update in updates {
        match records.iter_mut().find(|r| r.id() == update.id()) {
            Some(existing) => {
                if record_changed(existing, update) {
                    debug!(dataset, id = update.id(), "updated record");
                    *existing = update.clone();
                    changed.push(update.clone());
                }
            }
            None => {
                debug!(dataset, id = update.id(), "added record");
                records.push(update.clone());
                changed.push(update.clone());
            }
        }
    }

    if !changed.is_empty() {
        if let Err(err) = snapshots.write(dataset, &records).await {
            warn!(dataset, %err, "failed to write merged snapshot");
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> DatasetRecord {
        DatasetRecord::new("srv-01")
            .set("name", "alpha")
            .set("status", "idle")
            .set("notes", "original")
            .with_updated_at("2025-03-01T10:00:00Z".parse().unwrap())
    }

    #[test]
    fn test_unwatched_field_change_is_not_a_change() {
        let new = base().set("notes", "edited");
        assert!(!record_changed(&base(), &new));
    }

    #[test]
    fn test_watched_field_change_is_detected() {
        let new = base().set("status", "busy");
        assert!(record_changed(&base(), &new));
    }

    #[test]
    fn test_timestamp_change_is_detected() {
        let new = base().with_updated_at("2025-03-01T10:05:00Z".parse().unwrap());
        assert!(record_changed(&base(), &new));
    }

    #[test]
    fn test_newly_watched_field_is_detected() {
        let new = base().set("owner", "ops");
        assert!(record_changed(&base(), &new));
    }

    #[test]
    fn test_identical_records_are_unchanged() {
        assert!(!record_changed(&base(), &base()));
    }
}
