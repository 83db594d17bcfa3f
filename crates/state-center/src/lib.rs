use std::collections::{BTreeMap, BTreeSet};

use controlsync_core_types::ControlId;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

/// Custom values staged for one control, keyed by value name.
pub type StagedValues = BTreeMap<String, Value>;

/// Everything a single request build consumes from the tracker.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ChangeSet {
    pub dirty: BTreeSet<ControlId>,
    pub staged: BTreeMap<ControlId, StagedValues>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.dirty.is_empty() && self.staged.is_empty()
    }

    pub fn is_dirty(&self, id: &ControlId) -> bool {
        self.dirty.contains(id)
    }

    /// Staged values as a plain JSON object, ready for the request blob.
    pub fn staged_json(&self) -> Value {
        let map = self
            .staged
            .iter()
            .map(|(id, values)| {
                let values = values
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect::<serde_json::Map<_, _>>();
                (id.0.clone(), Value::Object(values))
            })
            .collect::<serde_json::Map<_, _>>();
        Value::Object(map)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    pub marked: u64,
    pub staged: u64,
    pub snapshots: u64,
    pub restores: u64,
}

#[derive(Debug, Default)]
struct ChangeRecord {
    dirty: BTreeSet<ControlId>,
    staged: BTreeMap<ControlId, StagedValues>,
}

/// Dirty-set and staging area shared by event handlers and the request builder.
///
/// Mutation and the single snapshot per request build happen under one lock,
/// so a snapshot never observes a half-applied change.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    record: Mutex<ChangeRecord>,
    stats: Mutex<TrackerStats>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_dirty(&self, id: impl Into<ControlId>) {
        let id = id.into();
        trace!(control = %id, "control marked dirty");
        self.record.lock().dirty.insert(id);
        self.stats.lock().marked += 1;
    }

    pub fn stage_value(&self, id: impl Into<ControlId>, key: impl Into<String>, value: Value) {
        let id = id.into();
        let key = key.into();
        trace!(control = %id, key = %key, "custom value staged");
        self.record
            .lock()
            .staged
            .entry(id)
            .or_default()
            .insert(key, value);
        self.stats.lock().staged += 1;
    }

    pub fn is_dirty(&self, id: &ControlId) -> bool {
        self.record.lock().dirty.contains(id)
    }

    pub fn staged(&self, id: &ControlId) -> Option<StagedValues> {
        self.record.lock().staged.get(id).cloned()
    }

    pub fn is_empty(&self) -> bool {
        let record = self.record.lock();
        record.dirty.is_empty() && record.staged.is_empty()
    }

    /// Takes the current dirty set and staged values, leaving both empty.
    pub fn snapshot_and_clear(&self) -> ChangeSet {
        let mut record = self.record.lock();
        let set = ChangeSet {
            dirty: std::mem::take(&mut record.dirty),
            staged: std::mem::take(&mut record.staged),
        };
        drop(record);
        self.stats.lock().snapshots += 1;
        trace!(
            dirty = set.dirty.len(),
            staged = set.staged.len(),
            "change set taken"
        );
        set
    }

    /// Puts a change set back after a failed exchange.
    ///
    /// Values staged since the snapshot was taken are kept; restored values only
    /// fill keys that were not staged again in the meantime.
    pub fn restore(&self, set: ChangeSet) {
        if set.is_empty() {
            return;
        }
        let mut record = self.record.lock();
        record.dirty.extend(set.dirty);
        for (id, values) in set.staged {
            let current = record.staged.entry(id).or_default();
            for (key, value) in values {
                current.entry(key).or_insert(value);
            }
        }
        drop(record);
        self.stats.lock().restores += 1;
    }

    pub fn clear(&self) {
        let mut record = self.record.lock();
        record.dirty.clear();
        record.staged.clear();
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mark_dirty_is_idempotent() {
        let tracker = ChangeTracker::new();
        tracker.mark_dirty("a");
        tracker.mark_dirty("a");
        let set = tracker.snapshot_and_clear();
        assert_eq!(set.dirty.len(), 1);
        assert!(set.is_dirty(&ControlId::new("a")));
    }

    #[test]
    fn staging_overwrites_same_key() {
        let tracker = ChangeTracker::new();
        tracker.stage_value("grid", "page", json!(1));
        tracker.stage_value("grid", "page", json!({"n": 2, "sort": ["a", "b"]}));
        tracker.stage_value("grid", "filter", json!("x"));

        let staged = tracker.staged(&ControlId::new("grid")).unwrap();
        assert_eq!(staged.len(), 2);
        assert_eq!(staged["page"], json!({"n": 2, "sort": ["a", "b"]}));
    }

    #[test]
    fn values_do_not_leak_across_snapshots() {
        let tracker = ChangeTracker::new();
        tracker.stage_value("a", "k1", json!(1));
        tracker.mark_dirty("a");
        let first = tracker.snapshot_and_clear();
        assert!(tracker.is_empty());

        tracker.stage_value("b", "k2", json!(2));
        let second = tracker.snapshot_and_clear();

        assert!(first.staged.contains_key(&ControlId::new("a")));
        assert!(!second.staged.contains_key(&ControlId::new("a")));
        assert!(second.dirty.is_empty());
        assert_eq!(second.staged[&ControlId::new("b")]["k2"], json!(2));
    }

    #[test]
    fn restore_keeps_newer_values() {
        let tracker = ChangeTracker::new();
        tracker.stage_value("a", "k", json!("old"));
        tracker.stage_value("a", "only_old", json!(true));
        tracker.mark_dirty("a");
        let set = tracker.snapshot_and_clear();

        tracker.stage_value("a", "k", json!("new"));
        tracker.restore(set);

        let staged = tracker.staged(&ControlId::new("a")).unwrap();
        assert_eq!(staged["k"], json!("new"));
        assert_eq!(staged["only_old"], json!(true));
        assert!(tracker.is_dirty(&ControlId::new("a")));
        assert_eq!(tracker.stats().restores, 1);
    }

    #[test]
    fn staged_json_groups_by_control() {
        let tracker = ChangeTracker::new();
        tracker.stage_value("a", "x", json!(1));
        tracker.stage_value("b", "y", json!([1, 2]));
        let set = tracker.snapshot_and_clear();
        assert_eq!(set.staged_json(), json!({"a": {"x": 1}, "b": {"y": [1, 2]}}));
    }
}
