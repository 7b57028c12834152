//! The live configuration store clients pull from.

use crate::error::CoreResult;
use crate::item::ConfigItem;
use crate::snapshot::{Lineage, Snapshot};
use crate::version::VersionNumber;
use chrono::{DateTime, Utc};
use confsync_protocol::ConfigMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// How snapshot items are written into the live store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplyMode {
    /// Upsert every snapshot key; keys missing from the snapshot stay live.
    #[default]
    Additive,
    /// Upsert every snapshot key and delete live keys missing from the snapshot.
    Exact,
}

/// Outcome of applying a snapshot to the live store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    /// Lineage written.
    pub lineage: Lineage,
    /// Live revision after the apply.
    pub revision: u64,
    /// Version of the applied snapshot.
    pub version: VersionNumber,
    /// Keys that were not live before.
    pub inserted: Vec<String>,
    /// Keys whose value changed.
    pub updated: Vec<String>,
    /// Keys deleted (only in [`ApplyMode::Exact`]).
    pub removed: Vec<String>,
    /// Keys written with their existing value.
    pub unchanged: usize,
}

impl ApplyReport {
    /// Returns true when any live value changed.
    pub fn has_changes(&self) -> bool {
        !(self.inserted.is_empty() && self.updated.is_empty() && self.removed.is_empty())
    }
}

/// Current live configuration of a lineage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveConfig {
    /// Lineage.
    pub lineage: Lineage,
    /// Effective key-value set.
    pub data: ConfigMap,
    /// Monotonic revision; 0 until the first apply.
    pub revision: u64,
    /// Version of the last applied snapshot.
    pub version: Option<VersionNumber>,
    /// Who applied it.
    pub updated_by: Option<String>,
    /// When it was applied.
    pub updated_at: Option<DateTime<Utc>>,
}

/// System-of-record for live configuration values.
///
/// Implementations must bump the lineage revision on every apply so clients
/// can order payloads.
pub trait LiveConfigStore: Send + Sync {
    /// Writes a snapshot's items into the live set.
    fn apply(&self, snapshot: &Snapshot, mode: ApplyMode, applied_by: &str) -> CoreResult<ApplyReport>;

    /// Reads the live set of a lineage.
    fn load(&self, lineage: Lineage) -> CoreResult<LiveConfig>;

    /// Reads only the revision of a lineage.
    fn revision(&self, lineage: Lineage) -> CoreResult<u64> {
        self.load(lineage).map(|live| live.revision)
    }
}

#[derive(Debug, Default)]
struct LiveEntry {
    items: BTreeMap<String, ConfigItem>,
    revision: u64,
    version: Option<VersionNumber>,
    updated_by: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

/// In-memory [`LiveConfigStore`].
#[derive(Debug, Default)]
pub struct MemoryLiveStore {
    entries: RwLock<HashMap<Lineage, LiveEntry>>,
}

impl MemoryLiveStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LiveConfigStore for MemoryLiveStore {
    fn apply(&self, snapshot: &Snapshot, mode: ApplyMode, applied_by: &str) -> CoreResult<ApplyReport> {
        let mut entries = self.entries.write();
        let entry = entries.entry(snapshot.lineage()).or_default();

        let mut inserted = Vec::new();
        let mut updated = Vec::new();
        let mut unchanged = 0;
        for (key, item) in snapshot.items() {
            match entry.items.insert(key.clone(), item.clone()) {
                None => inserted.push(key.clone()),
                Some(prev) if prev.effective_value() != item.effective_value() => {
                    updated.push(key.clone())
                }
                Some(_) => unchanged += 1,
            }
        }

        let mut removed = Vec::new();
        if mode == ApplyMode::Exact {
            entry.items.retain(|key, _| {
                let keep = snapshot.items().contains_key(key);
                if !keep {
                    removed.push(key.clone());
                }
                keep
            });
        }

        entry.revision += 1;
        entry.version = Some(snapshot.version().clone());
        entry.updated_by = Some(applied_by.to_string());
        entry.updated_at = Some(Utc::now());

        Ok(ApplyReport {
            lineage: snapshot.lineage(),
            revision: entry.revision,
            version: snapshot.version().clone(),
            inserted,
            updated,
            removed,
            unchanged,
        })
    }

    fn load(&self, lineage: Lineage) -> CoreResult<LiveConfig> {
        let entries = self.entries.read();
        Ok(match entries.get(&lineage) {
            Some(entry) => LiveConfig {
                lineage,
                data: entry
                    .items
                    .iter()
                    .map(|(k, item)| (k.clone(), item.effective_value().to_string()))
                    .collect(),
                revision: entry.revision,
                version: entry.version.clone(),
                updated_by: entry.updated_by.clone(),
                updated_at: entry.updated_at,
            },
            None => LiveConfig {
                lineage,
                data: ConfigMap::new(),
                revision: 0,
                version: None,
                updated_by: None,
                updated_at: None,
            },
        })
    }

    fn revision(&self, lineage: Lineage) -> CoreResult<u64> {
        Ok(self.entries.read().get(&lineage).map_or(0, |e| e.revision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DraftRequest, SnapshotStore};

    fn snapshot(store: &SnapshotStore, pairs: &[(&str, &str)]) -> std::sync::Arc<Snapshot> {
        let map: ConfigMap = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        store
            .create_draft(DraftRequest::new(1, 1, "ops").with_map(&map))
            .unwrap()
    }

    #[test]
    fn unknown_lineage_is_empty_at_revision_zero() {
        let live = MemoryLiveStore::new();
        let cfg = live.load(Lineage::new(5, 5)).unwrap();
        assert!(cfg.data.is_empty());
        assert_eq!(cfg.revision, 0);
        assert_eq!(live.revision(Lineage::new(5, 5)).unwrap(), 0);
    }

    #[test]
    fn additive_apply_keeps_absent_keys() {
        let store = SnapshotStore::default();
        let live = MemoryLiveStore::new();
        live.apply(&snapshot(&store, &[("a", "1"), ("b", "1")]), ApplyMode::Additive, "ops")
            .unwrap();
        let report = live
            .apply(&snapshot(&store, &[("a", "2"), ("c", "1")]), ApplyMode::Additive, "ops")
            .unwrap();

        assert_eq!(report.inserted, vec!["c"]);
        assert_eq!(report.updated, vec!["a"]);
        assert!(report.removed.is_empty());
        assert_eq!(report.revision, 2);

        let cfg = live.load(Lineage::new(1, 1)).unwrap();
        assert_eq!(cfg.data.len(), 3);
        assert_eq!(cfg.data["a"], "2");
        assert_eq!(cfg.data["b"], "1");
        assert_eq!(cfg.version.unwrap().as_str(), "v1.0.1");
        assert_eq!(cfg.updated_by.as_deref(), Some("ops"));
    }

    #[test]
    fn exact_apply_removes_absent_keys() {
        let store = SnapshotStore::default();
        let live = MemoryLiveStore::new();
        live.apply(&snapshot(&store, &[("a", "1"), ("b", "1")]), ApplyMode::Additive, "ops")
            .unwrap();
        let report = live
            .apply(&snapshot(&store, &[("a", "1")]), ApplyMode::Exact, "ops")
            .unwrap();

        assert_eq!(report.removed, vec!["b"]);
        assert_eq!(report.unchanged, 1);
        assert!(report.has_changes());
        assert_eq!(live.load(Lineage::new(1, 1)).unwrap().data.len(), 1);
    }

    #[test]
    fn reapplying_bumps_revision_without_changes() {
        let store = SnapshotStore::default();
        let live = MemoryLiveStore::new();
        let snap = snapshot(&store, &[("a", "1")]);
        live.apply(&snap, ApplyMode::Additive, "ops").unwrap();
        let report = live.apply(&snap, ApplyMode::Additive, "ops").unwrap();

        assert!(!report.has_changes());
        assert_eq!(report.revision, 2);
    }
}
