//! Snapshot comparison and derived version records.

use crate::snapshot::{Snapshot, SnapshotId};
use crate::version::VersionNumber;
use chrono::{DateTime, Utc};
use confsync_protocol::ConfigMap;
use serde::Serialize;
use std::collections::BTreeMap;

/// Comparison of one key across two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEntry {
    /// Value in the first snapshot.
    pub left: Option<String>,
    /// Value in the second snapshot.
    pub right: Option<String>,
    /// Whether the two sides differ.
    pub changed: bool,
}

/// Pointwise comparison over the union of two key sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotDiff {
    entries: BTreeMap<String, DiffEntry>,
}

impl SnapshotDiff {
    /// Compares two snapshots by effective value.
    pub fn between(left: &Snapshot, right: &Snapshot) -> Self {
        Self::between_maps(&left.to_map(), &right.to_map())
    }

    /// Compares two flat maps.
    pub fn between_maps(left: &ConfigMap, right: &ConfigMap) -> Self {
        let mut entries = BTreeMap::new();
        for key in left.keys().chain(right.keys()) {
            if entries.contains_key(key) {
                continue;
            }
            let l = left.get(key).cloned();
            let r = right.get(key).cloned();
            let changed = l != r;
            entries.insert(
                key.clone(),
                DiffEntry {
                    left: l,
                    right: r,
                    changed,
                },
            );
        }
        Self { entries }
    }

    /// Returns every compared key.
    pub fn entries(&self) -> &BTreeMap<String, DiffEntry> {
        &self.entries
    }

    /// Returns true when no key differs.
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(|e| !e.changed)
    }

    /// Returns the number of differing keys.
    pub fn changed_count(&self) -> usize {
        self.entries.values().filter(|e| e.changed).count()
    }

    /// Keys present only on the right.
    pub fn added(&self) -> Vec<String> {
        self.select(|e| e.left.is_none() && e.right.is_some())
    }

    /// Keys present only on the left.
    pub fn removed(&self) -> Vec<String> {
        self.select(|e| e.left.is_some() && e.right.is_none())
    }

    /// Keys present on both sides with different values.
    pub fn modified(&self) -> Vec<String> {
        self.select(|e| e.left.is_some() && e.right.is_some() && e.changed)
    }

    fn select(&self, pred: impl Fn(&DiffEntry) -> bool) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, e)| pred(e))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

/// Audit entry between two snapshots of a lineage.
///
/// Derived data: it can always be rebuilt from the snapshots themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionRecord {
    /// Previous snapshot, absent for the first entry of a lineage.
    pub from: Option<SnapshotId>,
    /// Version of the previous snapshot.
    pub from_version: Option<VersionNumber>,
    /// The snapshot this record describes.
    pub to: SnapshotId,
    /// Its version.
    pub to_version: VersionNumber,
    /// Author of `to`.
    pub author: String,
    /// Creation time of `to`.
    pub created_at: DateTime<Utc>,
    /// Keys added by `to`.
    pub added: Vec<String>,
    /// Keys whose value changed.
    pub modified: Vec<String>,
    /// Keys dropped by `to`.
    pub removed: Vec<String>,
}

impl VersionRecord {
    /// Builds the record for `to`, comparing with `from` when present.
    pub fn between(from: Option<&Snapshot>, to: &Snapshot) -> Self {
        let diff = match from {
            Some(prev) => SnapshotDiff::between(prev, to),
            None => SnapshotDiff::between_maps(&ConfigMap::new(), &to.to_map()),
        };
        Self {
            from: from.map(Snapshot::id),
            from_version: from.map(|s| s.version().clone()),
            to: to.id(),
            to_version: to.version().clone(),
            author: to.created_by().to_string(),
            created_at: to.created_at(),
            added: diff.added(),
            modified: diff.modified(),
            removed: diff.removed(),
        }
    }

    /// One-line description such as `v1.0.0 -> v1.0.1: +2 ~1 -0`.
    pub fn summary(&self) -> String {
        let from = self
            .from_version
            .as_ref()
            .map_or_else(|| "(none)".to_string(), ToString::to_string);
        format!(
            "{from} -> {}: +{} ~{} -{}",
            self.to_version,
            self.added.len(),
            self.modified.len(),
            self.removed.len()
        )
    }
}
