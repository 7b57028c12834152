//! Immutable snapshots.

use crate::item::ConfigItem;
use crate::version::VersionNumber;
use chrono::{DateTime, Utc};
use confsync_protocol::ConfigMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a snapshot, unique across all lineages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SnapshotId(pub u64);

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An (application, environment) pair owning one history of snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Lineage {
    /// Application id.
    pub app_id: u64,
    /// Environment id.
    pub env_id: u64,
}

impl Lineage {
    /// Creates a lineage.
    pub const fn new(app_id: u64, env_id: u64) -> Self {
        Self { app_id, env_id }
    }
}

impl fmt::Display for Lineage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "app {}/env {}", self.app_id, self.env_id)
    }
}

/// Whether a snapshot is a candidate or has been promoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    /// Staged, not yet promoted.
    Draft,
    /// Promoted copy of a draft.
    Published,
}

/// How a snapshot came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "origin", content = "source")]
pub enum SnapshotOrigin {
    /// Written directly by an author.
    Authored,
    /// Promoted from the given draft.
    Published(SnapshotId),
    /// Copied forward from the given historical snapshot.
    Rollback(SnapshotId),
}

impl SnapshotOrigin {
    /// Returns the snapshot this one was derived from.
    pub fn source(&self) -> Option<SnapshotId> {
        match self {
            SnapshotOrigin::Authored => None,
            SnapshotOrigin::Published(id) | SnapshotOrigin::Rollback(id) => Some(*id),
        }
    }
}

/// An immutable, versioned configuration set.
///
/// Snapshots are only constructed by the store. The content digest is
/// computed once at creation and can be re-checked with
/// [`Snapshot::verify_digest`].
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    id: SnapshotId,
    lineage: Lineage,
    name: String,
    description: String,
    version: VersionNumber,
    kind: SnapshotKind,
    origin: SnapshotOrigin,
    created_by: String,
    created_at: DateTime<Utc>,
    items: BTreeMap<String, ConfigItem>,
    #[serde(serialize_with = "serialize_digest")]
    digest: [u8; 32],
}

pub(crate) struct SnapshotParts {
    pub id: SnapshotId,
    pub lineage: Lineage,
    pub name: String,
    pub description: String,
    pub version: VersionNumber,
    pub kind: SnapshotKind,
    pub origin: SnapshotOrigin,
    pub created_by: String,
    pub items: BTreeMap<String, ConfigItem>,
}

impl Snapshot {
    pub(crate) fn from_parts(parts: SnapshotParts) -> Self {
        let digest = content_digest(&parts.items);
        Self {
            id: parts.id,
            lineage: parts.lineage,
            name: parts.name,
            description: parts.description,
            version: parts.version,
            kind: parts.kind,
            origin: parts.origin,
            created_by: parts.created_by,
            created_at: Utc::now(),
            items: parts.items,
            digest,
        }
    }

    /// Returns the snapshot id.
    pub fn id(&self) -> SnapshotId {
        self.id
    }

    /// Returns the owning lineage.
    pub fn lineage(&self) -> Lineage {
        self.lineage
    }

    /// Returns the display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the version number.
    pub fn version(&self) -> &VersionNumber {
        &self.version
    }

    /// Returns the kind.
    pub fn kind(&self) -> SnapshotKind {
        self.kind
    }

    /// Returns how the snapshot was produced.
    pub fn origin(&self) -> SnapshotOrigin {
        self.origin
    }

    /// Returns the author.
    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    /// Returns the creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the items keyed by configuration key.
    pub fn items(&self) -> &BTreeMap<String, ConfigItem> {
        &self.items
    }

    /// Returns one item.
    pub fn item(&self, key: &str) -> Option<&ConfigItem> {
        self.items.get(key)
    }

    /// Returns the number of items.
    pub fn config_count(&self) -> usize {
        self.items.len()
    }

    /// Returns the effective key-value view.
    pub fn to_map(&self) -> ConfigMap {
        self.items
            .iter()
            .map(|(k, item)| (k.clone(), item.effective_value().to_string()))
            .collect()
    }

    /// Returns required keys that resolve to an empty value.
    pub fn missing_required(&self) -> Vec<String> {
        self.items
            .values()
            .filter(|item| item.required && item.effective_value().is_empty())
            .map(|item| item.key.clone())
            .collect()
    }

    /// Returns the SHA-256 content digest.
    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }

    /// Returns the digest as lowercase hex.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }

    /// Recomputes the digest and compares it with the stored one.
    pub fn verify_digest(&self) -> bool {
        content_digest(&self.items) == self.digest
    }
}

fn content_digest(items: &BTreeMap<String, ConfigItem>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for item in items.values() {
        hasher.update(item.key.as_bytes());
        hasher.update([0]);
        hasher.update(item.value.as_bytes());
        hasher.update([0, item.value_type.code()]);
        hasher.update([u8::from(item.encrypted), u8::from(item.required)]);
        if let Some(default) = &item.default_value {
            hasher.update([1]);
            hasher.update(default.as_bytes());
        }
        hasher.update([0xff]);
    }
    hasher.finalize().into()
}

fn serialize_digest<S: serde::Serializer>(digest: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(digest))
}
