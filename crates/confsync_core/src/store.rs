//! Append-only snapshot history with race-safe version assignment.

use crate::config::StoreConfig;
use crate::diff::{SnapshotDiff, VersionRecord};
use crate::error::{CoreError, CoreResult};
use crate::item::{flatten_json, ConfigItem};
use crate::snapshot::{Lineage, Snapshot, SnapshotId, SnapshotKind, SnapshotOrigin, SnapshotParts};
use crate::version::VersionNumber;
use chrono::Utc;
use confsync_protocol::ConfigMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Input for a new draft.
#[derive(Debug, Clone)]
pub struct DraftRequest {
    /// Target lineage.
    pub lineage: Lineage,
    /// Display name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Items; must not be empty.
    pub items: Vec<ConfigItem>,
    /// Author.
    pub author: String,
}

impl DraftRequest {
    /// Starts a request for the given lineage and author.
    pub fn new(app_id: u64, env_id: u64, author: impl Into<String>) -> Self {
        Self {
            lineage: Lineage::new(app_id, env_id),
            name: String::new(),
            description: String::new(),
            items: Vec::new(),
            author: author.into(),
        }
    }

    /// Sets the name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the items.
    #[must_use]
    pub fn with_items(mut self, items: Vec<ConfigItem>) -> Self {
        self.items = items;
        self
    }

    /// Sets the items from a flat key-value map.
    #[must_use]
    pub fn with_map(self, map: &ConfigMap) -> Self {
        self.with_items(ConfigItem::from_map(map))
    }

    /// Sets the items from a nested JSON document, flattened by dot path.
    pub fn with_nested(self, document: &serde_json::Value) -> CoreResult<Self> {
        let map = flatten_json(document)?;
        Ok(self.with_map(&map))
    }
}

/// Per-lineage counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotStatistics {
    /// All snapshots.
    pub total: usize,
    /// Draft snapshots.
    pub drafts: usize,
    /// Published snapshots.
    pub published: usize,
    /// Version of the newest snapshot.
    pub latest_version: Option<VersionNumber>,
    /// Version of the newest published snapshot.
    pub latest_published: Option<VersionNumber>,
}

#[derive(Debug, Default)]
struct LineageHead {
    /// Bumped on every version reservation; used as the optimistic check.
    generation: u64,
    latest: Option<VersionNumber>,
    versions: HashSet<VersionNumber>,
    ids: Vec<SnapshotId>,
}

#[derive(Debug)]
struct Reservation {
    id: SnapshotId,
    version: VersionNumber,
}

pub(crate) struct NewSnapshot {
    pub lineage: Lineage,
    pub name: String,
    pub description: String,
    pub kind: SnapshotKind,
    pub origin: SnapshotOrigin,
    pub author: String,
    pub items: BTreeMap<String, ConfigItem>,
    /// `None` reserves the next version; `Some` reuses an existing one.
    pub version: Option<VersionNumber>,
}

/// Append-only snapshot history.
///
/// Snapshots are never modified once inserted. Version numbers are assigned
/// by reading the lineage head, computing the successor outside the lock and
/// committing only if the head did not move in between; a writer that loses
/// the race recomputes and tries again, up to
/// [`StoreConfig::max_version_attempts`].
pub struct SnapshotStore {
    config: StoreConfig,
    snapshots: RwLock<HashMap<SnapshotId, Arc<Snapshot>>>,
    heads: Mutex<HashMap<Lineage, LineageHead>>,
    next_id: AtomicU64,
}

impl SnapshotStore {
    /// Creates an empty store.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            snapshots: RwLock::new(HashMap::new()),
            heads: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Creates a draft with the next version of its lineage.
    pub fn create_draft(&self, request: DraftRequest) -> CoreResult<Arc<Snapshot>> {
        let items = self.validate(request.items)?;
        self.append(NewSnapshot {
            lineage: request.lineage,
            name: request.name,
            description: request.description,
            kind: SnapshotKind::Draft,
            origin: SnapshotOrigin::Authored,
            author: request.author,
            items,
            version: None,
        })
    }

    pub(crate) fn append(&self, new: NewSnapshot) -> CoreResult<Arc<Snapshot>> {
        let reservation = match new.version {
            None => self.reserve_version(new.lineage)?,
            Some(version) => self.reserve_id(new.lineage, version),
        };

        let snapshot = Arc::new(Snapshot::from_parts(SnapshotParts {
            id: reservation.id,
            lineage: new.lineage,
            name: new.name,
            description: new.description,
            version: reservation.version,
            kind: new.kind,
            origin: new.origin,
            created_by: new.author,
            items: new.items,
        }));

        self.snapshots
            .write()
            .insert(snapshot.id(), Arc::clone(&snapshot));

        debug!(
            id = snapshot.id().0,
            lineage = %snapshot.lineage(),
            version = %snapshot.version(),
            kind = ?snapshot.kind(),
            items = snapshot.config_count(),
            "snapshot appended"
        );
        Ok(snapshot)
    }

    fn reserve_version(&self, lineage: Lineage) -> CoreResult<Reservation> {
        let attempts = self.config.max_version_attempts.max(1);
        for attempt in 1..=attempts {
            let (generation, latest) = {
                let heads = self.heads.lock();
                heads
                    .get(&lineage)
                    .map_or((0, None), |h| (h.generation, h.latest.clone()))
            };

            let candidate = VersionNumber::next_after(latest.as_ref(), Utc::now());
            if let Some(reservation) = self.commit_version(lineage, generation, candidate) {
                return Ok(reservation);
            }
            debug!(%lineage, attempt, "version reservation lost a race, retrying");
        }

        warn!(%lineage, attempts, "version reservation exhausted");
        Err(CoreError::VersionConflict { lineage, attempts })
    }

    /// Commits `candidate` if the lineage head is still at `expected_generation`.
    fn commit_version(
        &self,
        lineage: Lineage,
        expected_generation: u64,
        candidate: VersionNumber,
    ) -> Option<Reservation> {
        let mut heads = self.heads.lock();
        let head = heads.entry(lineage).or_default();
        if head.generation != expected_generation {
            return None;
        }

        let mut version = candidate.clone();
        let mut suffix = 1;
        while head.versions.contains(&version) {
            version = candidate.with_suffix(suffix);
            suffix += 1;
        }

        head.generation += 1;
        head.latest = Some(version.clone());
        head.versions.insert(version.clone());
        let id = SnapshotId(self.next_id.fetch_add(1, Ordering::Relaxed));
        head.ids.push(id);
        Some(Reservation { id, version })
    }

    fn reserve_id(&self, lineage: Lineage, version: VersionNumber) -> Reservation {
        let mut heads = self.heads.lock();
        let head = heads.entry(lineage).or_default();
        let id = SnapshotId(self.next_id.fetch_add(1, Ordering::Relaxed));
        head.ids.push(id);
        head.versions.insert(version.clone());
        Reservation { id, version }
    }

    fn validate(&self, items: Vec<ConfigItem>) -> CoreResult<BTreeMap<String, ConfigItem>> {
        if items.is_empty() {
            return Err(CoreError::invalid("snapshot must contain at least one item"));
        }

        let mut out = BTreeMap::new();
        for item in items {
            if item.key.trim().is_empty() {
                return Err(CoreError::invalid("configuration key is empty"));
            }
            if item.key.trim() != item.key {
                return Err(CoreError::invalid(format!(
                    "configuration key {:?} has surrounding whitespace",
                    item.key
                )));
            }
            if item.key.chars().count() > self.config.max_key_len {
                return Err(CoreError::invalid(format!(
                    "configuration key {:?} exceeds {} characters",
                    item.key, self.config.max_key_len
                )));
            }
            if out.contains_key(&item.key) {
                return Err(CoreError::invalid(format!(
                    "duplicate configuration key {:?}",
                    item.key
                )));
            }
            out.insert(item.key.clone(), item);
        }
        Ok(out)
    }

    /// Returns a snapshot by id.
    pub fn get(&self, id: SnapshotId) -> CoreResult<Arc<Snapshot>> {
        self.snapshots
            .read()
            .get(&id)
            .cloned()
            .ok_or(CoreError::SnapshotNotFound { id })
    }

    /// Returns a snapshot by id, checking that it belongs to `lineage`.
    pub fn get_in(&self, lineage: Lineage, id: SnapshotId) -> CoreResult<Arc<Snapshot>> {
        let snapshot = self.get(id)?;
        if snapshot.lineage() != lineage {
            return Err(CoreError::LineageMismatch {
                id,
                expected: lineage,
            });
        }
        Ok(snapshot)
    }

    /// Returns a lineage's snapshots in creation order.
    pub fn history(&self, lineage: Lineage) -> Vec<Arc<Snapshot>> {
        let ids = {
            let heads = self.heads.lock();
            heads
                .get(&lineage)
                .map(|h| h.ids.clone())
                .unwrap_or_default()
        };
        let snapshots = self.snapshots.read();
        // ids reserved by writers still building their snapshot are skipped
        ids.iter().filter_map(|id| snapshots.get(id).cloned()).collect()
    }

    /// Returns a lineage's snapshots, newest first.
    pub fn list(&self, lineage: Lineage) -> Vec<Arc<Snapshot>> {
        let mut all = self.history(lineage);
        all.reverse();
        all
    }

    /// Returns the newest snapshot of the given kind, or of any kind.
    pub fn latest(&self, lineage: Lineage, kind: Option<SnapshotKind>) -> Option<Arc<Snapshot>> {
        self.list(lineage)
            .into_iter()
            .find(|s| kind.map_or(true, |k| s.kind() == k))
    }

    /// Returns the newest published snapshot.
    pub fn latest_published(&self, lineage: Lineage) -> Option<Arc<Snapshot>> {
        self.latest(lineage, Some(SnapshotKind::Published))
    }

    /// Returns the newest draft.
    pub fn latest_draft(&self, lineage: Lineage) -> Option<Arc<Snapshot>> {
        self.latest(lineage, Some(SnapshotKind::Draft))
    }

    /// Returns the latest reserved version of a lineage.
    pub fn latest_version(&self, lineage: Lineage) -> Option<VersionNumber> {
        self.heads
            .lock()
            .get(&lineage)
            .and_then(|h| h.latest.clone())
    }

    /// Returns every lineage with at least one reservation.
    pub fn lineages(&self) -> Vec<Lineage> {
        let mut all: Vec<Lineage> = self.heads.lock().keys().copied().collect();
        all.sort();
        all
    }

    /// Returns per-lineage counts.
    pub fn statistics(&self, lineage: Lineage) -> SnapshotStatistics {
        let history = self.history(lineage);
        let drafts = history
            .iter()
            .filter(|s| s.kind() == SnapshotKind::Draft)
            .count();
        SnapshotStatistics {
            total: history.len(),
            drafts,
            published: history.len() - drafts,
            latest_version: self.latest_version(lineage),
            latest_published: history
                .iter()
                .rev()
                .find(|s| s.kind() == SnapshotKind::Published)
                .map(|s| s.version().clone()),
        }
    }

    /// Compares two snapshots by effective value.
    pub fn diff(&self, left: SnapshotId, right: SnapshotId) -> CoreResult<SnapshotDiff> {
        let left = self.get(left)?;
        let right = self.get(right)?;
        Ok(SnapshotDiff::between(&left, &right))
    }

    /// Rebuilds the audit trail of a lineage, oldest first.
    pub fn version_records(&self, lineage: Lineage) -> Vec<VersionRecord> {
        let history = self.history(lineage);
        let mut records = Vec::with_capacity(history.len());
        let mut prev: Option<&Arc<Snapshot>> = None;
        for snapshot in &history {
            records.push(VersionRecord::between(prev.map(|p| p.as_ref()), snapshot));
            prev = Some(snapshot);
        }
        records
    }

    /// Deletes a draft that no published snapshot was promoted from.
    ///
    /// The draft's version stays reserved, so it is never handed out again.
    pub fn delete_draft(&self, id: SnapshotId) -> CoreResult<()> {
        let snapshot = self.get(id)?;
        if snapshot.kind() != SnapshotKind::Draft {
            return Err(CoreError::invalid(format!(
                "snapshot {id} is published and cannot be deleted"
            )));
        }
        if let Some(by) = self
            .history(snapshot.lineage())
            .iter()
            .find(|s| s.origin() == SnapshotOrigin::Published(id))
        {
            return Err(CoreError::SnapshotInUse { id, by: by.id() });
        }

        let mut heads = self.heads.lock();
        if let Some(head) = heads.get_mut(&snapshot.lineage()) {
            head.ids.retain(|other| *other != id);
        }
        self.snapshots.write().remove(&id);
        debug!(id = id.0, lineage = %snapshot.lineage(), "draft deleted");
        Ok(())
    }

    /// Returns the number of stored snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    /// Returns true when no snapshot is stored.
    pub fn is_empty(&self) -> bool {
        self.snapshots.read().is_empty()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}
