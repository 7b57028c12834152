//! Draft, publish, rollback and apply transitions.

use crate::diff::{SnapshotDiff, VersionRecord};
use crate::error::{CoreError, CoreResult};
use crate::item::ConfigItem;
use crate::live::{ApplyMode, ApplyReport, LiveConfig, LiveConfigStore};
use crate::snapshot::{Lineage, Snapshot, SnapshotId, SnapshotKind, SnapshotOrigin};
use crate::store::{DraftRequest, NewSnapshot, SnapshotStore};
use confsync_protocol::ChangeType;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// A completed lifecycle transition.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// A draft was created by an author.
    Drafted {
        /// The new draft.
        snapshot: Arc<Snapshot>,
    },
    /// A draft was promoted.
    Published {
        /// The source draft.
        draft: Arc<Snapshot>,
        /// The published copy.
        published: Arc<Snapshot>,
    },
    /// A historical snapshot was copied into a new draft.
    RolledBack {
        /// The snapshot copied from.
        target: Arc<Snapshot>,
        /// The new draft.
        draft: Arc<Snapshot>,
    },
    /// A snapshot was written into the live store.
    Applied {
        /// The applied snapshot.
        snapshot: Arc<Snapshot>,
        /// What changed.
        report: ApplyReport,
        /// Live configuration after the apply.
        live: LiveConfig,
    },
}

impl LifecycleEvent {
    /// Returns the lineage the event belongs to.
    pub fn lineage(&self) -> Lineage {
        match self {
            LifecycleEvent::Drafted { snapshot } | LifecycleEvent::Applied { snapshot, .. } => {
                snapshot.lineage()
            }
            LifecycleEvent::Published { published, .. } => published.lineage(),
            LifecycleEvent::RolledBack { draft, .. } => draft.lineage(),
        }
    }

    /// Classifies an `Applied` event for change notifications.
    pub fn change_type(&self) -> Option<ChangeType> {
        match self {
            LifecycleEvent::Applied { snapshot, .. } => Some(match snapshot.origin() {
                SnapshotOrigin::Published(_) => ChangeType::Publish,
                SnapshotOrigin::Rollback(_) => ChangeType::Rollback,
                SnapshotOrigin::Authored => ChangeType::Apply,
            }),
            _ => None,
        }
    }
}

/// Receives lifecycle events on the thread that performed the transition.
pub trait LifecycleObserver: Send + Sync {
    /// Called after a transition completes.
    fn on_event(&self, event: &LifecycleEvent);
}

/// Snapshot state transitions on top of a [`SnapshotStore`].
pub struct SnapshotLifecycle {
    store: Arc<SnapshotStore>,
    live: Arc<dyn LiveConfigStore>,
    observers: RwLock<Vec<Arc<dyn LifecycleObserver>>>,
}

impl SnapshotLifecycle {
    /// Creates a lifecycle over the given store and live store.
    pub fn new(store: Arc<SnapshotStore>, live: Arc<dyn LiveConfigStore>) -> Self {
        Self {
            store,
            live,
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Returns the snapshot store.
    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Returns the live store.
    pub fn live(&self) -> &Arc<dyn LiveConfigStore> {
        &self.live
    }

    /// Registers an observer.
    pub fn subscribe(&self, observer: Arc<dyn LifecycleObserver>) {
        self.observers.write().push(observer);
    }

    /// Returns the number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    fn emit(&self, event: LifecycleEvent) {
        let observers = self.observers.read().clone();
        for observer in observers {
            observer.on_event(&event);
        }
    }

    /// Creates a draft from items.
    pub fn create_draft(
        &self,
        app_id: u64,
        env_id: u64,
        name: impl Into<String>,
        description: impl Into<String>,
        items: Vec<ConfigItem>,
        author: impl Into<String>,
    ) -> CoreResult<Arc<Snapshot>> {
        self.create(
            DraftRequest::new(app_id, env_id, author)
                .named(name)
                .described(description)
                .with_items(items),
        )
    }

    /// Creates a draft from a prepared request.
    pub fn create(&self, request: DraftRequest) -> CoreResult<Arc<Snapshot>> {
        let snapshot = self.store.create_draft(request)?;
        info!(
            id = snapshot.id().0,
            lineage = %snapshot.lineage(),
            version = %snapshot.version(),
            author = snapshot.created_by(),
            "draft created"
        );
        self.emit(LifecycleEvent::Drafted {
            snapshot: Arc::clone(&snapshot),
        });
        Ok(snapshot)
    }

    /// Promotes a draft into a new published snapshot with the same version.
    pub fn publish(&self, draft_id: SnapshotId, publisher: &str) -> CoreResult<Arc<Snapshot>> {
        let draft = self.store.get(draft_id)?;
        if draft.kind() != SnapshotKind::Draft {
            return Err(CoreError::invalid(format!(
                "snapshot {draft_id} is already published"
            )));
        }
        let missing = draft.missing_required();
        if !missing.is_empty() {
            return Err(CoreError::invalid(format!(
                "required keys have no value: {}",
                missing.join(", ")
            )));
        }

        let published = self.store.append(NewSnapshot {
            lineage: draft.lineage(),
            name: format!("Published: {}", draft.name()),
            description: draft.description().to_string(),
            kind: SnapshotKind::Published,
            origin: SnapshotOrigin::Published(draft_id),
            author: publisher.to_string(),
            items: draft.items().clone(),
            version: Some(draft.version().clone()),
        })?;

        info!(
            draft = draft_id.0,
            id = published.id().0,
            lineage = %published.lineage(),
            version = %published.version(),
            publisher,
            "snapshot published"
        );
        self.emit(LifecycleEvent::Published {
            draft,
            published: Arc::clone(&published),
        });
        Ok(published)
    }

    /// Creates a new draft holding a full copy of `target`.
    ///
    /// History is never rewritten; the copy gets the next version.
    pub fn rollback(
        &self,
        app_id: u64,
        env_id: u64,
        target: SnapshotId,
        author: &str,
    ) -> CoreResult<Arc<Snapshot>> {
        let lineage = Lineage::new(app_id, env_id);
        let target = self.store.get_in(lineage, target)?;

        let draft = self.store.append(NewSnapshot {
            lineage,
            name: format!("Rollback to {}", target.version()),
            description: format!("Copy of snapshot {} ({})", target.id(), target.name()),
            kind: SnapshotKind::Draft,
            origin: SnapshotOrigin::Rollback(target.id()),
            author: author.to_string(),
            items: target.items().clone(),
            version: None,
        })?;

        info!(
            target = target.id().0,
            id = draft.id().0,
            %lineage,
            version = %draft.version(),
            author,
            "rollback draft created"
        );
        self.emit(LifecycleEvent::RolledBack {
            target,
            draft: Arc::clone(&draft),
        });
        Ok(draft)
    }

    /// Compares two snapshots.
    pub fn diff(&self, left: SnapshotId, right: SnapshotId) -> CoreResult<SnapshotDiff> {
        self.store.diff(left, right)
    }

    /// Upserts a snapshot's items into the live store without deleting other keys.
    pub fn apply_to_live(&self, snapshot_id: SnapshotId, applied_by: &str) -> CoreResult<ApplyReport> {
        self.apply_with(snapshot_id, applied_by, ApplyMode::Additive)
    }

    /// Writes a snapshot into the live store using the given mode.
    pub fn apply_with(
        &self,
        snapshot_id: SnapshotId,
        applied_by: &str,
        mode: ApplyMode,
    ) -> CoreResult<ApplyReport> {
        let snapshot = self.store.get(snapshot_id)?;
        let report = self.live.apply(&snapshot, mode, applied_by)?;
        let live = self.live.load(snapshot.lineage())?;

        info!(
            id = snapshot_id.0,
            lineage = %snapshot.lineage(),
            version = %snapshot.version(),
            revision = report.revision,
            inserted = report.inserted.len(),
            updated = report.updated.len(),
            removed = report.removed.len(),
            ?mode,
            "snapshot applied to live store"
        );
        self.emit(LifecycleEvent::Applied {
            snapshot,
            report: report.clone(),
            live,
        });
        Ok(report)
    }

    /// Publishes a draft and applies the published copy to the live store.
    pub fn publish_and_apply(
        &self,
        draft_id: SnapshotId,
        publisher: &str,
    ) -> CoreResult<(Arc<Snapshot>, ApplyReport)> {
        let published = self.publish(draft_id, publisher)?;
        let report = self.apply_to_live(published.id(), publisher)?;
        debug!(id = published.id().0, revision = report.revision, "publish applied");
        Ok((published, report))
    }

    /// Reads the live configuration of a lineage.
    pub fn live_config(&self, lineage: Lineage) -> CoreResult<LiveConfig> {
        self.live.load(lineage)
    }

    /// Rebuilds the audit trail of a lineage.
    pub fn version_records(&self, lineage: Lineage) -> Vec<VersionRecord> {
        self.store.version_records(lineage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::MemoryLiveStore;
    use confsync_protocol::ConfigMap;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl LifecycleObserver for Recorder {
        fn on_event(&self, event: &LifecycleEvent) {
            let label = match event {
                LifecycleEvent::Drafted { .. } => "drafted".to_string(),
                LifecycleEvent::Published { .. } => "published".to_string(),
                LifecycleEvent::RolledBack { .. } => "rolled_back".to_string(),
                LifecycleEvent::Applied { .. } => {
                    format!("applied:{}", event.change_type().map_or("-", |c| c.as_str()))
                }
            };
            self.events.lock().push(label);
        }
    }

    fn lifecycle() -> (SnapshotLifecycle, Arc<Recorder>) {
        let lc = SnapshotLifecycle::new(
            Arc::new(SnapshotStore::default()),
            Arc::new(MemoryLiveStore::new()),
        );
        let recorder = Arc::new(Recorder::default());
        lc.subscribe(recorder.clone());
        (lc, recorder)
    }

    fn items(pairs: &[(&str, &str)]) -> Vec<ConfigItem> {
        pairs.iter().map(|(k, v)| ConfigItem::new(*k, *v)).collect()
    }

    #[test]
    fn publish_copies_draft_with_same_version() {
        let (lc, recorder) = lifecycle();
        let draft = lc
            .create_draft(1, 1, "base", "", items(&[("a", "1")]), "alice")
            .unwrap();
        let published = lc.publish(draft.id(), "bob").unwrap();

        assert_eq!(published.kind(), SnapshotKind::Published);
        assert_eq!(published.version(), draft.version());
        assert_eq!(published.origin(), SnapshotOrigin::Published(draft.id()));
        assert_eq!(published.name(), "Published: base");
        assert_eq!(published.created_by(), "bob");
        assert_eq!(published.digest(), draft.digest());
        assert_eq!(*recorder.events.lock(), vec!["drafted", "published"]);
    }

    #[test]
    fn publishing_twice_is_rejected() {
        let (lc, _) = lifecycle();
        let draft = lc
            .create_draft(1, 1, "base", "", items(&[("a", "1")]), "alice")
            .unwrap();
        let published = lc.publish(draft.id(), "bob").unwrap();
        assert!(matches!(
            lc.publish(published.id(), "bob"),
            Err(CoreError::InvalidSnapshot { .. })
        ));
    }

    #[test]
    fn publish_requires_required_values() {
        let (lc, _) = lifecycle();
        let draft = lc
            .create_draft(1, 1, "base", "", vec![ConfigItem::new("db.url", "").required()], "a")
            .unwrap();
        let err = lc.publish(draft.id(), "bob").unwrap_err();
        assert!(err.to_string().contains("db.url"));
    }

    #[test]
    fn rollback_creates_forward_copy() {
        let (lc, recorder) = lifecycle();
        let first = lc
            .create_draft(1, 1, "one", "", items(&[("a", "1")]), "alice")
            .unwrap();
        let second = lc
            .create_draft(1, 1, "two", "", items(&[("a", "2"), ("b", "x")]), "alice")
            .unwrap();
        let rollback = lc.rollback(1, 1, first.id(), "carol").unwrap();

        assert_eq!(rollback.kind(), SnapshotKind::Draft);
        assert_eq!(rollback.version().as_str(), "v1.0.2");
        assert_eq!(rollback.name(), "Rollback to v1.0.0");
        assert_eq!(rollback.origin(), SnapshotOrigin::Rollback(first.id()));
        assert!(lc.diff(first.id(), rollback.id()).unwrap().is_empty());
        assert_eq!(lc.diff(second.id(), rollback.id()).unwrap().changed_count(), 2);
        assert_eq!(lc.store().history(Lineage::new(1, 1)).len(), 3);
        assert_eq!(recorder.events.lock().last().unwrap(), "rolled_back");
    }

    #[test]
    fn rollback_rejects_foreign_lineage() {
        let (lc, _) = lifecycle();
        let other = lc
            .create_draft(2, 1, "x", "", items(&[("a", "1")]), "alice")
            .unwrap();
        assert!(matches!(
            lc.rollback(1, 1, other.id(), "carol"),
            Err(CoreError::LineageMismatch { .. })
        ));
    }

    #[test]
    fn apply_reports_change_type_from_origin() {
        let (lc, recorder) = lifecycle();
        let draft = lc
            .create_draft(1, 1, "one", "", items(&[("a", "1")]), "alice")
            .unwrap();
        let (published, report) = lc.publish_and_apply(draft.id(), "bob").unwrap();
        assert_eq!(report.revision, 1);

        let rollback = lc.rollback(1, 1, published.id(), "carol").unwrap();
        lc.apply_to_live(rollback.id(), "carol").unwrap();
        lc.apply_to_live(draft.id(), "dave").unwrap();

        let events = recorder.events.lock().clone();
        assert_eq!(
            events,
            vec![
                "drafted",
                "published",
                "applied:PUBLISH",
                "rolled_back",
                "applied:ROLLBACK",
                "applied:APPLY"
            ]
        );

        let live = lc.live_config(Lineage::new(1, 1)).unwrap();
        assert_eq!(live.revision, 3);
        let expected: ConfigMap = [("a".to_string(), "1".to_string())].into_iter().collect();
        assert_eq!(live.data, expected);
    }

    #[test]
    fn snapshot_content_never_changes() {
        let (lc, _) = lifecycle();
        let draft = lc
            .create_draft(1, 1, "one", "", items(&[("a", "1"), ("b", "2")]), "alice")
            .unwrap();
        let before = (draft.to_map(), *draft.digest());

        let next = lc
            .create_draft(1, 1, "two", "", items(&[("a", "9")]), "alice")
            .unwrap();
        lc.publish_and_apply(next.id(), "bob").unwrap();
        lc.rollback(1, 1, draft.id(), "carol").unwrap();

        let reread = lc.store().get(draft.id()).unwrap();
        assert_eq!((reread.to_map(), *reread.digest()), before);
        assert!(reread.verify_digest());
        assert!(lc.diff(draft.id(), draft.id()).unwrap().is_empty());
    }
}
