//! Lifecycle events as push triggers.

use crate::registry::PushRegistry;
use confsync_core::{LifecycleEvent, LifecycleObserver};
use std::sync::Arc;
use tracing::debug;

/// Pushes live configuration to clients whenever a snapshot is applied.
///
/// An `Applied` event produces a `CONFIG_UPDATE` carrying the full live set
/// of the lineage and a `CONFIG_CHANGE_NOTIFICATION` naming the version.
/// Drafts, publishes and rollbacks that are not applied push nothing.
pub struct PushOnApply {
    registry: Arc<PushRegistry>,
    push_payload: bool,
    notify: bool,
}

impl PushOnApply {
    /// Creates a bridge that sends both the payload and the notification.
    pub fn new(registry: Arc<PushRegistry>) -> Self {
        Self {
            registry,
            push_payload: true,
            notify: true,
        }
    }

    /// Enables or disables the payload push.
    pub fn with_payload(mut self, enabled: bool) -> Self {
        self.push_payload = enabled;
        self
    }

    /// Enables or disables the change notification.
    pub fn with_notification(mut self, enabled: bool) -> Self {
        self.notify = enabled;
        self
    }
}

impl LifecycleObserver for PushOnApply {
    fn on_event(&self, event: &LifecycleEvent) {
        let LifecycleEvent::Applied { snapshot, live, .. } = event else {
            return;
        };
        let lineage = live.lineage;
        let version = snapshot.version().as_str();

        if self.push_payload {
            self.registry.push_snapshot(
                lineage.app_id,
                lineage.env_id,
                live.data.clone(),
                Some(live.revision),
                Some(version),
            );
        }
        if self.notify {
            if let Some(change_type) = event.change_type() {
                self.registry.push_change_notification(
                    lineage.app_id,
                    lineage.env_id,
                    version,
                    change_type,
                    Some(live.revision),
                );
            }
        }
        debug!(%lineage, version, revision = live.revision, "apply pushed to clients");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionId;
    use crate::sink::ChannelSink;
    use confsync_core::{
        ConfigItem, MemoryLiveStore, SnapshotLifecycle, SnapshotStore,
    };
    use confsync_protocol::{ChangeType, PushEnvelope};

    #[test]
    fn apply_pushes_update_then_notification() {
        let registry = Arc::new(PushRegistry::default());
        let conn = ConnectionId::new("c1");
        let (sink, rx) = ChannelSink::pair();
        registry.attach(conn.clone(), Arc::new(sink));
        registry.register(conn, 1, "i-1", "", "");

        let lc = SnapshotLifecycle::new(
            Arc::new(SnapshotStore::default()),
            Arc::new(MemoryLiveStore::new()),
        );
        lc.subscribe(Arc::new(PushOnApply::new(Arc::clone(&registry))));

        let draft = lc
            .create_draft(1, 2, "d", "", vec![ConfigItem::new("a", "1")], "alice")
            .unwrap();
        assert!(rx.try_recv().is_err());

        lc.publish_and_apply(draft.id(), "alice").unwrap();

        match rx.try_recv().unwrap() {
            PushEnvelope::ConfigUpdate(u) => {
                assert_eq!((u.app_id, u.env_id), (1, 2));
                assert_eq!(u.config_data.get("a").map(String::as_str), Some("1"));
                assert_eq!(u.revision, Some(1));
            }
            other => panic!("unexpected {other:?}"),
        }
        match rx.try_recv().unwrap() {
            PushEnvelope::ConfigChangeNotification(n) => {
                assert_eq!(n.version_number, "v1.0.0");
                assert_eq!(n.change_type, ChangeType::Publish);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn notification_only_mode() {
        let registry = Arc::new(PushRegistry::default());
        let conn = ConnectionId::new("c1");
        let (sink, rx) = ChannelSink::pair();
        registry.attach(conn.clone(), Arc::new(sink));
        registry.register(conn, 1, "i-1", "", "");

        let lc = SnapshotLifecycle::new(
            Arc::new(SnapshotStore::default()),
            Arc::new(MemoryLiveStore::new()),
        );
        lc.subscribe(Arc::new(
            PushOnApply::new(Arc::clone(&registry)).with_payload(false),
        ));
        let draft = lc
            .create_draft(1, 1, "d", "", vec![ConfigItem::new("a", "1")], "alice")
            .unwrap();
        lc.apply_to_live(draft.id(), "alice").unwrap();

        assert!(matches!(
            rx.try_recv().unwrap(),
            PushEnvelope::ConfigChangeNotification(_)
        ));
        assert!(rx.try_recv().is_err());
    }
}
