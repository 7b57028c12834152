//! Change notification.

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One key whose cached value changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    /// The key.
    pub key: String,
    /// Value before the refresh.
    pub old_value: Option<String>,
    /// Value after the refresh.
    pub new_value: Option<String>,
}

/// What triggered a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshSource {
    /// A pull, initial or polled.
    Pull,
    /// A pushed `CONFIG_UPDATE`.
    Push,
    /// The durable cache, at startup.
    Cache,
}

impl fmt::Display for RefreshSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RefreshSource::Pull => "pull",
            RefreshSource::Push => "push",
            RefreshSource::Cache => "cache",
        })
    }
}

/// Aggregate notification emitted once per refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshEvent {
    /// What triggered the refresh.
    pub source: RefreshSource,
    /// Revision now applied.
    pub revision: Option<u64>,
    /// Version now applied.
    pub version: Option<String>,
    /// Keys whose value changed.
    pub changes: Vec<ConfigChange>,
    /// Cache size after the refresh.
    pub size: usize,
}

impl RefreshEvent {
    /// Returns the changed keys.
    pub fn changed_keys(&self) -> Vec<&str> {
        self.changes.iter().map(|c| c.key.as_str()).collect()
    }

    /// Returns true if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Receives cache changes.
///
/// Callbacks run on the thread that applied the refresh, after the cache
/// has been swapped; they must not block for long.
pub trait ConfigListener: Send + Sync {
    /// Called once per changed key.
    fn on_change(&self, _change: &ConfigChange) {}

    /// Called once per refresh, after every `on_change`.
    fn on_refresh(&self, _event: &RefreshEvent) {}
}

/// Handle returned by `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub(crate) struct ListenerSet {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ConfigListener>)>>,
}

impl ListenerSet {
    pub(crate) fn add(&self, listener: Arc<dyn ConfigListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub(crate) fn dispatch(&self, event: &RefreshEvent) {
        let listeners: Vec<_> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in &listeners {
            for change in &event.changes {
                listener.on_change(change);
            }
            listener.on_refresh(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Log(Mutex<Vec<String>>);

    impl ConfigListener for Log {
        fn on_change(&self, change: &ConfigChange) {
            self.0.lock().push(format!("change:{}", change.key));
        }

        fn on_refresh(&self, event: &RefreshEvent) {
            self.0.lock().push(format!("refresh:{}", event.source));
        }
    }

    fn event() -> RefreshEvent {
        RefreshEvent {
            source: RefreshSource::Push,
            revision: Some(2),
            version: None,
            changes: vec![
                ConfigChange {
                    key: "a".into(),
                    old_value: None,
                    new_value: Some("1".into()),
                },
                ConfigChange {
                    key: "b".into(),
                    old_value: Some("x".into()),
                    new_value: Some("y".into()),
                },
            ],
            size: 2,
        }
    }

    #[test]
    fn dispatch_order_is_changes_then_refresh() {
        let set = ListenerSet::default();
        let log = Arc::new(Log::default());
        set.add(log.clone());
        set.dispatch(&event());
        assert_eq!(
            *log.0.lock(),
            vec!["change:a", "change:b", "refresh:push"]
        );
    }

    #[test]
    fn removed_listener_is_not_called() {
        let set = ListenerSet::default();
        let log = Arc::new(Log::default());
        let id = set.add(log.clone());
        assert!(set.remove(id));
        assert!(!set.remove(id));
        set.dispatch(&event());
        assert!(log.0.lock().is_empty());
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn changed_keys() {
        assert_eq!(event().changed_keys(), vec!["a", "b"]);
    }
}
