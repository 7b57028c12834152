//! Server configuration.

use confsync_core::StoreConfig;
use std::time::Duration;

/// Configuration for a [`crate::ConfigServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// How long a registration stays live without a heartbeat.
    pub heartbeat_timeout: Duration,
    /// Push the full live payload after every apply.
    pub push_on_apply: bool,
    /// Send a change notification after every apply.
    pub notify_on_apply: bool,
    /// Snapshot store settings.
    pub store: StoreConfig,
}

impl ServerConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(90),
            push_on_apply: true,
            notify_on_apply: true,
            store: StoreConfig::default(),
        }
    }

    /// Sets the heartbeat timeout.
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Enables or disables payload pushes after apply.
    pub fn with_push_on_apply(mut self, enabled: bool) -> Self {
        self.push_on_apply = enabled;
        self
    }

    /// Enables or disables change notifications after apply.
    pub fn with_notify_on_apply(mut self, enabled: bool) -> Self {
        self.notify_on_apply = enabled;
        self
    }

    /// Sets the snapshot store configuration.
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
