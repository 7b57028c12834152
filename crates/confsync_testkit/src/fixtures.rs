//! Server and client fixtures.
//!
//! [`TestServer`] runs a [`ConfigServer`] with one registered environment
//! and hands out clients wired to it in-process.

use crate::doubles::RecordingSleeper;
use crate::loopback::{ChannelPushChannel, ServerLoopback};
use confsync_client::{
    ClientConfig, ClientSyncEngine, HttpTransport, LoopbackClient, RetryConfig,
};
use confsync_core::{ConfigItem, ConfigMap, Snapshot};
use confsync_server::{ConfigServer, MemoryDirectory, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Application code of the fixture environment.
pub const APP_CODE: &str = "shop";
/// Environment code of the fixture environment.
pub const ENV_CODE: &str = "prod";
/// Application id of the fixture environment.
pub const APP_ID: u64 = 1;
/// Environment id of the fixture environment.
pub const ENV_ID: u64 = 2;

/// Loopback HTTP transport to a [`TestServer`].
pub type LoopbackTransport = HttpTransport<LoopbackClient<ServerLoopback>>;

/// Builds a map from string pairs.
pub fn config_map(pairs: &[(&str, &str)]) -> ConfigMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// An in-process server with `shop`/`prod` registered.
pub struct TestServer {
    server: Arc<ConfigServer>,
}

impl TestServer {
    /// Creates a server that pushes payloads and notifications on apply.
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Creates a server with a custom configuration.
    pub fn with_config(config: ServerConfig) -> Self {
        let directory = MemoryDirectory::new().with(APP_CODE, APP_ID, ENV_CODE, ENV_ID);
        Self {
            server: Arc::new(ConfigServer::new(config, Arc::new(directory))),
        }
    }

    /// Returns the shared server.
    pub fn server(&self) -> &Arc<ConfigServer> {
        &self.server
    }

    /// Publishes and applies a snapshot holding `pairs`.
    pub fn publish(&self, pairs: &[(&str, &str)]) -> Arc<Snapshot> {
        let items = ConfigItem::from_map(&config_map(pairs));
        let draft = self
            .server
            .lifecycle()
            .create_draft(APP_ID, ENV_ID, "fixture", "", items, "testkit")
            .expect("Failed to create draft");
        let (snapshot, _) = self
            .server
            .publish(draft.id(), "testkit")
            .expect("Failed to publish draft");
        snapshot
    }

    /// Returns a loopback HTTP transport.
    pub fn transport(&self) -> LoopbackTransport {
        HttpTransport::new(
            "http://config.test",
            LoopbackClient::new(ServerLoopback(Arc::clone(&self.server))),
        )
    }

    /// Opens a push channel.
    pub fn push_channel(&self) -> ChannelPushChannel {
        ChannelPushChannel::connect(Arc::clone(&self.server))
    }

    /// Returns a client configuration for the fixture environment.
    ///
    /// Polling is off and retries do not wait, so tests drive every sync.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new("http://config.test", APP_CODE, ENV_CODE)
            .with_ids(APP_ID, ENV_ID)
            .with_polling(false)
            .with_heartbeat_interval(Duration::from_millis(50))
            .with_retry(RetryConfig::default().with_max_retries(1))
    }

    /// Creates an engine over the loopback transport with a recording sleeper.
    pub fn client_engine(&self, config: ClientConfig) -> ClientSyncEngine {
        ClientSyncEngine::new(config, Arc::new(self.transport()))
            .expect("Failed to create client engine")
            .with_sleeper(RecordingSleeper::new())
    }
}

impl Default for TestServer {
    fn default() -> Self {
        Self::new()
    }
}

/// A temporary directory for durable cache files.
pub struct TempCacheDir {
    dir: TempDir,
}

impl TempCacheDir {
    /// Creates the directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Returns a path inside the directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

impl Default for TempCacheDir {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confsync_client::EngineState;

    #[test]
    fn published_values_reach_a_client() {
        let server = TestServer::new();
        server.publish(&[("a", "1"), ("b", "2")]);
        let engine = server.client_engine(server.client_config());
        assert_eq!(engine.initialize(), EngineState::Synced);
        assert_eq!(engine.get("b", None).as_deref(), Some("2"));
        assert_eq!(engine.cache().revision(), Some(1));
    }

    #[test]
    fn temp_cache_dir_paths() {
        let dir = TempCacheDir::new();
        assert!(dir.file("cache.json").ends_with("cache.json"));
    }
}
