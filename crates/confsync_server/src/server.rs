//! The configuration server context object.

use crate::bridge::PushOnApply;
use crate::config::ServerConfig;
use crate::directory::EntityDirectory;
use crate::error::ServerResult;
use crate::handler::{HandlerContext, HttpReply, RequestHandler};
use crate::registry::{ConnectionId, PushRegistry};
use crate::sink::PushSink;
use confsync_core::{
    ApplyReport, LiveConfigStore, MemoryLiveStore, Snapshot, SnapshotId, SnapshotLifecycle,
    SnapshotStore,
};
use confsync_protocol::{ClientMessage, PullRequest, PullResponse, VersionInfo};
use std::sync::Arc;
use tracing::{debug, info};

/// Owns one snapshot store, lifecycle, live store and push registry.
///
/// Transports call into the server on their own threads:
/// - `handle_get` for the pull and version endpoints
/// - `accept`, `handle_message` and `close` for push connections
///
/// ```
/// use confsync_server::{ConfigServer, MemoryDirectory, ServerConfig};
/// use std::sync::Arc;
///
/// let directory = Arc::new(MemoryDirectory::new().with("shop", 1, "prod", 1));
/// let server = ConfigServer::new(ServerConfig::default(), directory);
/// let reply = server.handle_get("/api/client/configs/shop/prod");
/// assert_eq!(reply.status, 200);
/// ```
pub struct ConfigServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl ConfigServer {
    /// Creates a server with an in-memory live store.
    pub fn new(config: ServerConfig, directory: Arc<dyn EntityDirectory>) -> Self {
        Self::with_live_store(config, directory, Arc::new(MemoryLiveStore::new()))
    }

    /// Creates a server over an existing live store.
    pub fn with_live_store(
        config: ServerConfig,
        directory: Arc<dyn EntityDirectory>,
        live: Arc<dyn LiveConfigStore>,
    ) -> Self {
        let store = Arc::new(SnapshotStore::new(config.store.clone()));
        let lifecycle = Arc::new(SnapshotLifecycle::new(store, live));
        let registry = Arc::new(PushRegistry::new(config.heartbeat_timeout));

        if config.push_on_apply || config.notify_on_apply {
            lifecycle.subscribe(Arc::new(
                PushOnApply::new(Arc::clone(&registry))
                    .with_payload(config.push_on_apply)
                    .with_notification(config.notify_on_apply),
            ));
        }

        let context = Arc::new(HandlerContext {
            config,
            lifecycle,
            registry,
            directory,
        });
        let handler = RequestHandler::new(Arc::clone(&context));
        Self { handler, context }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Returns the snapshot lifecycle.
    pub fn lifecycle(&self) -> &Arc<SnapshotLifecycle> {
        &self.context.lifecycle
    }

    /// Returns the snapshot store.
    pub fn store(&self) -> &Arc<SnapshotStore> {
        self.context.lifecycle.store()
    }

    /// Returns the push registry.
    pub fn registry(&self) -> &Arc<PushRegistry> {
        &self.context.registry
    }

    /// Publishes a draft and applies it, which pushes it to connected clients.
    pub fn publish(&self, draft_id: SnapshotId, publisher: &str) -> ServerResult<(Arc<Snapshot>, ApplyReport)> {
        Ok(self.context.lifecycle.publish_and_apply(draft_id, publisher)?)
    }

    /// Rolls back to `target` and applies the new draft.
    pub fn rollback_and_apply(
        &self,
        app_id: u64,
        env_id: u64,
        target: SnapshotId,
        author: &str,
    ) -> ServerResult<(Arc<Snapshot>, ApplyReport)> {
        let draft = self.context.lifecycle.rollback(app_id, env_id, target, author)?;
        let report = self.context.lifecycle.apply_to_live(draft.id(), author)?;
        Ok((draft, report))
    }

    /// Accepts a push connection and returns its id.
    pub fn accept(&self, sink: Arc<dyn PushSink>) -> ConnectionId {
        let id = ConnectionId::random();
        self.context.registry.attach(id.clone(), sink);
        debug!(connection_id = %id, "push connection accepted");
        id
    }

    /// Decodes and applies a JSON message from a push connection.
    pub fn handle_message(&self, connection_id: &ConnectionId, json: &str) -> ServerResult<()> {
        let message = ClientMessage::decode(json)?;
        self.handler.handle_message(connection_id, message)
    }

    /// Applies a decoded message from a push connection.
    pub fn handle_client_message(&self, connection_id: &ConnectionId, message: ClientMessage) -> ServerResult<()> {
        self.handler.handle_message(connection_id, message)
    }

    /// Closes a push connection.
    pub fn close(&self, connection_id: &ConnectionId) {
        if self.context.registry.remove(connection_id).is_none() {
            info!(connection_id = %connection_id, "closed connection was never registered");
        }
    }

    /// Handles a pull request.
    pub fn handle_pull(&self, request: &PullRequest) -> ServerResult<PullResponse> {
        self.handler.handle_pull(request)
    }

    /// Handles a version check.
    pub fn handle_version(&self, request: &PullRequest) -> ServerResult<VersionInfo> {
        self.handler.handle_version(request)
    }

    /// Routes a GET path.
    pub fn handle_get(&self, path: &str) -> HttpReply {
        self.handler.handle_get(path)
    }
}
