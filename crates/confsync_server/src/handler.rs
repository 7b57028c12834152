//! Request handlers for pull and push-channel endpoints.

use crate::config::ServerConfig;
use crate::directory::EntityDirectory;
use crate::error::{ServerError, ServerResult};
use crate::registry::{ConnectionId, PushRegistry};
use confsync_core::{Lineage, SnapshotLifecycle};
use confsync_protocol::{ClientMessage, PullRequest, PullResponse, VersionInfo};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared state for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Snapshot lifecycle (owns the store and the live store).
    pub lifecycle: Arc<SnapshotLifecycle>,
    /// Connected clients.
    pub registry: Arc<PushRegistry>,
    /// Application and environment lookup.
    pub directory: Arc<dyn EntityDirectory>,
}

impl HandlerContext {
    fn resolve(&self, request: &PullRequest) -> ServerResult<Lineage> {
        self.directory
            .resolve(&request.app_code, &request.env_code)
            .ok_or_else(|| ServerError::UnknownEnvironment {
                app_code: request.app_code.clone(),
                env_code: request.env_code.clone(),
            })
    }
}

/// A status code and JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    /// HTTP status.
    pub status: u16,
    /// JSON body.
    pub body: String,
}

/// Handler for client requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Returns the full live configuration of the requested environment.
    pub fn handle_pull(&self, request: &PullRequest) -> ServerResult<PullResponse> {
        let lineage = self.context.resolve(request)?;
        let live = self.context.lifecycle.live_config(lineage)?;
        debug!(
            app_code = %request.app_code,
            env_code = %request.env_code,
            revision = live.revision,
            keys = live.data.len(),
            "pull served"
        );
        Ok(PullResponse::ok(live.data)
            .with_revision(live.revision)
            .with_version(live.version.map(|v| v.to_string())))
    }

    /// Returns the live revision of the requested environment.
    pub fn handle_version(&self, request: &PullRequest) -> ServerResult<VersionInfo> {
        let lineage = self.context.resolve(request)?;
        let live = self.context.lifecycle.live_config(lineage)?;
        Ok(VersionInfo {
            revision: live.revision,
            version: live.version.map(|v| v.to_string()),
        })
    }

    /// Applies a message received on a push connection.
    pub fn handle_message(&self, connection_id: &ConnectionId, message: ClientMessage) -> ServerResult<()> {
        let registry = &self.context.registry;
        match message {
            ClientMessage::ClientRegistration(reg) => {
                registry.register(
                    connection_id.clone(),
                    reg.app_id,
                    reg.instance_id,
                    reg.instance_ip,
                    reg.client_version,
                );
                Ok(())
            }
            ClientMessage::Heartbeat(_) => {
                if registry.heartbeat(connection_id) {
                    Ok(())
                } else {
                    Err(ServerError::UnknownConnection(connection_id.to_string()))
                }
            }
            ClientMessage::Disconnect(_) => {
                registry.remove(connection_id);
                Ok(())
            }
        }
    }

    /// Routes a GET request to the pull or version endpoint.
    pub fn handle_get(&self, path: &str) -> HttpReply {
        let Some((request, version_only)) = PullRequest::from_path(path) else {
            return error_reply(&ServerError::InvalidRequest(format!("no route for {path}")));
        };

        let body = if version_only {
            self.handle_version(&request)
                .and_then(|v| v.encode().map_err(ServerError::from))
        } else {
            self.handle_pull(&request)
                .and_then(|r| r.encode().map_err(ServerError::from))
        };

        match body {
            Ok(body) => HttpReply { status: 200, body },
            Err(err) => {
                warn!(path, error = %err, "request failed");
                error_reply(&err)
            }
        }
    }
}

fn error_reply(err: &ServerError) -> HttpReply {
    let status = err.status_code();
    let body = PullResponse::error(status, err.to_string())
        .encode()
        .unwrap_or_else(|_| format!("{{\"code\":{status}}}"));
    HttpReply { status, body }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MemoryDirectory;
    use confsync_core::{ConfigItem, MemoryLiveStore, SnapshotStore};

    fn handler() -> (RequestHandler, Arc<HandlerContext>) {
        let lifecycle = Arc::new(SnapshotLifecycle::new(
            Arc::new(SnapshotStore::default()),
            Arc::new(MemoryLiveStore::new()),
        ));
        let context = Arc::new(HandlerContext {
            config: ServerConfig::default(),
            lifecycle,
            registry: Arc::new(PushRegistry::default()),
            directory: Arc::new(MemoryDirectory::new().with("shop", 1, "prod", 2)),
        });
        (RequestHandler::new(Arc::clone(&context)), context)
    }

    #[test]
    fn pull_of_unapplied_environment_is_empty() {
        let (handler, _) = handler();
        let resp = handler.handle_pull(&PullRequest::new("shop", "prod")).unwrap();
        assert!(resp.is_success());
        assert!(resp.data.is_empty());
        assert_eq!(resp.revision, Some(0));
    }

    #[test]
    fn pull_returns_live_data() {
        let (handler, ctx) = handler();
        let draft = ctx
            .lifecycle
            .create_draft(1, 2, "d", "", vec![ConfigItem::new("a", "1")], "alice")
            .unwrap();
        ctx.lifecycle.publish_and_apply(draft.id(), "alice").unwrap();

        let resp = handler.handle_pull(&PullRequest::new("shop", "prod")).unwrap();
        assert_eq!(resp.data.get("a").map(String::as_str), Some("1"));
        assert_eq!(resp.revision, Some(1));
        assert_eq!(resp.version.as_deref(), Some("v1.0.0"));

        let info = handler.handle_version(&PullRequest::new("shop", "prod")).unwrap();
        assert_eq!(info.revision, 1);
    }

    #[test]
    fn unknown_environment_is_404() {
        let (handler, _) = handler();
        let reply = handler.handle_get("/api/client/configs/shop/dev");
        assert_eq!(reply.status, 404);
        let body = PullResponse::decode(&reply.body).unwrap();
        assert_eq!(body.code, 404);
        assert!(!body.is_success());
    }

    #[test]
    fn unroutable_path_is_400() {
        let (handler, _) = handler();
        assert_eq!(handler.handle_get("/health").status, 400);
    }

    #[test]
    fn version_route() {
        let (handler, _) = handler();
        let reply = handler.handle_get("/api/client/configs/shop/prod/version");
        assert_eq!(reply.status, 200);
        assert_eq!(VersionInfo::decode(&reply.body).unwrap().revision, 0);
    }

    #[test]
    fn messages_drive_the_registry() {
        let (handler, ctx) = handler();
        let conn = ConnectionId::new("c1");

        let err = handler
            .handle_message(&conn, ClientMessage::heartbeat(1, "i-1"))
            .unwrap_err();
        assert!(matches!(err, ServerError::UnknownConnection(_)));

        handler
            .handle_message(&conn, ClientMessage::register(1, "i-1", "10.0.0.1", "1.0.0"))
            .unwrap();
        handler
            .handle_message(&conn, ClientMessage::heartbeat(1, "i-1"))
            .unwrap();
        assert_eq!(ctx.registry.online_clients(1).len(), 1);

        handler
            .handle_message(&conn, ClientMessage::disconnect("i-1"))
            .unwrap();
        assert!(ctx.registry.is_empty());
    }
}
