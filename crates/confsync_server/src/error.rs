//! Error types for the configuration server.

use confsync_core::CoreError;
use confsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while handling requests.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No application or environment with the given codes.
    #[error("unknown application environment: {app_code}/{env_code}")]
    UnknownEnvironment {
        /// Application code.
        app_code: String,
        /// Environment code.
        env_code: String,
    },

    /// A message arrived for a connection the registry does not know.
    #[error("unknown connection: {0}")]
    UnknownConnection(String),

    /// Snapshot or live store failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Message could not be decoded or encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        match self {
            ServerError::InvalidRequest(_)
            | ServerError::UnknownEnvironment { .. }
            | ServerError::UnknownConnection(_)
            | ServerError::Protocol(_) => true,
            ServerError::Core(e) => !matches!(e, CoreError::LiveStore(_)),
        }
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Returns the HTTP-style status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::UnknownEnvironment { .. }
            | ServerError::UnknownConnection(_)
            | ServerError::Core(CoreError::SnapshotNotFound { .. }) => 404,
            ServerError::Core(CoreError::VersionConflict { .. }) => 409,
            _ if self.is_client_error() => 400,
            _ => 500,
        }
    }
}
