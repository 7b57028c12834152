//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait so any library (or an
//! in-process loopback) can carry the requests.

use crate::error::{ClientError, ClientResult, PullFailure};
use crate::transport::ConfigTransport;
use confsync_protocol::{PullRequest, PullResponse, VersionInfo, STATUS_NOT_FOUND, STATUS_OK};
use parking_lot::RwLock;
use tracing::debug;

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: String,
}

/// HTTP client abstraction.
pub trait HttpClient: Send + Sync {
    /// Sends a GET request.
    ///
    /// `Err` means no response was received at all.
    fn get(&self, url: &str) -> Result<HttpResponse, String>;
}

/// HTTP-based pull transport.
///
/// Bodies are JSON.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport for a server base URL (e.g. `http://config:8080`).
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last transport error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn get(&self, path: &str) -> ClientResult<HttpResponse> {
        let url = format!("{}{}", self.base_url, path);
        match self.client.get(&url) {
            Ok(response) => {
                *self.last_error.write() = None;
                Ok(response)
            }
            Err(e) => {
                *self.last_error.write() = Some(e.clone());
                Err(ClientError::transport(e))
            }
        }
    }
}

impl<C: HttpClient> ConfigTransport for HttpTransport<C> {
    fn fetch(&self, request: &PullRequest) -> ClientResult<PullResponse> {
        let reply = self.get(&request.path())?;
        if reply.status != STATUS_OK {
            let message = PullResponse::decode(&reply.body)
                .map(|response| response.message)
                .unwrap_or(reply.body);
            return Err(ClientError::status(reply.status, message));
        }
        PullResponse::decode(&reply.body).map_err(|e| PullFailure::Decode(e.to_string()).into())
    }

    fn check_version(&self, request: &PullRequest) -> ClientResult<Option<VersionInfo>> {
        let reply = self.get(&request.version_path())?;
        if reply.status == STATUS_NOT_FOUND {
            debug!(path = %request.version_path(), "version endpoint unavailable");
            return Ok(None);
        }
        if reply.status != STATUS_OK {
            return Err(ClientError::status(reply.status, reply.body));
        }
        VersionInfo::decode(&reply.body)
            .map(Some)
            .map_err(|e| PullFailure::Decode(e.to_string()).into())
    }
}

/// Trait for servers that can answer loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles a GET for `path` and returns status and body.
    fn handle_get(&self, path: &str) -> HttpResponse;
}

/// An HTTP client that routes requests directly to an in-process server.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a client connected to `server`.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    fn get(&self, url: &str) -> Result<HttpResponse, String> {
        let path = url.find("/api/").map(|i| &url[i..]).unwrap_or(url);
        Ok(self.server.handle_get(path))
    }
}
