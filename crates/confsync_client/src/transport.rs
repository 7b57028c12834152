//! Pull transport abstraction.

use crate::error::{ClientError, ClientResult};
use confsync_protocol::{PullRequest, PullResponse, VersionInfo};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Fetches configuration from the server.
///
/// This trait abstracts the network layer so the engine can run over HTTP,
/// an in-process loopback, or a mock.
pub trait ConfigTransport: Send + Sync {
    /// Fetches the full configuration of one environment.
    ///
    /// A response with a non-success code is returned as-is; the engine
    /// decides what it means.
    fn fetch(&self, request: &PullRequest) -> ClientResult<PullResponse>;

    /// Asks the server for its current revision.
    ///
    /// `Ok(None)` means version checks are unavailable and the caller must
    /// fall back to a full pull.
    fn check_version(&self, _request: &PullRequest) -> ClientResult<Option<VersionInfo>> {
        Ok(None)
    }
}

/// A transport returning canned responses.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    response: Mutex<Option<PullResponse>>,
    version: Mutex<Option<VersionInfo>>,
    fetches: AtomicU64,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates a connected transport with no response set.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            response: Mutex::new(None),
            version: Mutex::new(None),
            fetches: AtomicU64::new(0),
        }
    }

    /// Sets the pull response.
    pub fn set_response(&self, response: PullResponse) {
        *self.response.lock() = Some(response);
    }

    /// Sets the version check response.
    pub fn set_version(&self, version: Option<VersionInfo>) {
        *self.version.lock() = version;
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns how many fetches were attempted.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ConfigTransport for MockTransport {
    fn fetch(&self, _request: &PullRequest) -> ClientResult<PullResponse> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ClientError::transport("not connected"));
        }
        self.response
            .lock()
            .clone()
            .ok_or_else(|| ClientError::transport("no mock response set"))
    }

    fn check_version(&self, _request: &PullRequest) -> ClientResult<Option<VersionInfo>> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ClientError::transport("not connected"));
        }
        Ok(self.version.lock().clone())
    }
}
