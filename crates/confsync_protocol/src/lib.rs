//! # confsync Protocol
//!
//! Wire types shared by the confsync server and its clients.
//!
//! This crate provides:
//! - `PushEnvelope` for server-initiated updates and change notifications
//! - `ClientMessage` for the registration handshake and heartbeats
//! - `PullRequest`, `PullResponse` and `VersionInfo` for client-initiated pulls
//! - Topic naming helpers
//! - JSON encoding/decoding
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod client;
mod envelope;
mod error;
mod pull;
mod topic;

pub use change::ChangeType;
pub use client::{ClientMessage, ClientRegistration, Disconnect, Heartbeat};
pub use envelope::{ChangeNotification, ConfigUpdate, PushEnvelope};
pub use error::{ProtocolError, ProtocolResult};
pub use pull::{PullRequest, PullResponse, VersionInfo, STATUS_NOT_FOUND, STATUS_OK};
pub use topic::Topic;

use std::collections::BTreeMap;

/// A flat configuration payload: key to string value, ordered by key.
pub type ConfigMap = BTreeMap<String, String>;

/// Milliseconds since the Unix epoch, as carried in envelope timestamps.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
