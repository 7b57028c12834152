//! Server-to-client push envelopes.

use crate::change::ChangeType;
use crate::error::{ProtocolError, ProtocolResult};
use crate::{now_millis, ConfigMap};
use serde::{Deserialize, Serialize};

/// A message delivered over a push channel.
///
/// The JSON form carries a `type` tag of `CONFIG_UPDATE` or
/// `CONFIG_CHANGE_NOTIFICATION` next to the variant's fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PushEnvelope {
    /// Full configuration payload for an application environment.
    ConfigUpdate(ConfigUpdate),
    /// A new version exists; no payload attached.
    ConfigChangeNotification(ChangeNotification),
}

/// Payload of a `CONFIG_UPDATE` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    /// Application the payload belongs to.
    pub app_id: u64,
    /// Environment the payload belongs to.
    pub env_id: u64,
    /// Key-value payload.
    pub config_data: ConfigMap,
    /// Live-store revision that produced the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
    /// Version number of the snapshot that produced the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_number: Option<String>,
    /// Send time in epoch milliseconds.
    pub timestamp: i64,
}

/// Payload of a `CONFIG_CHANGE_NOTIFICATION` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    /// Application that changed.
    pub app_id: u64,
    /// Environment that changed.
    pub env_id: u64,
    /// The new version number.
    pub version_number: String,
    /// What kind of change produced the version.
    pub change_type: ChangeType,
    /// Live-store revision after the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
    /// Send time in epoch milliseconds.
    pub timestamp: i64,
}

impl PushEnvelope {
    /// Creates a `CONFIG_UPDATE` envelope stamped with the current time.
    pub fn update(app_id: u64, env_id: u64, config_data: ConfigMap) -> Self {
        PushEnvelope::ConfigUpdate(ConfigUpdate {
            app_id,
            env_id,
            config_data,
            revision: None,
            version_number: None,
            timestamp: now_millis(),
        })
    }

    /// Creates a `CONFIG_CHANGE_NOTIFICATION` envelope stamped with the current time.
    pub fn notification(
        app_id: u64,
        env_id: u64,
        version_number: impl Into<String>,
        change_type: ChangeType,
    ) -> Self {
        PushEnvelope::ConfigChangeNotification(ChangeNotification {
            app_id,
            env_id,
            version_number: version_number.into(),
            change_type,
            revision: None,
            timestamp: now_millis(),
        })
    }

    /// Attaches the live-store revision.
    pub fn with_revision(mut self, revision: u64) -> Self {
        match &mut self {
            PushEnvelope::ConfigUpdate(u) => u.revision = Some(revision),
            PushEnvelope::ConfigChangeNotification(n) => n.revision = Some(revision),
        }
        self
    }

    /// Attaches the snapshot version to an update. Notifications already carry one.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        if let PushEnvelope::ConfigUpdate(u) = &mut self {
            u.version_number = Some(version.into());
        }
        self
    }

    /// Returns the wire tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            PushEnvelope::ConfigUpdate(_) => "CONFIG_UPDATE",
            PushEnvelope::ConfigChangeNotification(_) => "CONFIG_CHANGE_NOTIFICATION",
        }
    }

    /// Returns the application id.
    pub fn app_id(&self) -> u64 {
        match self {
            PushEnvelope::ConfigUpdate(u) => u.app_id,
            PushEnvelope::ConfigChangeNotification(n) => n.app_id,
        }
    }

    /// Returns the environment id.
    pub fn env_id(&self) -> u64 {
        match self {
            PushEnvelope::ConfigUpdate(u) => u.env_id,
            PushEnvelope::ConfigChangeNotification(n) => n.env_id,
        }
    }

    /// Returns the live-store revision, when the sender attached one.
    pub fn revision(&self) -> Option<u64> {
        match self {
            PushEnvelope::ConfigUpdate(u) => u.revision,
            PushEnvelope::ConfigChangeNotification(n) => n.revision,
        }
    }

    /// Returns the send time in epoch milliseconds.
    pub fn timestamp(&self) -> i64 {
        match self {
            PushEnvelope::ConfigUpdate(u) => u.timestamp,
            PushEnvelope::ConfigChangeNotification(n) => n.timestamp,
        }
    }

    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Decodes from JSON.
    pub fn decode(json: &str) -> ProtocolResult<Self> {
        serde_json::from_str(json).map_err(ProtocolError::from_decode)
    }
}
