//! Client-to-server messages on the push channel.

use crate::error::{ProtocolError, ProtocolResult};
use crate::now_millis;
use serde::{Deserialize, Serialize};

/// A message a client sends over its push connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Handshake sent once after the connection opens.
    ClientRegistration(ClientRegistration),
    /// Liveness signal.
    Heartbeat(Heartbeat),
    /// Orderly goodbye.
    Disconnect(Disconnect),
}

/// Registration handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRegistration {
    /// Application the instance serves.
    pub app_id: u64,
    /// Stable identifier of the client instance.
    pub instance_id: String,
    /// Address the instance reports for itself.
    #[serde(default)]
    pub instance_ip: String,
    /// Client library version.
    #[serde(default)]
    pub client_version: String,
}

/// Heartbeat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    /// Application the instance serves.
    pub app_id: u64,
    /// Instance sending the heartbeat.
    pub instance_id: String,
    /// Send time in epoch milliseconds.
    pub timestamp: i64,
}

/// Disconnect message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disconnect {
    /// Instance leaving.
    pub instance_id: String,
}

impl ClientMessage {
    /// Creates a registration handshake.
    pub fn register(
        app_id: u64,
        instance_id: impl Into<String>,
        instance_ip: impl Into<String>,
        client_version: impl Into<String>,
    ) -> Self {
        ClientMessage::ClientRegistration(ClientRegistration {
            app_id,
            instance_id: instance_id.into(),
            instance_ip: instance_ip.into(),
            client_version: client_version.into(),
        })
    }

    /// Creates a heartbeat stamped with the current time.
    pub fn heartbeat(app_id: u64, instance_id: impl Into<String>) -> Self {
        ClientMessage::Heartbeat(Heartbeat {
            app_id,
            instance_id: instance_id.into(),
            timestamp: now_millis(),
        })
    }

    /// Creates a disconnect message.
    pub fn disconnect(instance_id: impl Into<String>) -> Self {
        ClientMessage::Disconnect(Disconnect {
            instance_id: instance_id.into(),
        })
    }

    /// Returns the wire tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            ClientMessage::ClientRegistration(_) => "CLIENT_REGISTRATION",
            ClientMessage::Heartbeat(_) => "HEARTBEAT",
            ClientMessage::Disconnect(_) => "DISCONNECT",
        }
    }

    /// Returns the sending instance.
    pub fn instance_id(&self) -> &str {
        match self {
            ClientMessage::ClientRegistration(r) => &r.instance_id,
            ClientMessage::Heartbeat(h) => &h.instance_id,
            ClientMessage::Disconnect(d) => &d.instance_id,
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
