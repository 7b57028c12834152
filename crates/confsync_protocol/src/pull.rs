//! Pull endpoint request and response types.

use crate::error::{ProtocolError, ProtocolResult};
use crate::ConfigMap;
use serde::{Deserialize, Serialize};

/// Status code of a successful response.
pub const STATUS_OK: u16 = 200;
/// Status code when the application or environment is unknown.
pub const STATUS_NOT_FOUND: u16 = 404;

/// A client-initiated fetch of the full configuration of one environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// Application code.
    pub app_code: String,
    /// Environment code.
    pub env_code: String,
}

impl PullRequest {
    /// Creates a new pull request.
    pub fn new(app_code: impl Into<String>, env_code: impl Into<String>) -> Self {
        Self {
            app_code: app_code.into(),
            env_code: env_code.into(),
        }
    }

    /// Returns the pull endpoint path.
    pub fn path(&self) -> String {
        format!("/api/client/configs/{}/{}", self.app_code, self.env_code)
    }

    /// Returns the version check endpoint path.
    pub fn version_path(&self) -> String {
        format!("{}/version", self.path())
    }

    /// Parses a pull or version-check path.
    ///
    /// Returns the request and whether the path targets the version endpoint.
    pub fn from_path(path: &str) -> Option<(Self, bool)> {
        let rest = path.strip_prefix("/api/client/configs/")?;
        let parts: Vec<&str> = rest.trim_end_matches('/').split('/').collect();
        match parts.as_slice() {
            [app, env] if !app.is_empty() && !env.is_empty() => Some((Self::new(*app, *env), false)),
            [app, env, "version"] if !app.is_empty() && !env.is_empty() => {
                Some((Self::new(*app, *env), true))
            }
            _ => None,
        }
    }
}

/// Response of the pull endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// Status code; anything other than 200 is a failure.
    pub code: u16,
    /// Human-readable status.
    #[serde(default)]
    pub message: String,
    /// Full key-value set.
    #[serde(default)]
    pub data: ConfigMap,
    /// Live-store revision the data was read at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
    /// Version number of the last applied snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl PullResponse {
    /// Creates a successful response.
    pub fn ok(data: ConfigMap) -> Self {
        Self {
            code: STATUS_OK,
            message: "success".to_string(),
            data,
            revision: None,
            version: None,
        }
    }

    /// Creates a failure response.
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: ConfigMap::new(),
            revision: None,
            version: None,
        }
    }

    /// Sets the revision.
    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = Some(revision);
        self
    }

    /// Sets the version.
    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    /// Returns true for a 200 response.
    pub fn is_success(&self) -> bool {
        self.code == STATUS_OK
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

/// Response of the version check endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    /// Current live-store revision.
    pub revision: u64,
    /// Version number of the last applied snapshot.
    #[serde(default)]
    pub version: Option<String>,
}

impl VersionInfo {
    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Decodes from JSON.
    pub fn decode(json: &str) -> ProtocolResult<Self> {
        serde_json::from_str(json).map_err(ProtocolError::from_decode)
    }
}
