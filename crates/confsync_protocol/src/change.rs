//! Change classification carried by notifications.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a new configuration version exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    /// A draft was promoted and applied.
    Publish,
    /// A historical snapshot was copied forward and applied.
    Rollback,
    /// A snapshot was applied to the live store without a promotion.
    Apply,
}

impl ChangeType {
    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Publish => "PUBLISH",
            ChangeType::Rollback => "ROLLBACK",
            ChangeType::Apply => "APPLY",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
