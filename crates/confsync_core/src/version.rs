//! Snapshot version numbers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A snapshot version label such as `v1.4.2`.
///
/// Well-formed labels are `v` followed by three dot-separated integers. A
/// lineage whose latest label does not parse continues with a timestamp label
/// (`vYYYYMMDDHHMMSSmmm`) so that assignment still succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionNumber(String);

impl VersionNumber {
    /// The first version of every lineage.
    pub fn initial() -> Self {
        Self("v1.0.0".to_string())
    }

    /// Wraps a label without validating it.
    pub fn from_label(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Builds a label from semantic components.
    pub fn semantic(major: u64, minor: u64, patch: u64) -> Self {
        Self(format!("v{major}.{minor}.{patch}"))
    }

    /// Builds a timestamp-derived label.
    pub fn timestamp(at: DateTime<Utc>) -> Self {
        Self(format!("v{}", at.format("%Y%m%d%H%M%S%3f")))
    }

    /// Returns the label.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses `vMAJOR.MINOR.PATCH`.
    pub fn components(&self) -> Option<(u64, u64, u64)> {
        let rest = self.0.strip_prefix('v')?;
        let mut parts = rest.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some((major, minor, patch))
    }

    /// Returns true when the label parses as `vMAJOR.MINOR.PATCH`.
    pub fn is_semantic(&self) -> bool {
        self.components().is_some()
    }

    /// Computes the label that follows `latest`.
    ///
    /// No history yields `v1.0.0`; a semantic label bumps its patch; anything
    /// else falls back to a timestamp label taken at `now`.
    pub fn next_after(latest: Option<&VersionNumber>, now: DateTime<Utc>) -> Self {
        match latest {
            None => Self::initial(),
            Some(v) => match v.components() {
                Some((major, minor, patch)) => match patch.checked_add(1) {
                    Some(next) => Self::semantic(major, minor, next),
                    None => Self::timestamp(now),
                },
                None => Self::timestamp(now),
            },
        }
    }

    /// Appends a disambiguating suffix.
    pub(crate) fn with_suffix(&self, n: u32) -> Self {
        Self(format!("{}-{n}", self.0))
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VersionNumber {
    fn from(label: &str) -> Self {
        Self(label.to_string())
    }
}
