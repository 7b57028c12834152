//! Error types for the snapshot authority.

use crate::snapshot::{Lineage, SnapshotId};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the snapshot store, lifecycle and live store.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Another writer reserved the next version first, repeatedly.
    #[error("version conflict on {lineage} after {attempts} attempts")]
    VersionConflict {
        /// Lineage being written.
        lineage: Lineage,
        /// Reservation attempts made.
        attempts: u32,
    },

    /// Snapshot content was empty or malformed.
    #[error("invalid snapshot: {message}")]
    InvalidSnapshot {
        /// What was wrong.
        message: String,
    },

    /// No snapshot with that id exists.
    #[error("snapshot not found: {id}")]
    SnapshotNotFound {
        /// The id looked up.
        id: SnapshotId,
    },

    /// The snapshot belongs to a different application or environment.
    #[error("snapshot {id} does not belong to {expected}")]
    LineageMismatch {
        /// The snapshot.
        id: SnapshotId,
        /// Lineage the caller asked for.
        expected: Lineage,
    },

    /// The snapshot is referenced by a published copy and cannot be deleted.
    #[error("snapshot {id} is referenced by published snapshot {by}")]
    SnapshotInUse {
        /// The snapshot.
        id: SnapshotId,
        /// The published snapshot linking to it.
        by: SnapshotId,
    },

    /// The live configuration store rejected a read or write.
    #[error("live store error: {0}")]
    LiveStore(String),
}

impl CoreError {
    /// Creates an invalid-snapshot error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidSnapshot {
            message: message.into(),
        }
    }

    /// Returns true if retrying with fresh state may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::VersionConflict { .. })
    }
}
