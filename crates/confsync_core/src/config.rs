//! Snapshot store configuration.

/// Configuration for a [`crate::SnapshotStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How many times a version reservation is retried after losing a race.
    pub max_version_attempts: u32,

    /// Maximum length of a configuration key.
    pub max_key_len: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_version_attempts: 8,
            max_key_len: 128,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the reservation attempt limit. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_version_attempts(mut self, attempts: u32) -> Self {
        self.max_version_attempts = attempts.max(1);
        self
    }

    /// Sets the maximum key length.
    #[must_use]
    pub fn with_max_key_len(mut self, len: usize) -> Self {
        self.max_key_len = len;
        self
    }
}
