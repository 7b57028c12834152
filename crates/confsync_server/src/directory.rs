//! Application and environment lookup.

use confsync_core::Lineage;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Resolves the codes clients use into numeric lineage ids.
pub trait EntityDirectory: Send + Sync {
    /// Resolves an application code and environment code.
    fn resolve(&self, app_code: &str, env_code: &str) -> Option<Lineage>;
}

/// In-memory [`EntityDirectory`].
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    entries: RwLock<HashMap<(String, String), Lineage>>,
}

impl MemoryDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an environment of an application.
    pub fn insert(&self, app_code: &str, app_id: u64, env_code: &str, env_id: u64) {
        self.entries.write().insert(
            (app_code.to_string(), env_code.to_string()),
            Lineage::new(app_id, env_id),
        );
    }

    /// Builder form of [`MemoryDirectory::insert`].
    pub fn with(self, app_code: &str, app_id: u64, env_code: &str, env_id: u64) -> Self {
        self.insert(app_code, app_id, env_code, env_id);
        self
    }
}

impl EntityDirectory for MemoryDirectory {
    fn resolve(&self, app_code: &str, env_code: &str) -> Option<Lineage> {
        self.entries
            .read()
            .get(&(app_code.to_string(), env_code.to_string()))
            .copied()
    }
}
