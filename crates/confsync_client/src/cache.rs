//! In-memory configuration cache.

use crate::listener::ConfigChange;
use crate::store::CacheRecord;
use chrono::{DateTime, TimeZone, Utc};
use confsync_protocol::ConfigMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// One immutable generation of the cache.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheState {
    data: ConfigMap,
    revision: Option<u64>,
    version: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

impl CacheState {
    /// Returns the key-value data.
    pub fn data(&self) -> &ConfigMap {
        &self.data
    }

    /// Returns a value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// Returns the last applied server revision.
    pub fn revision(&self) -> Option<u64> {
        self.revision
    }

    /// Returns the last applied version number.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Returns when the data was last refreshed.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Returns the number of keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if no key is cached.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if the data is older than `ttl`, or was never refreshed.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        match self.updated_at {
            Some(at) => chrono::Duration::from_std(ttl)
                .map(|ttl| Utc::now() - at > ttl)
                .unwrap_or(false),
            None => true,
        }
    }

    /// Merges a payload into a new generation.
    ///
    /// Payload keys overwrite, keys absent from the payload are kept.
    /// Returns the new generation and the keys whose value changed.
    pub(crate) fn merge(
        &self,
        payload: &ConfigMap,
        revision: Option<u64>,
        version: Option<String>,
        now: DateTime<Utc>,
    ) -> (CacheState, Vec<ConfigChange>) {
        let mut data = self.data.clone();
        let mut changes = Vec::new();
        for (key, value) in payload {
            let old = data.insert(key.clone(), value.clone());
            if old.as_deref() != Some(value.as_str()) {
                changes.push(ConfigChange {
                    key: key.clone(),
                    old_value: old,
                    new_value: Some(value.clone()),
                });
            }
        }

        let next = CacheState {
            data,
            revision: revision.or(self.revision),
            version: version.or_else(|| self.version.clone()),
            updated_at: Some(now),
        };
        (next, changes)
    }

    /// Converts into a durable record.
    pub fn to_record(&self) -> CacheRecord {
        CacheRecord {
            configs: self.data.clone(),
            last_update_time: self.updated_at.map(|at| at.timestamp_millis()),
            version: self.version.clone(),
            revision: self.revision,
        }
    }

    /// Builds a generation from a durable record.
    pub fn from_record(record: CacheRecord) -> Self {
        Self {
            data: record.configs,
            revision: record.revision,
            version: record.version,
            updated_at: record
                .last_update_time
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        }
    }
}

/// The live cache: readers take a reference to the current generation,
/// the engine swaps in a new one.
#[derive(Debug, Default)]
pub struct ConfigCache {
    current: RwLock<Arc<CacheState>>,
}

impl ConfigCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current generation.
    pub fn snapshot(&self) -> Arc<CacheState> {
        self.current.read().clone()
    }

    /// Returns a value.
    pub fn get(&self, key: &str) -> Option<String> {
        self.current.read().get(key).map(str::to_string)
    }

    /// Returns true if the key is cached.
    pub fn contains(&self, key: &str) -> bool {
        self.current.read().data.contains_key(key)
    }

    /// Returns the number of keys.
    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    /// Returns true if no key is cached.
    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }

    /// Returns the last applied revision.
    pub fn revision(&self) -> Option<u64> {
        self.current.read().revision
    }

    /// Replaces the current generation and returns the previous one.
    pub(crate) fn replace(&self, next: CacheState) -> Arc<CacheState> {
        std::mem::replace(&mut *self.current.write(), Arc::new(next))
    }
}
