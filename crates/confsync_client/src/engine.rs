//! Client sync engine.

use crate::binding::ValueSource;
use crate::cache::{CacheState, ConfigCache};
use crate::coerce::ConfigType;
use crate::config::ClientConfig;
use crate::error::{BindingResult, ClientError, ClientResult};
use crate::fallback::FallbackTable;
use crate::listener::{ConfigListener, ListenerId, ListenerSet, RefreshEvent, RefreshSource};
use crate::retry::{RetryOutcome, RetryPolicy, Sleeper};
use crate::store::{CacheRecord, CacheStore, FileCacheStore};
use crate::transport::ConfigTransport;
use chrono::Utc;
use confsync_protocol::{ConfigMap, PullResponse, PushEnvelope};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// `initialize` has not run.
    Uninitialized,
    /// Serving data loaded from the durable cache; no pull has succeeded yet.
    Warm,
    /// Nothing loaded and no pull has succeeded yet.
    Empty,
    /// At least one pull has succeeded.
    Synced,
}

impl EngineState {
    /// Returns true if the cache holds server data.
    pub fn has_data(&self) -> bool {
        matches!(self, EngineState::Warm | EngineState::Synced)
    }
}

/// Counters for observability.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Pull attempts, retries included.
    pub pulls_attempted: u64,
    /// Successful pull attempts.
    pub pulls_succeeded: u64,
    /// Failed pull attempts.
    pub pulls_failed: u64,
    /// Retries after a failed attempt.
    pub retries: u64,
    /// Pushed payloads applied.
    pub pushes_applied: u64,
    /// Pushed envelopes ignored or dropped as stale.
    pub pushes_dropped: u64,
    /// `get` calls answered from the cache.
    pub cache_hits: u64,
    /// `get` calls that missed the cache.
    pub cache_misses: u64,
    /// `get` calls answered by the fallback table.
    pub fallback_hits: u64,
    /// Failed attempts since the last success.
    pub consecutive_failures: u32,
    /// Time of the last successful pull.
    pub last_sync_time: Option<Instant>,
    /// Message of the last failure.
    pub last_error: Option<String>,
}

/// Point-in-time health of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    /// Engine state.
    pub state: EngineState,
    /// True when not synced or the latest attempts failed.
    pub degraded: bool,
    /// Number of cached keys.
    pub cache_size: usize,
    /// True when the cache is older than the configured ttl.
    pub cache_expired: bool,
    /// Revision currently applied.
    pub revision: Option<u64>,
    /// Failed attempts since the last success.
    pub consecutive_failures: u32,
    /// Message of the last failure.
    pub last_error: Option<String>,
}

/// Result of feeding a payload, envelope or poll tick to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The payload was merged into the cache.
    Applied(RefreshEvent),
    /// The server has nothing newer; no pull was made.
    Unchanged,
    /// The payload is older than the applied revision and was dropped.
    Stale {
        /// Revision carried by the payload.
        received: u64,
        /// Revision already applied.
        current: u64,
    },
    /// A pushed payload without a revision arrived after a revision was
    /// applied; it was not merged.
    Unordered {
        /// Revision already applied.
        current: u64,
    },
    /// The envelope was addressed to another application or environment.
    Ignored,
}

impl SyncOutcome {
    /// Returns true if a payload was merged.
    pub fn is_applied(&self) -> bool {
        matches!(self, SyncOutcome::Applied(_))
    }

    /// Returns the number of keys whose value changed.
    pub fn changed_count(&self) -> usize {
        match self {
            SyncOutcome::Applied(event) => event.changes.len(),
            _ => 0,
        }
    }
}

/// Keeps the local cache of one application environment current.
///
/// All cache mutation goes through one writer gate: payloads from pulls,
/// pushes and the durable cache are diffed, merged, swapped in and persisted
/// one at a time. Readers never take the gate.
pub struct ClientSyncEngine {
    config: ClientConfig,
    transport: Arc<dyn ConfigTransport>,
    retry: RetryPolicy,
    cache: ConfigCache,
    durable: Option<Arc<dyn CacheStore>>,
    fallback: RwLock<FallbackTable>,
    listeners: ListenerSet,
    state: RwLock<EngineState>,
    stats: Mutex<SyncStats>,
    writer: Mutex<()>,
}

impl ClientSyncEngine {
    /// Creates an engine.
    ///
    /// A durable file store is attached when the configuration names a cache
    /// path.
    pub fn new(config: ClientConfig, transport: Arc<dyn ConfigTransport>) -> ClientResult<Self> {
        config.validate()?;
        let durable = config.cache_path.as_ref().map(|path| {
            let store = match config.cache_format {
                Some(format) => FileCacheStore::with_format(path.clone(), format),
                None => FileCacheStore::new(path.clone()),
            };
            Arc::new(store) as Arc<dyn CacheStore>
        });
        let retry = RetryPolicy::new(config.retry.clone());

        Ok(Self {
            config,
            transport,
            retry,
            cache: ConfigCache::new(),
            durable,
            fallback: RwLock::new(FallbackTable::new()),
            listeners: ListenerSet::default(),
            state: RwLock::new(EngineState::Uninitialized),
            stats: Mutex::new(SyncStats::default()),
            writer: Mutex::new(()),
        })
    }

    /// Replaces the durable cache store.
    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.durable = Some(store);
        self
    }

    /// Sets the fallback table.
    pub fn with_fallback(mut self, table: FallbackTable) -> Self {
        self.fallback = RwLock::new(table);
        self
    }

    /// Replaces the sleeper used between retries.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.retry = RetryPolicy::with_sleeper(self.config.retry.clone(), sleeper);
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the cache.
    pub fn cache(&self) -> &ConfigCache {
        &self.cache
    }

    /// Returns the current cache generation.
    pub fn snapshot(&self) -> Arc<CacheState> {
        self.cache.snapshot()
    }

    /// Returns the current state.
    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    /// Returns a copy of the counters.
    pub fn stats(&self) -> SyncStats {
        self.stats.lock().clone()
    }

    /// Adds or replaces a fallback value.
    pub fn set_fallback(&self, key: impl Into<String>, value: impl Into<String>) {
        self.fallback.write().insert(key, value);
    }

    /// Registers a listener.
    pub fn subscribe(&self, listener: Arc<dyn ConfigListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn set_state(&self, state: EngineState) {
        *self.state.write() = state;
    }

    /// Loads the durable cache, then makes the initial pull.
    ///
    /// A failed pull is logged; the engine keeps serving whatever the
    /// durable cache held and converges on the next poll tick.
    pub fn initialize(&self) -> EngineState {
        let warm = self.load_durable();
        self.set_state(if warm {
            EngineState::Warm
        } else {
            EngineState::Empty
        });

        if let Err(e) = self.pull() {
            warn!(
                app = %self.config.app_code,
                env = %self.config.env_code,
                warm,
                error = %e,
                "initial pull failed"
            );
        }
        self.state()
    }

    fn load_durable(&self) -> bool {
        let Some(store) = &self.durable else {
            return false;
        };
        match store.load() {
            Ok(Some(record)) => {
                let state = CacheState::from_record(record);
                let keys = state.len();
                let revision = state.revision();
                {
                    let _gate = self.writer.lock();
                    self.cache.replace(state);
                }
                info!(keys, ?revision, "loaded durable cache");
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "durable cache unreadable, starting empty");
                false
            }
        }
    }

    /// Pulls the full configuration, retrying transient failures.
    ///
    /// On exhaustion the last error is returned and the cache is untouched.
    pub fn pull(&self) -> ClientResult<SyncOutcome> {
        let request = self.config.pull_request();
        let outcome = self.retry.run(|attempt| {
            if attempt > 0 {
                self.stats.lock().retries += 1;
            }
            self.fetch(&request)
        });

        let attempts = outcome.attempts();
        match outcome {
            RetryOutcome::Succeeded { value, .. } => Ok(self.apply_response(value)),
            RetryOutcome::Exhausted { last_error, .. } => {
                warn!(attempts, error = %last_error, "pull failed on every attempt");
                Err(last_error)
            }
            RetryOutcome::Aborted { error, .. } => {
                warn!(attempts, error = %error, "pull failed terminally");
                Err(error)
            }
        }
    }

    /// Makes one pull attempt with no retry.
    pub fn pull_once(&self) -> ClientResult<SyncOutcome> {
        let response = self.fetch(&self.config.pull_request())?;
        Ok(self.apply_response(response))
    }

    fn fetch(&self, request: &confsync_protocol::PullRequest) -> ClientResult<PullResponse> {
        let result = self.transport.fetch(request).and_then(|response| {
            if response.is_success() {
                Ok(response)
            } else {
                Err(ClientError::status(response.code, response.message))
            }
        });

        let mut stats = self.stats.lock();
        stats.pulls_attempted += 1;
        match &result {
            Ok(_) => {
                stats.pulls_succeeded += 1;
                stats.consecutive_failures = 0;
                stats.last_sync_time = Some(Instant::now());
                stats.last_error = None;
            }
            Err(e) => {
                stats.pulls_failed += 1;
                stats.consecutive_failures = stats.consecutive_failures.saturating_add(1);
                stats.last_error = Some(e.to_string());
            }
        }
        result
    }

    fn apply_response(&self, response: PullResponse) -> SyncOutcome {
        let outcome = self.apply_payload(
            RefreshSource::Pull,
            &response.data,
            response.revision,
            response.version,
        );
        self.set_state(EngineState::Synced);
        outcome
    }

    /// The single mutation point: diff, merge, swap, persist, notify.
    fn apply_payload(
        &self,
        source: RefreshSource,
        data: &ConfigMap,
        revision: Option<u64>,
        version: Option<String>,
    ) -> SyncOutcome {
        let event = {
            let _gate = self.writer.lock();
            let current = self.cache.snapshot();
            if let (RefreshSource::Push, None, Some(applied)) =
                (source, revision, current.revision())
            {
                debug!(applied, "unordered push payload not merged");
                return SyncOutcome::Unordered { current: applied };
            }
            if let (Some(received), Some(applied)) = (revision, current.revision()) {
                if received < applied {
                    debug!(%source, received, applied, "dropping stale payload");
                    return SyncOutcome::Stale {
                        received,
                        current: applied,
                    };
                }
            }

            let (next, changes) = current.merge(data, revision, version, Utc::now());
            let record = next.to_record();
            let event = RefreshEvent {
                source,
                revision: next.revision(),
                version: next.version().map(str::to_string),
                changes,
                size: next.len(),
            };
            self.cache.replace(next);
            self.persist(&record);
            event
        };

        if !event.is_empty() {
            info!(
                %source,
                changed = event.changes.len(),
                revision = ?event.revision,
                "configuration refreshed"
            );
            self.listeners.dispatch(&event);
        }
        SyncOutcome::Applied(event)
    }

    fn persist(&self, record: &CacheRecord) {
        if let Some(store) = &self.durable {
            if let Err(e) = store.save(record) {
                warn!(error = %e, "durable cache write failed");
            }
        }
    }

    fn accepts(&self, envelope: &PushEnvelope) -> bool {
        let app_ok = self.config.app_id.is_none_or(|id| id == envelope.app_id());
        let env_ok = self.config.env_id.is_none_or(|id| id == envelope.env_id());
        app_ok && env_ok
    }

    /// Applies a pushed envelope.
    ///
    /// Updates go through the same mutation point as pulls, without retry.
    /// An update without a revision cannot be ordered once a revision has
    /// been applied, so it is replaced by one pull attempt.
    /// A change notification newer than the applied revision triggers one
    /// pull attempt.
    pub fn handle_envelope(&self, envelope: &PushEnvelope) -> ClientResult<SyncOutcome> {
        if !self.accepts(envelope) {
            self.stats.lock().pushes_dropped += 1;
            debug!(
                app_id = envelope.app_id(),
                env_id = envelope.env_id(),
                "ignoring envelope for another environment"
            );
            return Ok(SyncOutcome::Ignored);
        }

        match envelope {
            PushEnvelope::ConfigUpdate(update) => {
                let outcome = self.apply_payload(
                    RefreshSource::Push,
                    &update.config_data,
                    update.revision,
                    update.version_number.clone(),
                );
                {
                    let mut stats = self.stats.lock();
                    if outcome.is_applied() {
                        stats.pushes_applied += 1;
                    } else {
                        stats.pushes_dropped += 1;
                    }
                }
                if let SyncOutcome::Unordered { current } = outcome {
                    info!(current, "push without revision, pulling instead");
                    return self.pull_once();
                }
                Ok(outcome)
            }
            PushEnvelope::ConfigChangeNotification(note) => {
                if let (Some(announced), Some(applied)) = (note.revision, self.cache.revision()) {
                    if announced <= applied {
                        return Ok(SyncOutcome::Unchanged);
                    }
                }
                info!(
                    version = %note.version_number,
                    change = %note.change_type,
                    "change notification received, pulling"
                );
                self.pull_once()
            }
        }
    }

    /// One poll tick.
    ///
    /// When synced and the server advertises the revision already applied,
    /// the full pull is skipped. An unavailable or failing version check
    /// always falls back to a full pull.
    pub fn poll_tick(&self) -> ClientResult<SyncOutcome> {
        if self.state() == EngineState::Synced {
            match self.transport.check_version(&self.config.pull_request()) {
                Ok(Some(info)) if Some(info.revision) == self.cache.revision() => {
                    debug!(revision = info.revision, "server revision unchanged");
                    return Ok(SyncOutcome::Unchanged);
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "version check failed, falling back to full pull"),
            }
        }
        self.pull()
    }

    /// Resolves a key: cache, one pull on miss, `default`, then the fallback table.
    ///
    /// Never fails; `None` means no source knows the key.
    pub fn get(&self, key: &str, default: Option<&str>) -> Option<String> {
        if let Some(value) = self.cache.get(key) {
            self.stats.lock().cache_hits += 1;
            return Some(value);
        }
        self.stats.lock().cache_misses += 1;

        if self.config.pull_on_miss {
            match self.pull_once() {
                Ok(_) => {
                    if let Some(value) = self.cache.get(key) {
                        return Some(value);
                    }
                }
                Err(e) => debug!(key, error = %e, "pull on cache miss failed"),
            }
        }

        if let Some(default) = default {
            return Some(default.to_string());
        }

        let fallback = self.fallback.read().get(key).map(str::to_string);
        if fallback.is_some() {
            self.stats.lock().fallback_hits += 1;
        }
        fallback
    }

    /// Resolves a key, returning `default` when nothing else does.
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key, Some(default))
            .unwrap_or_else(|| default.to_string())
    }

    /// Resolves a key and converts it.
    pub fn get_as<T: ConfigType>(&self, key: &str) -> BindingResult<Option<T>> {
        self.get(key, None)
            .map(|raw| T::parse(key, &raw))
            .transpose()
    }

    /// Returns the engine's health.
    pub fn health(&self) -> HealthReport {
        let stats = self.stats();
        let cache = self.cache.snapshot();
        let state = self.state();
        HealthReport {
            state,
            degraded: state != EngineState::Synced || stats.consecutive_failures > 0,
            cache_size: cache.len(),
            cache_expired: cache.is_expired(self.config.cache_ttl),
            revision: cache.revision(),
            consecutive_failures: stats.consecutive_failures,
            last_error: stats.last_error,
        }
    }
}

impl ValueSource for ClientSyncEngine {
    fn current(&self, key: &str) -> Option<String> {
        self.cache.get(key)
    }

    fn fallback(&self, key: &str) -> Option<String> {
        self.fallback.read().get(key).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::store::MemoryCacheStore;
    use crate::transport::MockTransport;
    use confsync_protocol::{ChangeType, VersionInfo};
    use std::time::Duration;

    struct NoSleep;

    impl Sleeper for NoSleep {
        fn sleep(&self, _duration: Duration) {}
    }

    fn map(pairs: &[(&str, &str)]) -> ConfigMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn config() -> ClientConfig {
        ClientConfig::new("http://config.local", "shop", "prod")
            .with_ids(1, 2)
            .with_retry(RetryConfig::default().with_max_retries(2))
    }

    fn engine(transport: Arc<MockTransport>) -> ClientSyncEngine {
        ClientSyncEngine::new(config(), transport)
            .unwrap()
            .with_sleeper(Arc::new(NoSleep))
    }

    #[derive(Default)]
    struct Counter(Mutex<Vec<String>>);

    impl ConfigListener for Counter {
        fn on_change(&self, change: &crate::listener::ConfigChange) {
            self.0.lock().push(change.key.clone());
        }
    }

    #[test]
    fn new_validates_config() {
        let bad = ClientConfig::new("", "shop", "prod").with_push(false);
        assert!(ClientSyncEngine::new(bad, Arc::new(MockTransport::new())).is_err());
    }

    #[test]
    fn initialize_pulls_and_syncs() {
        let transport = Arc::new(MockTransport::new());
        transport.set_response(PullResponse::ok(map(&[("a", "1")])).with_revision(1));
        let engine = engine(transport);

        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert_eq!(engine.initialize(), EngineState::Synced);
        assert_eq!(engine.get("a", None).as_deref(), Some("1"));
        assert!(!engine.health().degraded);
    }

    #[test]
    fn failed_initial_pull_serves_durable_cache() {
        let transport = Arc::new(MockTransport::new());
        transport.set_connected(false);
        let store = Arc::new(MemoryCacheStore::with_record(CacheRecord {
            configs: map(&[("a", "cached")]),
            revision: Some(3),
            ..CacheRecord::default()
        }));
        let engine = engine(transport).with_cache_store(store);

        assert_eq!(engine.initialize(), EngineState::Warm);
        assert_eq!(engine.get("a", None).as_deref(), Some("cached"));
        let health = engine.health();
        assert!(health.degraded);
        assert_eq!(health.consecutive_failures, 3);
        assert_eq!(health.revision, Some(3));
    }

    #[test]
    fn pull_persists_and_notifies() {
        let transport = Arc::new(MockTransport::new());
        transport.set_response(PullResponse::ok(map(&[("a", "1"), ("b", "2")])));
        let store = Arc::new(MemoryCacheStore::new());
        let engine = engine(transport.clone()).with_cache_store(store.clone());
        let counter = Arc::new(Counter::default());
        engine.subscribe(counter.clone());

        let outcome = engine.pull().unwrap();
        assert_eq!(outcome.changed_count(), 2);
        assert_eq!(store.record().unwrap().configs, map(&[("a", "1"), ("b", "2")]));
        assert_eq!(*counter.0.lock(), vec!["a", "b"]);

        // Same payload: nothing changes, nobody is notified.
        assert_eq!(engine.pull().unwrap().changed_count(), 0);
        assert_eq!(counter.0.lock().len(), 2);
    }

    #[test]
    fn keys_absent_from_payload_are_kept() {
        let transport = Arc::new(MockTransport::new());
        transport.set_response(PullResponse::ok(map(&[("a", "1"), ("b", "2")])));
        let engine = engine(transport.clone());
        engine.pull().unwrap();

        transport.set_response(PullResponse::ok(map(&[("a", "3")])));
        engine.pull().unwrap();
        assert_eq!(engine.get("a", None).as_deref(), Some("3"));
        assert_eq!(engine.get("b", None).as_deref(), Some("2"));
    }

    #[test]
    fn exhausted_pull_reports_attempts() {
        let transport = Arc::new(MockTransport::new());
        transport.set_connected(false);
        let engine = engine(transport.clone());

        assert!(engine.pull().unwrap_err().is_retryable());
        assert_eq!(transport.fetch_count(), 3);
        let stats = engine.stats();
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.pulls_failed, 3);
    }

    #[test]
    fn error_status_is_terminal() {
        let transport = Arc::new(MockTransport::new());
        transport.set_response(PullResponse::error(404, "unknown environment"));
        let engine = engine(transport.clone());

        assert!(engine.pull().is_err());
        assert_eq!(transport.fetch_count(), 1);
    }

    #[test]
    fn get_resolution_order() {
        let transport = Arc::new(MockTransport::new());
        transport.set_connected(false);
        let engine = engine(transport.clone()).with_fallback(FallbackTable::new().with("t", "fb"));

        assert_eq!(engine.get("t", Some("dflt")).as_deref(), Some("dflt"));
        assert_eq!(engine.get("t", None).as_deref(), Some("fb"));
        assert_eq!(engine.get("nothing", None), None);
        assert_eq!(engine.get_or("nothing", "x"), "x");
        // One attempt per miss, no backoff.
        assert_eq!(transport.fetch_count(), 4);
        assert_eq!(engine.stats().fallback_hits, 1);
    }

    #[test]
    fn miss_pulls_once_and_rechecks() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine(transport.clone());
        transport.set_response(PullResponse::ok(map(&[("late", "yes")])));

        assert_eq!(engine.get("late", None).as_deref(), Some("yes"));
        assert_eq!(engine.get("late", None).as_deref(), Some("yes"));
        assert_eq!(transport.fetch_count(), 1);
    }

    #[test]
    fn typed_reads() {
        let transport = Arc::new(MockTransport::new());
        transport.set_response(PullResponse::ok(map(&[("port", "8080"), ("flag", "maybe")])));
        let engine = engine(transport);
        engine.pull().unwrap();

        assert_eq!(engine.get_as::<i32>("port").unwrap(), Some(8080));
        assert!(engine.get_as::<bool>("flag").is_err());
    }

    #[test]
    fn stale_push_is_dropped() {
        let transport = Arc::new(MockTransport::new());
        transport.set_response(PullResponse::ok(map(&[("a", "new")])).with_revision(5));
        let engine = engine(transport);
        engine.pull().unwrap();

        let old = PushEnvelope::update(1, 2, map(&[("a", "old")])).with_revision(4);
        assert_eq!(
            engine.handle_envelope(&old).unwrap(),
            SyncOutcome::Stale {
                received: 4,
                current: 5
            }
        );
        assert_eq!(engine.get("a", None).as_deref(), Some("new"));
        assert_eq!(engine.stats().pushes_dropped, 1);
    }

    #[test]
    fn targeted_push_without_revision_pulls_instead() {
        let transport = Arc::new(MockTransport::new());
        transport.set_response(PullResponse::ok(map(&[("a", "new")])).with_revision(5));
        let engine = engine(transport.clone());
        engine.pull().unwrap();

        let late = PushEnvelope::update(1, 2, map(&[("a", "old")]));
        let outcome = engine.handle_envelope(&late).unwrap();
        assert_eq!(outcome.changed_count(), 0);
        assert_eq!(transport.fetch_count(), 2);
        assert_eq!(engine.cache().get("a").as_deref(), Some("new"));
        assert_eq!(engine.cache().revision(), Some(5));
        assert_eq!(engine.stats().pushes_dropped, 1);
    }

    #[test]
    fn push_without_revision_applies_before_any_revision() {
        let engine = engine(Arc::new(MockTransport::new()));
        let push = PushEnvelope::update(1, 2, map(&[("a", "1")]));
        assert!(engine.handle_envelope(&push).unwrap().is_applied());
        assert_eq!(engine.cache().get("a").as_deref(), Some("1"));
    }

    #[test]
    fn push_for_other_environment_is_ignored() {
        let engine = engine(Arc::new(MockTransport::new()));
        let other = PushEnvelope::update(1, 3, map(&[("a", "x")]));
        assert_eq!(engine.handle_envelope(&other).unwrap(), SyncOutcome::Ignored);
        assert!(engine.cache().is_empty());

        let mine = PushEnvelope::update(1, 2, map(&[("a", "x")])).with_revision(1);
        assert!(engine.handle_envelope(&mine).unwrap().is_applied());
        assert_eq!(engine.stats().pushes_applied, 1);
    }

    #[test]
    fn notification_pulls_only_when_newer() {
        let transport = Arc::new(MockTransport::new());
        transport.set_response(PullResponse::ok(map(&[("a", "1")])).with_revision(2));
        let engine = engine(transport.clone());
        engine.pull().unwrap();

        let seen = PushEnvelope::notification(1, 2, "v1.0.1", ChangeType::Publish).with_revision(2);
        assert_eq!(engine.handle_envelope(&seen).unwrap(), SyncOutcome::Unchanged);
        assert_eq!(transport.fetch_count(), 1);

        transport.set_response(PullResponse::ok(map(&[("a", "2")])).with_revision(3));
        let newer = PushEnvelope::notification(1, 2, "v1.0.2", ChangeType::Publish).with_revision(3);
        assert!(engine.handle_envelope(&newer).unwrap().is_applied());
        assert_eq!(engine.get("a", None).as_deref(), Some("2"));
    }

    #[test]
    fn poll_tick_skips_pull_when_revision_matches() {
        let transport = Arc::new(MockTransport::new());
        transport.set_response(PullResponse::ok(map(&[("a", "1")])).with_revision(7));
        let engine = engine(transport.clone());
        engine.initialize();

        transport.set_version(Some(VersionInfo {
            revision: 7,
            version: None,
        }));
        assert_eq!(engine.poll_tick().unwrap(), SyncOutcome::Unchanged);
        assert_eq!(transport.fetch_count(), 1);

        transport.set_version(None);
        engine.poll_tick().unwrap();
        assert_eq!(transport.fetch_count(), 2);
    }

    #[test]
    fn unsubscribed_listener_is_silent() {
        let transport = Arc::new(MockTransport::new());
        transport.set_response(PullResponse::ok(map(&[("a", "1")])));
        let engine = engine(transport);
        let counter = Arc::new(Counter::default());
        let id = engine.subscribe(counter.clone());
        assert!(engine.unsubscribe(id));
        engine.pull().unwrap();
        assert!(counter.0.lock().is_empty());
        assert_eq!(engine.listener_count(), 0);
    }
}
