//! # confsync Client
//!
//! Keeps an in-process copy of one environment's configuration current and
//! pushes changes into bound values.
//!
//! This crate provides:
//! - [`ClientSyncEngine`]: cache, pull with retry, push handling, fallbacks
//! - [`CacheStore`] / [`FileCacheStore`]: durable side-store read at startup
//! - [`BindingEngine`]: key-to-value bindings re-applied on change
//! - [`Poller`] and [`PushSession`]: the two background workers
//! - [`ClientContext`]: one engine, its bindings and workers per process
//!
//! # Read path
//!
//! `get(key, default)` never fails. It resolves, in order:
//! 1. the live cache
//! 2. one synchronous pull, then the cache again
//! 3. the caller's default
//! 4. the static [`FallbackTable`]
//!
//! # Write path
//!
//! Pulls, pushes and cache loads all go through a single mutation point:
//! diff against the cache, merge, swap, persist, then notify listeners.
//! Payloads older than the revision already applied are dropped.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod binding;
mod cache;
mod coerce;
mod config;
mod context;
mod engine;
mod error;
mod fallback;
mod http;
mod listener;
mod poller;
mod retry;
mod session;
mod store;
mod transport;

pub use binding::{
    BindTarget, BindingDescriptor, BindingEngine, BindingInfo, BindingStats, Configurable,
    DiscoveryReport, Field, Setter, ValueSource,
};
pub use cache::{CacheState, ConfigCache};
pub use coerce::{coerce, parse_list, parse_map, ConfigType, ConfigValue, TargetType};
pub use config::{ClientConfig, RetryConfig};
pub use context::ClientContext;
pub use engine::{ClientSyncEngine, EngineState, HealthReport, SyncOutcome, SyncStats};
pub use error::{BindingError, BindingResult, ClientError, ClientResult, Disposition, PullFailure};
pub use fallback::FallbackTable;
pub use http::{HttpClient, HttpResponse, HttpTransport, LoopbackClient, LoopbackServer};
pub use listener::{ConfigChange, ConfigListener, ListenerId, RefreshEvent, RefreshSource};
pub use poller::Poller;
pub use retry::{RetryOutcome, RetryPolicy, Sleeper, ThreadSleeper};
pub use session::{ChannelEvent, PushChannel, PushSession};
pub use store::{CacheFormat, CacheRecord, CacheStore, FileCacheStore, MemoryCacheStore};
pub use transport::{ConfigTransport, MockTransport};

pub use confsync_protocol::ConfigMap;
