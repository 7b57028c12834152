//! # confsync Core
//!
//! Server-side configuration authority.
//!
//! Every change produces a new immutable [`Snapshot`]; nothing is edited in
//! place. Snapshots live in a [`SnapshotStore`] keyed by [`Lineage`]
//! (application + environment) and carry a [`VersionNumber`] that is unique and
//! increasing within the lineage.
//!
//! [`SnapshotLifecycle`] layers the draft → publish → rollback transitions on
//! top of the store and copies snapshot content into a [`LiveConfigStore`],
//! the system-of-record that clients pull from.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod diff;
mod error;
mod item;
mod lifecycle;
mod live;
mod snapshot;
mod store;
mod version;

pub use config::StoreConfig;
pub use diff::{DiffEntry, SnapshotDiff, VersionRecord};
pub use error::{CoreError, CoreResult};
pub use item::{flatten_json, ConfigItem, ValueType};
pub use lifecycle::{LifecycleEvent, LifecycleObserver, SnapshotLifecycle};
pub use live::{ApplyMode, ApplyReport, LiveConfig, LiveConfigStore, MemoryLiveStore};
pub use snapshot::{Lineage, Snapshot, SnapshotId, SnapshotKind, SnapshotOrigin};
pub use store::{DraftRequest, SnapshotStatistics, SnapshotStore};
pub use version::VersionNumber;

pub use confsync_protocol::ConfigMap;
