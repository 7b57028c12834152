//! Connected client instances and push fan-out.

use crate::sink::{DeliveryError, PushSink};
use chrono::{DateTime, Utc};
use confsync_protocol::{ChangeType, ConfigMap, PushEnvelope};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Transport-assigned identifier of one push connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Wraps an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random identifier.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered client instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRegistration {
    /// Connection the instance registered on.
    pub connection_id: ConnectionId,
    /// Application the instance serves.
    pub app_id: u64,
    /// Instance identifier.
    pub instance_id: String,
    /// Reported address.
    pub instance_ip: String,
    /// Client library version.
    pub client_version: String,
    /// Time of the last heartbeat (or the registration).
    pub last_heartbeat: DateTime<Utc>,
    /// Time of the registration.
    pub connected_at: DateTime<Utc>,
}

/// Registration counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// All registrations.
    pub total: usize,
    /// Registrations with a fresh heartbeat.
    pub online: usize,
    /// Registrations whose heartbeat expired.
    pub offline: usize,
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Live targets a delivery was attempted to.
    pub attempted: usize,
    /// Deliveries that succeeded.
    pub delivered: usize,
    /// Deliveries that failed.
    pub failed: usize,
}

struct Entry {
    registration: ClientRegistration,
    last_seen: Instant,
}

/// Registry of connected client instances.
///
/// Registrations and sinks are keyed by [`ConnectionId`] and may be written
/// from many connection threads at once. A sink is attached when the
/// transport accepts a connection; the registration arrives later with the
/// client's handshake.
pub struct PushRegistry {
    heartbeat_timeout: Duration,
    entries: RwLock<HashMap<ConnectionId, Entry>>,
    sinks: RwLock<HashMap<ConnectionId, Arc<dyn PushSink>>>,
}

impl PushRegistry {
    /// Creates an empty registry.
    pub fn new(heartbeat_timeout: Duration) -> Self {
        Self {
            heartbeat_timeout,
            entries: RwLock::new(HashMap::new()),
            sinks: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the heartbeat timeout.
    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    /// Attaches the delivery capability of an accepted connection.
    pub fn attach(&self, connection_id: ConnectionId, sink: Arc<dyn PushSink>) {
        debug!(connection_id = %connection_id, "push sink attached");
        self.sinks.write().insert(connection_id, sink);
    }

    /// Registers an instance, replacing any earlier registration on the same connection.
    pub fn register(
        &self,
        connection_id: ConnectionId,
        app_id: u64,
        instance_id: impl Into<String>,
        instance_ip: impl Into<String>,
        client_version: impl Into<String>,
    ) -> ClientRegistration {
        let now = Utc::now();
        let registration = ClientRegistration {
            connection_id: connection_id.clone(),
            app_id,
            instance_id: instance_id.into(),
            instance_ip: instance_ip.into(),
            client_version: client_version.into(),
            last_heartbeat: now,
            connected_at: now,
        };

        let replaced = self.entries.write().insert(
            connection_id.clone(),
            Entry {
                registration: registration.clone(),
                last_seen: Instant::now(),
            },
        );

        info!(
            connection_id = %connection_id,
            app_id,
            instance_id = %registration.instance_id,
            replaced = replaced.is_some(),
            "client registered"
        );
        registration
    }

    /// Refreshes a registration's heartbeat. Returns false for unknown connections.
    pub fn heartbeat(&self, connection_id: &ConnectionId) -> bool {
        match self.entries.write().get_mut(connection_id) {
            Some(entry) => {
                entry.last_seen = Instant::now();
                entry.registration.last_heartbeat = Utc::now();
                true
            }
            None => {
                debug!(connection_id = %connection_id, "heartbeat for unknown connection");
                false
            }
        }
    }

    /// Drops a registration and its sink.
    pub fn remove(&self, connection_id: &ConnectionId) -> Option<ClientRegistration> {
        self.sinks.write().remove(connection_id);
        let removed = self
            .entries
            .write()
            .remove(connection_id)
            .map(|e| e.registration);
        if let Some(reg) = &removed {
            info!(
                connection_id = %connection_id,
                app_id = reg.app_id,
                instance_id = %reg.instance_id,
                "client removed"
            );
        }
        removed
    }

    /// Removes a registration only if it is still stale under the write lock.
    fn remove_if_stale(&self, connection_id: &ConnectionId) -> bool {
        let removed = {
            let mut entries = self.entries.write();
            let now = Instant::now();
            match entries.get(connection_id) {
                Some(entry) if !self.is_fresh(entry, now) => entries.remove(connection_id),
                _ => None,
            }
        };
        let Some(entry) = removed else {
            return false;
        };
        self.sinks.write().remove(connection_id);
        info!(
            connection_id = %connection_id,
            app_id = entry.registration.app_id,
            instance_id = %entry.registration.instance_id,
            "stale client pruned"
        );
        true
    }

    fn is_fresh(&self, entry: &Entry, now: Instant) -> bool {
        now.saturating_duration_since(entry.last_seen) <= self.heartbeat_timeout
    }

    /// Returns true if the connection is registered with a fresh heartbeat.
    pub fn is_live(&self, connection_id: &ConnectionId) -> bool {
        let now = Instant::now();
        self.entries
            .read()
            .get(connection_id)
            .is_some_and(|e| self.is_fresh(e, now))
    }

    /// Returns a registration, live or not.
    pub fn get(&self, connection_id: &ConnectionId) -> Option<ClientRegistration> {
        self.entries
            .read()
            .get(connection_id)
            .map(|e| e.registration.clone())
    }

    /// Returns live registrations of an application.
    pub fn online_clients(&self, app_id: u64) -> Vec<ClientRegistration> {
        let now = Instant::now();
        let mut clients: Vec<_> = self
            .entries
            .read()
            .values()
            .filter(|e| e.registration.app_id == app_id && self.is_fresh(e, now))
            .map(|e| e.registration.clone())
            .collect();
        clients.sort_by(|a, b| a.connection_id.cmp(&b.connection_id));
        clients
    }

    /// Returns registration counts.
    pub fn connection_stats(&self) -> ConnectionStats {
        let now = Instant::now();
        let entries = self.entries.read();
        let online = entries.values().filter(|e| self.is_fresh(e, now)).count();
        ConnectionStats {
            total: entries.len(),
            online,
            offline: entries.len() - online,
        }
    }

    /// Drops registrations whose heartbeat expired. Returns how many were dropped.
    pub fn prune_stale(&self) -> usize {
        let now = Instant::now();
        let stale: Vec<ConnectionId> = self
            .entries
            .read()
            .iter()
            .filter(|(_, e)| !self.is_fresh(e, now))
            .map(|(id, _)| id.clone())
            .collect();
        let mut pruned = 0;
        for id in &stale {
            if self.remove_if_stale(id) {
                pruned += 1;
            }
        }
        pruned
    }

    /// Returns the number of registrations.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Broadcasts a full payload to every live instance of an application.
    ///
    /// Environment filtering is left to the clients.
    pub fn push_snapshot(
        &self,
        app_id: u64,
        env_id: u64,
        data: ConfigMap,
        revision: Option<u64>,
        version: Option<&str>,
    ) -> PushReport {
        let mut envelope = PushEnvelope::update(app_id, env_id, data);
        if let Some(revision) = revision {
            envelope = envelope.with_revision(revision);
        }
        if let Some(version) = version {
            envelope = envelope.with_version(version);
        }
        self.fan_out(&envelope, |reg| reg.app_id == app_id)
    }

    /// Delivers a full payload to the named instances only.
    ///
    /// The payload is stamped like `push_snapshot` so clients can order it
    /// against their pulls.
    pub fn push_to_instances(
        &self,
        app_id: u64,
        env_id: u64,
        instance_ids: &[&str],
        data: ConfigMap,
        revision: Option<u64>,
        version: Option<&str>,
    ) -> PushReport {
        let mut envelope = PushEnvelope::update(app_id, env_id, data);
        if let Some(revision) = revision {
            envelope = envelope.with_revision(revision);
        }
        if let Some(version) = version {
            envelope = envelope.with_version(version);
        }
        self.fan_out(&envelope, |reg| {
            instance_ids.contains(&reg.instance_id.as_str())
        })
    }

    /// Tells every live instance of an application that a new version exists.
    pub fn push_change_notification(
        &self,
        app_id: u64,
        env_id: u64,
        version_number: &str,
        change_type: ChangeType,
        revision: Option<u64>,
    ) -> PushReport {
        let mut envelope = PushEnvelope::notification(app_id, env_id, version_number, change_type);
        if let Some(revision) = revision {
            envelope = envelope.with_revision(revision);
        }
        self.fan_out(&envelope, |reg| reg.app_id == app_id)
    }

    /// Delivers an envelope to every live instance.
    pub fn broadcast(&self, envelope: &PushEnvelope) -> PushReport {
        self.fan_out(envelope, |_| true)
    }

    /// Drops a connection at the server's initiative.
    pub fn disconnect(&self, connection_id: &ConnectionId) -> bool {
        self.remove(connection_id).is_some()
    }

    fn fan_out(
        &self,
        envelope: &PushEnvelope,
        select: impl Fn(&ClientRegistration) -> bool,
    ) -> PushReport {
        let now = Instant::now();
        let targets: Vec<(ConnectionId, Arc<dyn PushSink>)> = {
            let entries = self.entries.read();
            let sinks = self.sinks.read();
            entries
                .iter()
                .filter(|(_, e)| self.is_fresh(e, now) && select(&e.registration))
                .filter_map(|(id, _)| sinks.get(id).map(|s| (id.clone(), Arc::clone(s))))
                .collect()
        };

        let mut report = PushReport {
            attempted: targets.len(),
            ..PushReport::default()
        };
        let mut closed = Vec::new();
        for (id, sink) in targets {
            match sink.deliver(envelope) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        connection_id = %id,
                        kind = envelope.type_name(),
                        error = %err,
                        "push delivery failed"
                    );
                    if err == DeliveryError::Closed {
                        closed.push(id);
                    }
                }
            }
        }
        for id in &closed {
            self.remove(id);
        }

        debug!(
            kind = envelope.type_name(),
            app_id = envelope.app_id(),
            env_id = envelope.env_id(),
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            "push fan-out complete"
        );
        report
    }
}

impl Default for PushRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(90))
    }
}
