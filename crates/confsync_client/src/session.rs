//! Push channel session.

use crate::engine::ClientSyncEngine;
use crate::error::{ClientError, ClientResult};
use confsync_protocol::{ClientMessage, PushEnvelope};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const RECV_SLICE: Duration = Duration::from_millis(100);
const MIN_HEARTBEAT: Duration = Duration::from_millis(10);

/// What a receive on the push channel produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// An envelope arrived.
    Envelope(PushEnvelope),
    /// Nothing arrived before the timeout.
    Idle,
    /// The peer is gone.
    Closed,
}

/// A bidirectional push connection to the server.
pub trait PushChannel: Send {
    /// Sends a handshake, heartbeat or disconnect.
    fn send(&self, message: &ClientMessage) -> ClientResult<()>;

    /// Waits up to `timeout` for the next envelope.
    fn recv_timeout(&self, timeout: Duration) -> ChannelEvent;
}

/// Worker owning one push channel.
///
/// Sends the registration handshake, heartbeats on the configured interval,
/// and feeds every received envelope to the engine. Envelopes for other
/// environments are filtered by the engine. A dropped push is never retried;
/// the poll loop corrects it.
pub struct PushSession {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PushSession {
    /// Registers on `channel` and starts the worker.
    ///
    /// Fails if the engine has no app id or the handshake cannot be sent.
    pub fn start(engine: Arc<ClientSyncEngine>, channel: Box<dyn PushChannel>) -> ClientResult<Self> {
        let config = engine.config();
        let app_id = config
            .app_id
            .ok_or_else(|| ClientError::invalid_config("push session needs an app id"))?;
        let instance_id = config.instance_id.clone();
        let heartbeat = config.heartbeat_interval.max(MIN_HEARTBEAT);

        channel.send(&ClientMessage::register(
            app_id,
            instance_id.as_str(),
            config.instance_ip.as_str(),
            config.client_version.as_str(),
        ))?;
        info!(app_id, instance_id = %instance_id, "push session registered");

        let stop = Arc::new(AtomicBool::new(false));
        let stopping = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("confsync-push".to_string())
            .spawn(move || {
                run(&engine, channel.as_ref(), app_id, &instance_id, heartbeat, &stopping)
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Returns true while the worker runs.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the worker, which sends a disconnect if the channel is open.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("push session thread panicked");
            }
        }
    }
}

impl Drop for PushSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    engine: &ClientSyncEngine,
    channel: &dyn PushChannel,
    app_id: u64,
    instance_id: &str,
    heartbeat: Duration,
    stop: &AtomicBool,
) {
    let mut next_heartbeat = Instant::now() + heartbeat;
    while !stop.load(Ordering::SeqCst) {
        let wait = next_heartbeat
            .saturating_duration_since(Instant::now())
            .min(RECV_SLICE);
        match channel.recv_timeout(wait) {
            ChannelEvent::Envelope(envelope) => match engine.handle_envelope(&envelope) {
                Ok(outcome) => debug!(
                    kind = envelope.type_name(),
                    changed = outcome.changed_count(),
                    "push handled"
                ),
                Err(e) => warn!(kind = envelope.type_name(), error = %e, "push handling failed"),
            },
            ChannelEvent::Idle => {}
            ChannelEvent::Closed => {
                info!(instance_id, "push channel closed");
                return;
            }
        }

        if Instant::now() >= next_heartbeat {
            if let Err(e) = channel.send(&ClientMessage::heartbeat(app_id, instance_id)) {
                warn!(error = %e, "heartbeat failed");
            }
            next_heartbeat = Instant::now() + heartbeat;
        }
    }

    if let Err(e) = channel.send(&ClientMessage::disconnect(instance_id)) {
        debug!(error = %e, "disconnect not delivered");
    }
    info!(instance_id, "push session stopped");
}
