//! Background poll loop.

use crate::engine::ClientSyncEngine;
use crate::error::ClientResult;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Runs `poll_tick` on a dedicated thread at a fixed interval.
///
/// Ticks never overlap: the next wait starts when the previous tick,
/// retries included, has finished. Failures are logged and the loop keeps
/// going.
pub struct Poller {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    /// Starts polling.
    pub fn start(engine: Arc<ClientSyncEngine>, interval: Duration) -> ClientResult<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("confsync-poller".to_string())
            .spawn(move || {
                info!(interval_ms = interval.as_millis() as u64, "poller started");
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => match engine.poll_tick() {
                            Ok(outcome) => debug!(changed = outcome.changed_count(), "poll tick"),
                            Err(e) => warn!(error = %e, "poll tick failed"),
                        },
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("poller stopped");
            })?;

        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// Returns true until `stop` has been called.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stops the loop and waits for an in-flight tick to finish.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("poller thread panicked");
            }
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}
