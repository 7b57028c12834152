//! Test doubles for client seams.

use confsync_client::{
    BindTarget, ClientError, ClientResult, ConfigTransport, ConfigValue, Sleeper, TargetType,
};
use confsync_protocol::{PullRequest, PullResponse, VersionInfo};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A transport that fails a fixed number of times, then succeeds.
///
/// Every fetch is recorded with the instant it was made.
pub struct ScriptedTransport {
    failures_left: AtomicU32,
    failure: Box<dyn Fn() -> ClientError + Send + Sync>,
    response: Mutex<PullResponse>,
    attempts: Mutex<Vec<Instant>>,
}

impl ScriptedTransport {
    /// Fails the first `failures` fetches with a retryable transport error.
    pub fn failing(failures: u32, response: PullResponse) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            failure: Box::new(|| ClientError::transport("connection refused")),
            response: Mutex::new(response),
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Fails every fetch.
    pub fn unreachable() -> Self {
        Self::failing(u32::MAX, PullResponse::ok(Default::default()))
    }

    /// Replaces the error returned while failing.
    pub fn with_failure(mut self, make: impl Fn() -> ClientError + Send + Sync + 'static) -> Self {
        self.failure = Box::new(make);
        self
    }

    /// Replaces the response returned once failures are used up.
    pub fn set_response(&self, response: PullResponse) {
        *self.response.lock() = response;
    }

    /// Returns the number of fetches made.
    pub fn attempts(&self) -> usize {
        self.attempts.lock().len()
    }

    /// Returns the gaps between consecutive fetches.
    pub fn gaps(&self) -> Vec<Duration> {
        self.attempts
            .lock()
            .windows(2)
            .map(|w| w[1].duration_since(w[0]))
            .collect()
    }
}

impl ConfigTransport for ScriptedTransport {
    fn fetch(&self, _request: &PullRequest) -> ClientResult<PullResponse> {
        self.attempts.lock().push(Instant::now());
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            if left != u32::MAX {
                self.failures_left.store(left - 1, Ordering::SeqCst);
            }
            return Err((self.failure)());
        }
        Ok(self.response.lock().clone())
    }

    fn check_version(&self, _request: &PullRequest) -> ClientResult<Option<VersionInfo>> {
        Ok(None)
    }
}

/// Records requested waits instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Creates a shared sleeper.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns every wait requested, in order.
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().clone()
    }

    /// Returns the waits in milliseconds.
    pub fn waits_ms(&self) -> Vec<u128> {
        self.waits.lock().iter().map(Duration::as_millis).collect()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.waits.lock().push(duration);
    }
}

/// A string bind target that counts how often it is written.
#[derive(Default)]
pub struct AssignmentProbe {
    writes: Mutex<Vec<String>>,
}

impl AssignmentProbe {
    /// Creates a shared probe.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the number of writes.
    pub fn count(&self) -> usize {
        self.writes.lock().len()
    }

    /// Returns the last value written.
    pub fn last(&self) -> Option<String> {
        self.writes.lock().last().cloned()
    }

    /// Returns every value written, in order.
    pub fn history(&self) -> Vec<String> {
        self.writes.lock().clone()
    }
}

impl BindTarget for AssignmentProbe {
    fn target_type(&self) -> TargetType {
        TargetType::String
    }

    fn assign(&self, value: ConfigValue) -> Result<(), ConfigValue> {
        match value {
            ConfigValue::String(s) => {
                self.writes.lock().push(s);
                Ok(())
            }
            other => Err(other),
        }
    }
}
