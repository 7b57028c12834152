//! Bounded retry with exponential backoff.

use crate::config::RetryConfig;
use crate::error::{ClientError, ClientResult, Disposition};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Waits between attempts.
pub trait Sleeper: Send + Sync {
    /// Blocks the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeps on the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// How a retried operation ended.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// An attempt succeeded.
    Succeeded {
        /// The value produced.
        value: T,
        /// Attempts made, the successful one included.
        attempts: u32,
    },
    /// Every attempt failed with a retryable error.
    Exhausted {
        /// Error of the final attempt.
        last_error: ClientError,
        /// Attempts made.
        attempts: u32,
    },
    /// An attempt failed with a terminal error.
    Aborted {
        /// The terminal error.
        error: ClientError,
        /// Attempts made.
        attempts: u32,
    },
}

impl<T> RetryOutcome<T> {
    /// Returns the number of attempts made.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. }
            | RetryOutcome::Exhausted { attempts, .. }
            | RetryOutcome::Aborted { attempts, .. } => *attempts,
        }
    }

    /// Returns true if an attempt succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Succeeded { .. })
    }

    /// Converts into a result carrying the value or the final error.
    pub fn into_result(self) -> ClientResult<T> {
        match self {
            RetryOutcome::Succeeded { value, .. } => Ok(value),
            RetryOutcome::Exhausted { last_error, .. } => Err(last_error),
            RetryOutcome::Aborted { error, .. } => Err(error),
        }
    }
}

/// Runs an operation under a [`RetryConfig`].
#[derive(Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Creates a policy that sleeps on the calling thread.
    pub fn new(config: RetryConfig) -> Self {
        Self::with_sleeper(config, Arc::new(ThreadSleeper))
    }

    /// Creates a policy with a custom sleeper.
    pub fn with_sleeper(config: RetryConfig, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { config, sleeper }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `op` until it succeeds, fails terminally, or runs out of attempts.
    ///
    /// `op` receives the 0-indexed attempt number. Every attempt is preceded
    /// by `delay_for_attempt(attempt)`, which is zero for the first.
    pub fn run<T, F>(&self, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> ClientResult<T>,
    {
        let total = self.config.total_attempts();
        let mut attempt = 0;
        loop {
            self.sleeper.sleep(self.config.delay_for_attempt(attempt));

            let error = match op(attempt) {
                Ok(value) => {
                    return RetryOutcome::Succeeded {
                        value,
                        attempts: attempt + 1,
                    }
                }
                Err(error) => error,
            };

            if error.disposition() == Disposition::Terminal {
                return RetryOutcome::Aborted {
                    error,
                    attempts: attempt + 1,
                };
            }

            attempt += 1;
            if attempt >= total {
                return RetryOutcome::Exhausted {
                    last_error: error,
                    attempts: attempt,
                };
            }
            debug!(attempt, error = %error, "retrying after transient failure");
        }
    }
}
