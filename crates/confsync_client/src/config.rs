//! Client configuration.

use crate::error::{ClientError, ClientResult};
use crate::store::CacheFormat;
use confsync_protocol::PullRequest;
use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the client sync engine.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the configuration server.
    pub server_url: String,
    /// Application code used by the pull endpoint.
    pub app_code: String,
    /// Environment code used by the pull endpoint.
    pub env_code: String,
    /// Application id carried on the push channel.
    pub app_id: Option<u64>,
    /// Environment id used to filter pushed envelopes.
    pub env_id: Option<u64>,
    /// Identifier of this process, sent in the handshake.
    pub instance_id: String,
    /// Address reported in the handshake.
    pub instance_ip: String,
    /// Client version reported in the handshake.
    pub client_version: String,
    /// Interval between poll ticks.
    pub poll_interval: Duration,
    /// Whether the poll loop runs.
    pub enable_polling: bool,
    /// Whether the push session runs.
    pub enable_push: bool,
    /// Interval between push-channel heartbeats.
    pub heartbeat_interval: Duration,
    /// Whether a cache miss triggers one synchronous pull.
    pub pull_on_miss: bool,
    /// Age after which the cache is reported as expired.
    pub cache_ttl: Duration,
    /// Durable cache file, if any.
    pub cache_path: Option<PathBuf>,
    /// Durable cache format; inferred from the file extension when unset.
    pub cache_format: Option<CacheFormat>,
    /// Retry policy for pulls.
    pub retry: RetryConfig,
}

impl ClientConfig {
    /// Creates a configuration for one application environment.
    pub fn new(
        server_url: impl Into<String>,
        app_code: impl Into<String>,
        env_code: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            app_code: app_code.into(),
            env_code: env_code.into(),
            app_id: None,
            env_id: None,
            instance_id: uuid::Uuid::new_v4().to_string(),
            instance_ip: String::new(),
            client_version: "1.0.0".to_string(),
            poll_interval: Duration::from_secs(30),
            enable_polling: true,
            enable_push: true,
            heartbeat_interval: Duration::from_secs(30),
            pull_on_miss: true,
            cache_ttl: Duration::from_secs(300),
            cache_path: None,
            cache_format: None,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the numeric application and environment ids.
    pub fn with_ids(mut self, app_id: u64, env_id: u64) -> Self {
        self.app_id = Some(app_id);
        self.env_id = Some(env_id);
        self
    }

    /// Sets the instance id.
    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    /// Sets the reported instance address.
    pub fn with_instance_ip(mut self, ip: impl Into<String>) -> Self {
        self.instance_ip = ip.into();
        self
    }

    /// Sets the reported client version.
    pub fn with_client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Enables or disables the poll loop.
    pub fn with_polling(mut self, enabled: bool) -> Self {
        self.enable_polling = enabled;
        self
    }

    /// Enables or disables the push session.
    pub fn with_push(mut self, enabled: bool) -> Self {
        self.enable_push = enabled;
        self
    }

    /// Sets the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Enables or disables the pull on cache miss.
    pub fn with_pull_on_miss(mut self, enabled: bool) -> Self {
        self.pull_on_miss = enabled;
        self
    }

    /// Sets the cache expiry age.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Sets the durable cache file.
    pub fn with_cache_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Sets the durable cache format.
    pub fn with_cache_format(mut self, format: CacheFormat) -> Self {
        self.cache_format = Some(format);
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the pull request for this environment.
    pub fn pull_request(&self) -> PullRequest {
        PullRequest::new(self.app_code.clone(), self.env_code.clone())
    }

    /// Checks the configuration for unusable values.
    pub fn validate(&self) -> ClientResult<()> {
        if self.server_url.trim().is_empty() {
            return Err(ClientError::invalid_config("server url is empty"));
        }
        if self.app_code.trim().is_empty() {
            return Err(ClientError::invalid_config("app code is empty"));
        }
        if self.env_code.trim().is_empty() {
            return Err(ClientError::invalid_config("env code is empty"));
        }
        if self.instance_id.trim().is_empty() {
            return Err(ClientError::invalid_config("instance id is empty"));
        }
        if self.enable_push && self.app_id.is_none() {
            return Err(ClientError::invalid_config(
                "push is enabled but no app id is set",
            ));
        }
        if self.enable_polling && self.poll_interval.is_zero() {
            return Err(ClientError::invalid_config("poll interval is zero"));
        }
        Ok(())
    }
}

/// Retry policy for pulls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Growth factor between retries.
    pub multiplier: f64,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Whether to add up to 25% random jitter, still bounded by `max_delay`.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            multiplier: 2.0,
            max_delay: Duration::from_millis(10_000),
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Creates the default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a policy with a single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Sets the number of retries.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the multiplier.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Total attempts, the first one included.
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Calculates the wait before a given attempt (0-indexed).
    ///
    /// The first attempt never waits.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let jittered = if self.jitter {
            base + base * 0.25 * rand::thread_rng().gen::<f64>()
        } else {
            base
        };
        let secs = jittered.min(self.max_delay.as_secs_f64()).max(0.0);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}
