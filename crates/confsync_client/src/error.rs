//! Error types for the client.

use confsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Result type for binding operations.
pub type BindingResult<T> = Result<T, BindingError>;

/// Whether a failed operation is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Try again after backing off.
    Retryable,
    /// Stop; another attempt would fail the same way.
    Terminal,
}

/// Why one pull attempt failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PullFailure {
    /// The server answered with a non-success status.
    #[error("server returned status {code}: {message}")]
    Status {
        /// Status code.
        code: u16,
        /// Message from the response body.
        message: String,
    },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl PullFailure {
    /// Classifies the failure.
    ///
    /// Transport errors and 5xx statuses are transient. Client errors and
    /// undecodable bodies will not fix themselves.
    pub fn disposition(&self) -> Disposition {
        match self {
            PullFailure::Transport(_) => Disposition::Retryable,
            PullFailure::Status { code, .. } if *code >= 500 => Disposition::Retryable,
            PullFailure::Status { .. } | PullFailure::Decode(_) => Disposition::Terminal,
        }
    }
}

/// Errors raised by the sync engine and its collaborators.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A pull failed.
    #[error("pull failed: {0}")]
    Pull(#[from] PullFailure),

    /// The client configuration is unusable.
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),

    /// The durable cache could not be read or written.
    #[error("cache store error: {0}")]
    CacheStore(String),

    /// A wire message could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// An I/O error outside the cache store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Creates a cache store error.
    pub fn cache_store(message: impl Into<String>) -> Self {
        Self::CacheStore(message.into())
    }

    /// Creates a transport failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Pull(PullFailure::Transport(message.into()))
    }

    /// Creates a status failure.
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::Pull(PullFailure::Status {
            code,
            message: message.into(),
        })
    }

    /// Classifies the error for retry.
    pub fn disposition(&self) -> Disposition {
        match self {
            ClientError::Pull(failure) => failure.disposition(),
            _ => Disposition::Terminal,
        }
    }

    /// Returns true if another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        self.disposition() == Disposition::Retryable
    }
}

/// Errors raised while binding configuration to values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// A required binding has no cache value and no default.
    #[error("missing required configuration: {key}")]
    MissingRequiredConfig {
        /// Fully qualified key.
        key: String,
    },

    /// A value could not be converted to the bound type.
    #[error("cannot convert {key}={value:?} to {target}")]
    ConversionFailure {
        /// Fully qualified key.
        key: String,
        /// Raw value.
        value: String,
        /// Name of the target type.
        target: String,
    },
}

impl BindingError {
    /// Creates a conversion failure.
    pub fn conversion(key: &str, value: &str, target: impl Into<String>) -> Self {
        Self::ConversionFailure {
            key: key.to_string(),
            value: value.to_string(),
            target: target.into(),
        }
    }

    /// Returns the key the error concerns.
    pub fn key(&self) -> &str {
        match self {
            BindingError::MissingRequiredConfig { key } => key,
            BindingError::ConversionFailure { key, .. } => key,
        }
    }
}
