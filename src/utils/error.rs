use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Why the cache refused an internal acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The cache was disconnected; a background connect has just been started.
    Starting,
    /// A background connect is already in flight.
    Connecting,
    /// The single connection is currently borrowed.
    InUse,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Starting => "starting",
            RejectReason::Connecting => "connecting",
            RejectReason::InUse => "in-use",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the connection cache, the pool and borrowed connections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection request rejected ({0})")]
    Rejected(RejectReason),

    #[error("Connection factory failed: {0}")]
    FactoryFailed(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Connection request cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl ConnectionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConnectionError::Timeout(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, ConnectionError::Rejected(_))
    }
}

#[derive(Debug, Error)]
pub enum PlcCacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

pub type Result<T> = std::result::Result<T, PlcCacheError>;
