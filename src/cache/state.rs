use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the single connection owned by a cache.
///
/// `Disconnected -> Connecting -> Available -> Borrowed`, going back to
/// `Available` when the borrower returns the connection and to
/// `Disconnected` when the connection breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    Disconnected,
    Connecting,
    Available,
    Borrowed,
}

impl CacheState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheState::Disconnected => "disconnected",
            CacheState::Connecting => "connecting",
            CacheState::Available => "available",
            CacheState::Borrowed => "borrowed",
        }
    }
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
