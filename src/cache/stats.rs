use super::state::CacheState;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters of one cache. Readable without taking the cache lock.
#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    connects: AtomicU64,
    borrows: AtomicU64,
    rejections: AtomicU64,
    watchdog_fires: AtomicU64,
    breaks: AtomicU64,
    factory_failures: AtomicU64,
}

impl CacheCounters {
    pub fn record_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_borrow(&self) {
        self.borrows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_watchdog_fire(&self) {
        self.watchdog_fires.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_break(&self) {
        self.breaks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_factory_failure(&self) {
        self.factory_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    pub fn borrows(&self) -> u64 {
        self.borrows.load(Ordering::Relaxed)
    }

    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }

    pub fn watchdog_fires(&self) -> u64 {
        self.watchdog_fires.load(Ordering::Relaxed)
    }

    pub fn breaks(&self) -> u64 {
        self.breaks.load(Ordering::Relaxed)
    }

    pub fn factory_failures(&self) -> u64 {
        self.factory_failures.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of a cache, as served by the management API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub address: String,
    pub state: CacheState,
    pub connects: u64,
    pub borrows: u64,
    pub rejections: u64,
    pub watchdog_fires: u64,
    pub breaks: u64,
    pub factory_failures: u64,
    /// Waiters still interested in a connection.
    pub queue_len: usize,
    /// Lease id of the current borrow, if any.
    pub lease_id: Option<u64>,
    pub closed: bool,
}
