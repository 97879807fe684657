//! Registry of connection caches keyed by target address.

use crate::cache::{BorrowedConnection, CacheSettings, CacheState, CacheStats, SingleConnectionCache};
use crate::config::CacheConfig;
use crate::connection::{ConnectionResult, DriverRegistry};
use crate::telemetry::TelemetryHistory;
use crate::utils::error::ConnectionError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Hands out connections to any number of target addresses, one
/// [`SingleConnectionCache`] per address.
///
/// Caches are created on first use and live as long as the pool; a broken
/// cache resets itself in place. Must be used from within a Tokio runtime.
pub struct ConnectionPool {
    registry: DriverRegistry,
    settings: CacheSettings,
    caches: DashMap<String, SingleConnectionCache>,
    telemetry: Option<TelemetryHistory>,
    closed: AtomicBool,
}

impl ConnectionPool {
    pub fn new(registry: DriverRegistry, settings: CacheSettings) -> Self {
        Self {
            registry,
            settings,
            caches: DashMap::new(),
            telemetry: None,
            closed: AtomicBool::new(false),
        }
    }

    pub fn builder(registry: DriverRegistry) -> PoolBuilder {
        PoolBuilder::new(registry)
    }

    pub fn settings(&self) -> CacheSettings {
        self.settings
    }

    /// Borrow the connection for `address`, waiting up to the acquire timeout.
    pub async fn get_connection(&self, address: &str) -> ConnectionResult<BorrowedConnection> {
        let cache = self.cache_for(address)?;
        cache.get_connection(address).await
    }

    /// The cache serving `address`, created on first request.
    pub fn cache_for(&self, address: &str) -> ConnectionResult<SingleConnectionCache> {
        if self.is_closed() {
            return Err(ConnectionError::Cancelled);
        }

        let cache = match self.caches.entry(address.to_string()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let factory = self.registry.factory_for(address)?;
                debug!("Creating connection cache for {}", address);
                let cache = SingleConnectionCache::with_telemetry(
                    address,
                    factory,
                    self.settings,
                    self.telemetry.clone(),
                );
                entry.insert(cache).clone()
            }
        };

        // `close` may have run between the check above and the insert and
        // missed the new entry.
        if self.is_closed() {
            cache.close();
            return Err(ConnectionError::Cancelled);
        }
        Ok(cache)
    }

    /// Start connecting to `address` without waiting for the connection.
    pub fn prewarm(&self, address: &str) -> ConnectionResult<()> {
        let cache = self.cache_for(address)?;
        if cache.state() == CacheState::Disconnected {
            info!("Prewarming connection to {}", address);
            cache.prime();
        }
        Ok(())
    }

    /// Operator action: force the connection of a known address to be
    /// re-established.
    pub fn trigger_reconnect(&self, address: &str) -> ConnectionResult<()> {
        let cache = self
            .caches
            .get(address)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                ConnectionError::Configuration(format!("No connection cache for '{}'", address))
            })?;
        cache.trigger_reconnect();
        Ok(())
    }

    pub fn cache_stats(&self, address: &str) -> Option<CacheStats> {
        self.caches.get(address).map(|entry| entry.value().stats())
    }

    pub fn stats(&self) -> PoolStats {
        let mut caches: Vec<CacheStats> = self
            .caches
            .iter()
            .map(|entry| entry.value().stats())
            .collect();
        caches.sort_by(|a, b| a.address.cmp(&b.address));
        PoolStats::from_caches(caches, self.settings)
    }

    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.caches.iter().map(|e| e.key().clone()).collect();
        addresses.sort();
        addresses
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    /// Close every cache. Waiting and future callers get `Cancelled`.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for entry in self.caches.iter() {
            entry.value().close();
        }
        info!("Connection pool closed ({} caches)", self.caches.len());
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .field("caches", &self.caches.len())
            .finish()
    }
}

pub struct PoolBuilder {
    registry: DriverRegistry,
    settings: CacheSettings,
    telemetry: Option<TelemetryHistory>,
}

impl PoolBuilder {
    pub fn new(registry: DriverRegistry) -> Self {
        Self {
            registry,
            settings: CacheSettings::default(),
            telemetry: None,
        }
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.settings.acquire_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.settings.request_timeout = timeout;
        self
    }

    pub fn max_lease_time(mut self, max: Duration) -> Self {
        self.settings.max_lease_time = max;
        self
    }

    pub fn config(mut self, config: &CacheConfig) -> Self {
        self.settings = CacheSettings::from(config);
        self
    }

    pub fn telemetry(mut self, history: TelemetryHistory) -> Self {
        self.telemetry = Some(history);
        self
    }

    pub fn build(self) -> ConnectionPool {
        let mut pool = ConnectionPool::new(self.registry, self.settings);
        pool.telemetry = self.telemetry;
        pool
    }
}

/// Snapshot of every cache in the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStats {
    pub total_caches: usize,
    pub borrowed: usize,
    pub available: usize,
    pub connecting: usize,
    pub disconnected: usize,
    pub queued: usize,
    pub acquire_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub max_lease_ms: u64,
    pub caches: Vec<CacheStats>,
}

impl PoolStats {
    fn from_caches(caches: Vec<CacheStats>, settings: CacheSettings) -> Self {
        let count = |state: CacheState| caches.iter().filter(|c| c.state == state).count();
        Self {
            total_caches: caches.len(),
            borrowed: count(CacheState::Borrowed),
            available: count(CacheState::Available),
            connecting: count(CacheState::Connecting),
            disconnected: count(CacheState::Disconnected),
            queued: caches.iter().map(|c| c.queue_len).sum(),
            acquire_timeout_ms: settings.acquire_timeout.as_millis() as u64,
            request_timeout_ms: settings.request_timeout.as_millis() as u64,
            max_lease_ms: settings.max_lease_time.as_millis() as u64,
            caches,
        }
    }
}
