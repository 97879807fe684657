use super::handle::{BorrowedConnection, Lease};
#[cfg(feature = "metrics")]
use super::metrics::CacheMetrics;
use super::state::CacheState;
use super::stats::{CacheCounters, CacheStats};
use super::waiter::Waiter;
use super::watchdog::Watchdog;
use crate::connection::{Connection, ConnectionFactory, ConnectionResult};
use crate::telemetry::{TelemetryHistory, TelemetrySeverity};
use crate::utils::error::{ConnectionError, RejectReason};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Timeouts applied by a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// How long `get_connection` waits in the queue.
    pub acquire_timeout: Duration,
    /// Deadline of every operation issued through a borrowed connection.
    pub request_timeout: Duration,
    /// How long a single borrow may last before the watchdog reclaims it.
    pub max_lease_time: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_millis(10_000),
            request_timeout: Duration::from_millis(5_000),
            max_lease_time: Duration::from_millis(5_000),
        }
    }
}

/// Caches the single live connection to one target address and hands it
/// out to one borrower at a time.
///
/// Cloning is cheap; all clones share the same connection, queue and
/// counters. Must be created from within a Tokio runtime: the background
/// connect, the watchdog and connection teardown run on that runtime.
#[derive(Clone)]
pub struct SingleConnectionCache {
    inner: Arc<CacheInner>,
}

pub(crate) struct CacheInner {
    address: String,
    factory: Arc<dyn ConnectionFactory>,
    settings: CacheSettings,
    runtime: Handle,
    core: Mutex<CacheCore>,
    counters: CacheCounters,
    shutdown: CancellationToken,
    telemetry: Option<TelemetryHistory>,
}

struct CacheCore {
    state: CacheState,
    active: Option<Arc<dyn Connection>>,
    lease: Option<Arc<Lease>>,
    queue: VecDeque<Waiter>,
    watchdog: Option<Watchdog>,
    next_lease_id: u64,
}

impl SingleConnectionCache {
    pub fn new(
        address: impl Into<String>,
        factory: Arc<dyn ConnectionFactory>,
        settings: CacheSettings,
    ) -> Self {
        Self::with_telemetry(address, factory, settings, None)
    }

    pub fn with_telemetry(
        address: impl Into<String>,
        factory: Arc<dyn ConnectionFactory>,
        settings: CacheSettings,
        telemetry: Option<TelemetryHistory>,
    ) -> Self {
        let inner = CacheInner {
            address: address.into(),
            factory,
            settings,
            runtime: Handle::current(),
            core: Mutex::new(CacheCore {
                state: CacheState::Disconnected,
                active: None,
                lease: None,
                queue: VecDeque::new(),
                watchdog: None,
                next_lease_id: 0,
            }),
            counters: CacheCounters::default(),
            shutdown: CancellationToken::new(),
            telemetry,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn address(&self) -> &str {
        self.inner.address()
    }

    pub fn settings(&self) -> CacheSettings {
        *self.inner.settings()
    }

    pub fn state(&self) -> CacheState {
        self.inner.core.lock().state
    }

    /// Borrow the connection, waiting up to the acquire timeout.
    ///
    /// `address` must be the address this cache was created for.
    pub async fn get_connection(&self, address: &str) -> ConnectionResult<BorrowedConnection> {
        self.inner.get_connection(address).await
    }

    /// Start establishing the connection if nothing is connected yet,
    /// without waiting for it.
    pub fn prime(&self) {
        let mut core = self.inner.core.lock();
        if !self.inner.shutdown.is_cancelled() {
            self.inner.prime_locked(&mut core);
        }
    }

    /// Operator action: drop the current connection (closing the borrowed
    /// handle, if any) and establish a new one in the background.
    pub fn trigger_reconnect(&self) {
        self.inner.trigger_reconnect();
    }

    /// Close the cache for good: queued callers fail with `Cancelled`, the
    /// connection is closed and later requests are refused.
    pub fn close(&self) {
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    /// Whether two handles share the same underlying cache.
    pub fn ptr_eq(&self, other: &SingleConnectionCache) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for SingleConnectionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleConnectionCache")
            .field("address", &self.inner.address)
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl CacheInner {
    pub(crate) fn address(&self) -> &str {
        &self.address
    }

    pub(crate) fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    async fn get_connection(
        self: &Arc<Self>,
        address: &str,
    ) -> ConnectionResult<BorrowedConnection> {
        if address != self.address {
            return Err(ConnectionError::Configuration(format!(
                "Cache for '{}' cannot serve '{}'",
                self.address, address
            )));
        }
        if self.shutdown.is_cancelled() {
            return Err(ConnectionError::Cancelled);
        }

        let receiver = {
            let mut core = self.core.lock();

            // Fast path: nobody is waiting and the connection is idle.
            if core.queue.is_empty() && core.state == CacheState::Available {
                let connection = self.acquire_locked(&mut core)?;
                trace!("Handed out idle connection to {}", self.address);
                return Ok(connection);
            }

            self.prime_locked(&mut core);

            // Callers that gave up while the cache was connecting or borrowed
            // are only popped once it is available again.
            let before = core.queue.len();
            core.queue.retain(|waiter| !waiter.is_cancelled());
            if core.queue.len() < before {
                trace!(
                    "Dropped {} abandoned waiters on {}",
                    before - core.queue.len(),
                    self.address
                );
            }

            let (waiter, receiver) = Waiter::new();
            core.queue.push_back(waiter);
            debug!(
                "Queued request for {} ({} waiting, state {})",
                self.address,
                core.queue.len(),
                core.state
            );

            // Priming may have left the connection idle if every earlier
            // waiter was already gone.
            if core.state == CacheState::Available {
                self.check_queue_locked(&mut core);
            }
            self.publish_queue_length(&core);
            receiver
        };

        let timeout = self.settings.acquire_timeout;
        let result = tokio::select! {
            biased;
            result = receiver => match result {
                Ok(result) => result,
                Err(_) => Err(ConnectionError::Cancelled),
            },
            _ = self.shutdown.cancelled() => Err(ConnectionError::Cancelled),
            _ = tokio::time::sleep(timeout) => {
                debug!("Gave up waiting for a connection to {} after {:?}", self.address, timeout);
                Err(ConnectionError::Timeout(timeout))
            }
        };

        if result.is_err() {
            let mut core = self.core.lock();
            core.queue.retain(|waiter| !waiter.is_cancelled());
            self.publish_queue_length(&core);
        }
        result
    }

    /// Acquire once and immediately give the result back. On a disconnected
    /// cache this starts the background connect; on an idle one it serves the
    /// head of the queue.
    fn prime_locked(self: &Arc<Self>, core: &mut CacheCore) {
        match self.acquire_locked(core) {
            Ok(connection) => {
                connection.disarm();
                self.release_locked(core, connection.lease_id());
                self.check_queue_locked(core);
            }
            Err(err) => trace!("Priming {}: {}", self.address, err),
        }
    }

    /// Internal acquisition, dispatched on the current state.
    fn acquire_locked(
        self: &Arc<Self>,
        core: &mut CacheCore,
    ) -> ConnectionResult<BorrowedConnection> {
        match core.state {
            CacheState::Available => match core.active.clone() {
                Some(connection) => Ok(self.borrow_locked(core, connection)),
                None => {
                    warn!(
                        "Cache for {} was available without a connection, reconnecting",
                        self.address
                    );
                    core.state = CacheState::Disconnected;
                    self.start_connect_locked(core);
                    Err(self.reject(RejectReason::Starting))
                }
            },
            CacheState::Disconnected => {
                self.start_connect_locked(core);
                Err(self.reject(RejectReason::Starting))
            }
            CacheState::Connecting => Err(self.reject(RejectReason::Connecting)),
            CacheState::Borrowed => Err(self.reject(RejectReason::InUse)),
        }
    }

    fn reject(&self, reason: RejectReason) -> ConnectionError {
        self.counters.record_rejection();
        #[cfg(feature = "metrics")]
        CacheMetrics::record_rejection(&self.address, reason.as_str());
        trace!("Rejected acquisition on {}: {}", self.address, reason);
        ConnectionError::Rejected(reason)
    }

    fn borrow_locked(
        self: &Arc<Self>,
        core: &mut CacheCore,
        connection: Arc<dyn Connection>,
    ) -> BorrowedConnection {
        core.next_lease_id += 1;
        let lease = Arc::new(Lease::new(core.next_lease_id));

        core.state = CacheState::Borrowed;
        core.lease = Some(Arc::clone(&lease));
        self.counters.record_borrow();
        #[cfg(feature = "metrics")]
        CacheMetrics::record_borrow(&self.address);

        let cache = Arc::downgrade(self);
        let lease_id = lease.id();
        core.watchdog = Some(Watchdog::arm(
            &self.runtime,
            lease_id,
            self.settings.max_lease_time,
            async move {
                if let Some(cache) = Weak::upgrade(&cache) {
                    cache.on_watchdog(lease_id);
                }
            },
        ));

        debug!("Lease {} on {} started", lease_id, self.address);
        BorrowedConnection::new(Arc::clone(self), connection, lease)
    }

    /// Back to `Available` after borrow `lease_id`. The caller runs the queue.
    fn release_locked(&self, core: &mut CacheCore, lease_id: u64) {
        if let Some(mut watchdog) = core.watchdog.take() {
            watchdog.cancel();
        }
        if core.lease.as_ref().map(|lease| lease.id()) == Some(lease_id) {
            core.lease = None;
        }
        core.state = CacheState::Available;
    }

    fn start_connect_locked(self: &Arc<Self>, core: &mut CacheCore) {
        core.state = CacheState::Connecting;
        self.counters.record_connect();
        #[cfg(feature = "metrics")]
        CacheMetrics::record_connect(&self.address);
        info!("Connecting to {}", self.address);

        let cache = Arc::clone(self);
        self.runtime.spawn(async move {
            let result = cache.factory.create().await;
            cache.on_connect_result(result);
        });
    }

    fn on_connect_result(self: &Arc<Self>, result: ConnectionResult<Arc<dyn Connection>>) {
        let mut core = self.core.lock();

        if self.shutdown.is_cancelled() || core.state != CacheState::Connecting {
            if let Ok(connection) = result {
                if self.shutdown.is_cancelled() {
                    debug!(
                        "Discarding connection {} established after shutdown",
                        connection.connection_id()
                    );
                } else {
                    debug!(
                        "Discarding connection {} to {}: cache is {} instead of connecting",
                        connection.connection_id(),
                        self.address,
                        core.state
                    );
                }
                self.close_in_background(connection);
            }
            return;
        }

        match result {
            Ok(connection) => {
                info!(
                    "Connected to {} ({})",
                    self.address,
                    connection.connection_id()
                );
                core.active = Some(connection);
                core.state = CacheState::Available;
                self.check_queue_locked(&mut core);
            }
            Err(err) => {
                warn!("Connecting to {} failed: {}", self.address, err);
                core.state = CacheState::Disconnected;
                self.counters.record_factory_failure();

                let message = err.to_string();
                let failed = core.queue.len();
                for waiter in core.queue.drain(..) {
                    waiter.fail(ConnectionError::FactoryFailed(message.clone()));
                }
                self.record(
                    TelemetrySeverity::Error,
                    format!("Connecting to {} failed", self.address),
                    json!({ "error": message, "failed_waiters": failed }),
                );
            }
        }
        self.publish_queue_length(&core);
    }

    /// Serve the oldest live waiter while the connection is idle.
    fn check_queue_locked(self: &Arc<Self>, core: &mut CacheCore) {
        while core.state == CacheState::Available {
            let Some(waiter) = core.queue.pop_front() else {
                break;
            };
            if waiter.is_cancelled() {
                trace!(
                    "Skipping cancelled waiter on {} (waited {:?})",
                    self.address,
                    waiter.waited()
                );
                continue;
            }

            match self.acquire_locked(core) {
                Ok(connection) => {
                    let waited = waiter.waited();
                    match waiter.complete(connection) {
                        None => {
                            debug!(
                                "Served queued request on {} after {:?}",
                                self.address, waited
                            );
                            break;
                        }
                        Some(connection) => {
                            // The waiter gave up between the check and the send.
                            connection.disarm();
                            self.release_locked(core, connection.lease_id());
                        }
                    }
                }
                Err(err) => {
                    debug!("Could not serve queued request on {}: {}", self.address, err);
                    core.queue.push_front(waiter);
                    break;
                }
            }
        }
    }

    pub(crate) fn return_connection(self: &Arc<Self>, lease: &Lease) {
        let mut core = self.core.lock();

        let current = core.lease.as_ref().map(|current| current.id());
        if current != Some(lease.id()) {
            // Already reclaimed by the watchdog, a break or a reconnect.
            debug!(
                "Ignoring return of stale lease {} on {} (state {})",
                lease.id(),
                self.address,
                core.state
            );
            return;
        }
        if core.state == CacheState::Disconnected {
            return;
        }

        self.release_locked(&mut core, lease.id());
        self.check_queue_locked(&mut core);
        self.publish_queue_length(&core);
    }

    /// Tear down the connection after a failed operation. `lease` is the
    /// borrow that observed the failure; a stale lease is ignored.
    pub(crate) fn handle_broken_connection(&self, lease: &Lease) {
        let mut core = self.core.lock();

        let current = core.lease.as_ref().map(|current| current.id());
        if current != Some(lease.id()) {
            debug!(
                "Ignoring break reported by stale lease {} on {}",
                lease.id(),
                self.address
            );
            return;
        }

        self.break_locked(&mut core, "operation failed");
    }

    fn break_locked(&self, core: &mut CacheCore, reason: &str) {
        if let Some(mut watchdog) = core.watchdog.take() {
            watchdog.cancel();
        }
        if let Some(lease) = core.lease.take() {
            lease.close();
        }
        if let Some(connection) = core.active.take() {
            self.close_in_background(connection);
        }

        let previous = core.state;
        core.state = CacheState::Disconnected;
        self.counters.record_break();
        #[cfg(feature = "metrics")]
        CacheMetrics::record_break(&self.address);

        warn!(
            "Connection to {} broken ({}), {} -> disconnected",
            self.address, reason, previous
        );
        self.record(
            TelemetrySeverity::Warning,
            format!("Connection to {} discarded", self.address),
            json!({ "reason": reason, "previous_state": previous.as_str() }),
        );
    }

    fn on_watchdog(&self, lease_id: u64) {
        let mut core = self.core.lock();

        if core.state != CacheState::Borrowed
            || core.lease.as_ref().map(|lease| lease.id()) != Some(lease_id)
        {
            trace!("Watchdog for stale lease {} on {}", lease_id, self.address);
            return;
        }
        if core.watchdog.as_ref().map(Watchdog::lease_id) == Some(lease_id) {
            if let Some(mut watchdog) = core.watchdog.take() {
                watchdog.disarm();
            }
        }

        self.counters.record_watchdog_fire();
        #[cfg(feature = "metrics")]
        CacheMetrics::record_watchdog_fire(&self.address);
        warn!(
            "Lease {} on {} exceeded {:?}, reclaiming connection",
            lease_id, self.address, self.settings.max_lease_time
        );
        self.break_locked(&mut core, "lease watchdog expired");
    }

    fn trigger_reconnect(self: &Arc<Self>) {
        let mut core = self.core.lock();
        if self.shutdown.is_cancelled() {
            return;
        }

        match core.state {
            CacheState::Connecting => {
                info!("Reconnect requested for {} while already connecting", self.address);
            }
            CacheState::Disconnected => {
                info!("Reconnect requested for {}", self.address);
                self.start_connect_locked(&mut core);
            }
            CacheState::Available | CacheState::Borrowed => {
                info!("Reconnect requested for {}, dropping current connection", self.address);
                self.break_locked(&mut core, "reconnect requested");
                self.start_connect_locked(&mut core);
            }
        }
    }

    fn close(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();

        let mut core = self.core.lock();
        for waiter in core.queue.drain(..) {
            waiter.fail(ConnectionError::Cancelled);
        }
        if let Some(mut watchdog) = core.watchdog.take() {
            watchdog.cancel();
        }
        if let Some(lease) = core.lease.take() {
            lease.close();
        }
        if let Some(connection) = core.active.take() {
            self.close_in_background(connection);
        }
        core.state = CacheState::Disconnected;
        self.publish_queue_length(&core);
        info!("Connection cache for {} closed", self.address);
    }

    fn stats(&self) -> CacheStats {
        let core = self.core.lock();
        CacheStats {
            address: self.address.clone(),
            state: core.state,
            connects: self.counters.connects(),
            borrows: self.counters.borrows(),
            rejections: self.counters.rejections(),
            watchdog_fires: self.counters.watchdog_fires(),
            breaks: self.counters.breaks(),
            factory_failures: self.counters.factory_failures(),
            queue_len: live_waiters(&core),
            lease_id: core.lease.as_ref().map(|lease| lease.id()),
            closed: self.shutdown.is_cancelled(),
        }
    }

    fn close_in_background(&self, connection: Arc<dyn Connection>) {
        self.runtime.spawn(async move {
            if let Err(err) = connection.close().await {
                debug!(
                    "Error closing connection {}: {}",
                    connection.connection_id(),
                    err
                );
            }
        });
    }

    fn record(&self, severity: TelemetrySeverity, message: String, details: serde_json::Value) {
        if let Some(history) = self.telemetry.clone() {
            let address = self.address.clone();
            self.runtime.spawn(async move {
                let mut details = details;
                details["address"] = json!(address);
                history
                    .record_event(severity, "connection", message, Some(details))
                    .await;
            });
        }
    }

    #[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
    fn publish_queue_length(&self, core: &CacheCore) {
        #[cfg(feature = "metrics")]
        CacheMetrics::set_queue_length(&self.address, live_waiters(core));
    }
}

fn live_waiters(core: &CacheCore) -> usize {
    core.queue.iter().filter(|waiter| !waiter.is_cancelled()).count()
}
