use super::single::CacheInner;
use crate::connection::{
    BrowseRequest, BrowseResponse, Connection, ConnectionMetadata, ConnectionResult,
    ReadRequest, ReadResponse, SubscriptionRequest, SubscriptionResponse, UnsubscriptionRequest,
    WriteRequest, WriteResponse,
};
use crate::utils::error::ConnectionError;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// One borrow of the cached connection.
///
/// Shared between the handle and the cache so the watchdog can invalidate a
/// handle it never sees.
#[derive(Debug)]
pub(crate) struct Lease {
    id: u64,
    closed: AtomicBool,
}

impl Lease {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark the lease closed. Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }
}

/// Exclusive access to the cached connection of one target address.
///
/// Every operation is checked against the closed flag, raced against the
/// request timeout and, if it fails for any reason, invalidates the handle
/// and reports the connection as broken to the cache.
///
/// Call [`close`](Self::close) when done. Dropping the handle closes it as
/// well; a handle that is neither closed nor dropped is reclaimed by the
/// cache watchdog.
pub struct BorrowedConnection {
    cache: Arc<CacheInner>,
    connection: Arc<dyn Connection>,
    lease: Arc<Lease>,
}

impl BorrowedConnection {
    pub(crate) fn new(
        cache: Arc<CacheInner>,
        connection: Arc<dyn Connection>,
        lease: Arc<Lease>,
    ) -> Self {
        Self {
            cache,
            connection,
            lease,
        }
    }

    pub fn address(&self) -> &str {
        self.cache.address()
    }

    pub fn lease_id(&self) -> u64 {
        self.lease.id()
    }

    /// `<underlying connection id>-<lease id>`.
    pub fn connection_id(&self) -> String {
        format!("{}-{}", self.connection.connection_id(), self.lease.id())
    }

    pub fn is_closed(&self) -> bool {
        self.lease.is_closed()
    }

    pub fn is_connected(&self) -> bool {
        !self.is_closed() && self.connection.is_connected()
    }

    pub fn metadata(&self) -> ConnectionMetadata {
        if self.is_closed() {
            ConnectionMetadata::NONE
        } else {
            self.connection.metadata()
        }
    }

    pub fn can_read(&self) -> bool {
        self.metadata().can_read
    }

    pub fn can_write(&self) -> bool {
        self.metadata().can_write
    }

    pub fn can_subscribe(&self) -> bool {
        self.metadata().can_subscribe
    }

    pub fn can_browse(&self) -> bool {
        self.metadata().can_browse
    }

    pub async fn read(&self, request: ReadRequest) -> ConnectionResult<ReadResponse> {
        self.ensure_open("read")?;
        self.guarded("read", self.connection.read(request)).await
    }

    pub async fn write(&self, request: WriteRequest) -> ConnectionResult<WriteResponse> {
        self.ensure_open("write")?;
        self.guarded("write", self.connection.write(request)).await
    }

    pub async fn browse(&self, request: BrowseRequest) -> ConnectionResult<BrowseResponse> {
        self.ensure_open("browse")?;
        self.guarded("browse", self.connection.browse(request)).await
    }

    pub async fn subscribe(
        &self,
        request: SubscriptionRequest,
    ) -> ConnectionResult<SubscriptionResponse> {
        self.ensure_open("subscribe")?;
        self.guarded("subscribe", self.connection.subscribe(request))
            .await
    }

    pub async fn unsubscribe(&self, request: UnsubscriptionRequest) -> ConnectionResult<()> {
        self.ensure_open("unsubscribe")?;
        self.guarded("unsubscribe", self.connection.unsubscribe(request))
            .await
    }

    pub async fn ping(&self) -> ConnectionResult<()> {
        self.ensure_open("ping")?;
        self.guarded("ping", self.connection.ping()).await
    }

    /// Give the connection back to the cache. Idempotent.
    pub fn close(&self) {
        if self.lease.close() {
            debug!(
                "Returning connection {} (lease {}) to the cache",
                self.connection.connection_id(),
                self.lease.id()
            );
            self.cache.return_connection(&self.lease);
        }
    }

    /// Close the handle without returning the connection. Only used by the
    /// cache while it already holds its own lock.
    pub(crate) fn disarm(&self) {
        self.lease.close();
    }

    fn ensure_open(&self, operation: &str) -> ConnectionResult<()> {
        trace!("Trying to execute {} on lease {}", operation, self.lease.id());
        if self.lease.is_closed() {
            return Err(ConnectionError::IllegalState(format!(
                "cannot {} on a closed connection",
                operation
            )));
        }
        Ok(())
    }

    async fn guarded<T>(
        &self,
        operation: &'static str,
        request: BoxFuture<'_, ConnectionResult<T>>,
    ) -> ConnectionResult<T> {
        let deadline = self.cache.settings().request_timeout;

        let result = match tokio::time::timeout(deadline, request).await {
            Ok(result) => result,
            Err(_) => {
                debug!(
                    "Timing out {} request on {} after {:?}",
                    operation,
                    self.address(),
                    deadline
                );
                Err(ConnectionError::Timeout(deadline))
            }
        };

        if let Err(err) = &result {
            warn!(
                "{} request on {} failed, reporting connection as broken: {}",
                operation,
                self.address(),
                err
            );
            self.invalidate();
        }

        result
    }

    fn invalidate(&self) {
        if self.lease.close() {
            self.cache.handle_broken_connection(&self.lease);
        }
    }
}

impl Drop for BorrowedConnection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for BorrowedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BorrowedConnection")
            .field("address", &self.address())
            .field("lease_id", &self.lease.id())
            .field("closed", &self.lease.is_closed())
            .finish()
    }
}
