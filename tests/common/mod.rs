//! Scriptable device used by the integration tests.
#![allow(dead_code)]

use futures::future::BoxFuture;
use parking_lot::Mutex;
use plccache::connection::{
    BrowseRequest, BrowseResponse, Connection, ConnectionFactory, ConnectionMetadata,
    ConnectionResult, Driver, ReadRequest, ReadResponse, SubscriptionRequest,
    SubscriptionResponse, UnsubscriptionRequest, WriteRequest, WriteResponse,
};
use plccache::ConnectionError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How the device answers requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
    Hang,
}

#[derive(Debug)]
pub struct MockDevice {
    behavior: Mutex<Behavior>,
    connect_delay: Mutex<Duration>,
    fail_connect: AtomicBool,
    attempts: AtomicUsize,
    creates: AtomicUsize,
    closes: AtomicUsize,
}

impl MockDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(Behavior::Succeed),
            connect_delay: Mutex::new(Duration::ZERO),
            fail_connect: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            creates: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        })
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock() = delay;
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Connect attempts, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Connections successfully created.
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub async fn connect(self: Arc<Self>) -> ConnectionResult<Arc<dyn Connection>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ConnectionError::Transport("connection refused".to_string()));
        }

        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Arc::new(MockConnection {
            id: format!("mock#{}", n),
            device: self,
            closed: AtomicBool::new(false),
        }))
    }

    pub fn factory(self: &Arc<Self>) -> Arc<dyn ConnectionFactory> {
        Arc::new(MockFactory {
            device: Arc::clone(self),
        })
    }

    pub fn driver(self: &Arc<Self>) -> Arc<dyn Driver> {
        Arc::new(MockDriver {
            device: Arc::clone(self),
        })
    }
}

struct MockFactory {
    device: Arc<MockDevice>,
}

impl ConnectionFactory for MockFactory {
    fn create(&self) -> BoxFuture<'_, ConnectionResult<Arc<dyn Connection>>> {
        Box::pin(Arc::clone(&self.device).connect())
    }
}

struct MockDriver {
    device: Arc<MockDevice>,
}

impl Driver for MockDriver {
    fn protocol_code(&self) -> &str {
        "mock"
    }

    fn connect(&self, _address: String) -> BoxFuture<'_, ConnectionResult<Arc<dyn Connection>>> {
        Box::pin(Arc::clone(&self.device).connect())
    }
}

struct MockConnection {
    id: String,
    device: Arc<MockDevice>,
    closed: AtomicBool,
}

impl MockConnection {
    fn respond<T: Send + 'static>(&self, value: T) -> BoxFuture<'_, ConnectionResult<T>> {
        let behavior = *self.device.behavior.lock();
        Box::pin(async move {
            match behavior {
                Behavior::Succeed => Ok(value),
                Behavior::Fail => Err(ConnectionError::Transport("device reset".to_string())),
                Behavior::Hang => futures::future::pending().await,
            }
        })
    }
}

impl Connection for MockConnection {
    fn connection_id(&self) -> String {
        self.id.clone()
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn metadata(&self) -> ConnectionMetadata {
        ConnectionMetadata {
            can_read: true,
            can_write: true,
            can_subscribe: false,
            can_browse: false,
        }
    }

    fn read(&self, _request: ReadRequest) -> BoxFuture<'_, ConnectionResult<ReadResponse>> {
        self.respond(ReadResponse::default())
    }

    fn write(&self, _request: WriteRequest) -> BoxFuture<'_, ConnectionResult<WriteResponse>> {
        self.respond(WriteResponse::default())
    }

    fn browse(&self, _request: BrowseRequest) -> BoxFuture<'_, ConnectionResult<BrowseResponse>> {
        self.respond(BrowseResponse::default())
    }

    fn subscribe(
        &self,
        _request: SubscriptionRequest,
    ) -> BoxFuture<'_, ConnectionResult<SubscriptionResponse>> {
        self.respond(SubscriptionResponse::default())
    }

    fn unsubscribe(&self, _request: UnsubscriptionRequest) -> BoxFuture<'_, ConnectionResult<()>> {
        self.respond(())
    }

    fn close(&self) -> BoxFuture<'_, ConnectionResult<()>> {
        Box::pin(async move {
            if !self.closed.swap(true, Ordering::SeqCst) {
                self.device.closes.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        })
    }
}

/// Poll `condition` on 1ms ticks until it holds.
pub async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..2000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Underlying connection id of a borrowed connection id (`<inner>-<lease>`).
pub fn inner_id(connection_id: &str) -> &str {
    connection_id
        .rsplit_once('-')
        .map(|(inner, _)| inner)
        .unwrap_or(connection_id)
}
