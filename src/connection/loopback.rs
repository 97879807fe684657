//! In-memory driver: every address is a tag store that returns what was
//! written to it. Values survive reconnects because the store belongs to the
//! driver, not to the connection.

use super::{
    BrowseRequest, BrowseResponse, Connection, ConnectionMetadata, ConnectionResult, Driver,
    ReadItem, ReadRequest, ReadResponse, ResponseCode, SubscriptionRequest, SubscriptionResponse,
    TagValue, UnsubscriptionRequest, WriteRequest, WriteResponse,
};
use crate::utils::error::ConnectionError;
use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

type TagStore = Arc<RwLock<BTreeMap<String, TagValue>>>;

#[derive(Debug, Default)]
pub struct LoopbackDriver {
    devices: DashMap<String, TagStore>,
    next_connection: AtomicU64,
    next_subscription: Arc<AtomicU64>,
}

impl LoopbackDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn store_for(&self, address: &str) -> TagStore {
        self.devices
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(BTreeMap::new())))
            .clone()
    }
}

impl Driver for LoopbackDriver {
    fn protocol_code(&self) -> &str {
        "loopback"
    }

    fn connect(&self, address: String) -> BoxFuture<'_, ConnectionResult<Arc<dyn Connection>>> {
        Box::pin(async move {
            let n = self.next_connection.fetch_add(1, Ordering::Relaxed) + 1;
            let connection = LoopbackConnection {
                id: format!("{}#{}", address, n),
                store: self.store_for(&address),
                connected: AtomicBool::new(true),
                next_subscription: Arc::clone(&self.next_subscription),
            };
            debug!("Loopback connection {} established", connection.id);
            Ok(Arc::new(connection) as Arc<dyn Connection>)
        })
    }
}

struct LoopbackConnection {
    id: String,
    store: TagStore,
    connected: AtomicBool,
    next_subscription: Arc<AtomicU64>,
}

impl LoopbackConnection {
    fn ensure_connected(&self) -> ConnectionResult<()> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ConnectionError::Transport(format!(
                "connection {} is closed",
                self.id
            )))
        }
    }
}

impl Connection for LoopbackConnection {
    fn connection_id(&self) -> String {
        self.id.clone()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn metadata(&self) -> ConnectionMetadata {
        ConnectionMetadata::ALL
    }

    fn read(&self, request: ReadRequest) -> BoxFuture<'_, ConnectionResult<ReadResponse>> {
        Box::pin(async move {
            self.ensure_connected()?;
            let store = self.store.read();
            let items = request
                .tags
                .into_iter()
                .map(|(name, address)| {
                    let item = match store.get(&address) {
                        Some(value) => ReadItem {
                            code: ResponseCode::Ok,
                            value: Some(value.clone()),
                        },
                        None => ReadItem {
                            code: ResponseCode::NotFound,
                            value: None,
                        },
                    };
                    (name, item)
                })
                .collect();
            Ok(ReadResponse { items })
        })
    }

    fn write(&self, request: WriteRequest) -> BoxFuture<'_, ConnectionResult<WriteResponse>> {
        Box::pin(async move {
            self.ensure_connected()?;
            let mut store = self.store.write();
            let mut codes = BTreeMap::new();
            for (name, item) in request.tags {
                trace!("{} <- {:?}", item.address, item.value);
                store.insert(item.address, item.value);
                codes.insert(name, ResponseCode::Ok);
            }
            Ok(WriteResponse { codes })
        })
    }

    fn browse(&self, request: BrowseRequest) -> BoxFuture<'_, ConnectionResult<BrowseResponse>> {
        Box::pin(async move {
            self.ensure_connected()?;
            let store = self.store.read();
            let results = request
                .queries
                .into_iter()
                .map(|(name, query)| {
                    let prefix = query.trim_end_matches('*');
                    let found = store
                        .keys()
                        .filter(|address| address.starts_with(prefix))
                        .cloned()
                        .collect();
                    (name, found)
                })
                .collect();
            Ok(BrowseResponse { results })
        })
    }

    fn subscribe(
        &self,
        request: SubscriptionRequest,
    ) -> BoxFuture<'_, ConnectionResult<SubscriptionResponse>> {
        Box::pin(async move {
            self.ensure_connected()?;
            let handles = request
                .tags
                .into_keys()
                .map(|name| {
                    let id = self.next_subscription.fetch_add(1, Ordering::Relaxed) + 1;
                    (name, format!("sub-{}", id))
                })
                .collect();
            Ok(SubscriptionResponse { handles })
        })
    }

    fn unsubscribe(&self, _request: UnsubscriptionRequest) -> BoxFuture<'_, ConnectionResult<()>> {
        Box::pin(async move { self.ensure_connected() })
    }

    fn ping(&self) -> BoxFuture<'_, ConnectionResult<()>> {
        Box::pin(async move { self.ensure_connected() })
    }

    fn close(&self) -> BoxFuture<'_, ConnectionResult<()>> {
        Box::pin(async move {
            if self.connected.swap(false, Ordering::AcqRel) {
                debug!("Loopback connection {} closed", self.id);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn values_survive_reconnect() {
        let driver = LoopbackDriver::new();

        let first = driver.connect("loopback://press".to_string()).await.unwrap();
        first
            .write(WriteRequest::new().tag("speed", "%MW10", TagValue::Int(1200)))
            .await
            .unwrap();
        first.close().await.unwrap();

        let second = driver.connect("loopback://press".to_string()).await.unwrap();
        assert_ne!(first.connection_id(), second.connection_id());

        let response = second
            .read(ReadRequest::new().tag("speed", "%MW10").tag("missing", "%MW99"))
            .await
            .unwrap();
        assert_eq!(response.value("speed"), Some(&TagValue::Int(1200)));
        assert_eq!(response.items["missing"].code, ResponseCode::NotFound);
    }

    #[tokio::test]
    async fn closed_connection_fails_operations() {
        let driver = LoopbackDriver::new();
        let connection = driver.connect("loopback://mixer".to_string()).await.unwrap();
        connection.close().await.unwrap();

        assert!(!connection.is_connected());
        let err = connection.read(ReadRequest::new()).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Transport(_)));
    }

    #[tokio::test]
    async fn browse_matches_prefix() {
        let driver = LoopbackDriver::new();
        let connection = driver.connect("loopback://line".to_string()).await.unwrap();
        connection
            .write(
                WriteRequest::new()
                    .tag("a", "DB1.X0", TagValue::Bool(true))
                    .tag("b", "DB1.X1", TagValue::Bool(false))
                    .tag("c", "DB2.X0", TagValue::Bool(true)),
            )
            .await
            .unwrap();

        let mut queries = BTreeMap::new();
        queries.insert("db1".to_string(), "DB1.*".to_string());
        let response = connection.browse(BrowseRequest { queries }).await.unwrap();
        assert_eq!(response.results["db1"], vec!["DB1.X0", "DB1.X1"]);
    }
}
