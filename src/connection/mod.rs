//! Boundary to the protocol drivers.
//!
//! The cache never interprets requests or responses; it only needs a
//! [`Connection`] to forward operations to and a [`ConnectionFactory`] to
//! (re-)establish one.

pub mod factory;
pub mod loopback;
pub mod types;

pub use factory::*;
pub use loopback::LoopbackDriver;
pub use types::*;

use crate::utils::error::ConnectionError;
use futures::future::BoxFuture;

pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;

/// A live connection to one remote device.
///
/// Every operation returns a boxed future so the trait stays object safe;
/// drivers are stored as `Arc<dyn Connection>`.
pub trait Connection: Send + Sync + 'static {
    /// Stable identifier of the underlying transport connection.
    fn connection_id(&self) -> String;

    fn is_connected(&self) -> bool;

    fn metadata(&self) -> ConnectionMetadata;

    fn read(&self, request: ReadRequest) -> BoxFuture<'_, ConnectionResult<ReadResponse>>;

    fn write(&self, request: WriteRequest) -> BoxFuture<'_, ConnectionResult<WriteResponse>>;

    fn browse(&self, request: BrowseRequest) -> BoxFuture<'_, ConnectionResult<BrowseResponse>>;

    fn subscribe(
        &self,
        request: SubscriptionRequest,
    ) -> BoxFuture<'_, ConnectionResult<SubscriptionResponse>>;

    fn unsubscribe(&self, request: UnsubscriptionRequest) -> BoxFuture<'_, ConnectionResult<()>>;

    fn ping(&self) -> BoxFuture<'_, ConnectionResult<()>> {
        Box::pin(async {
            Err(ConnectionError::Unsupported(
                "the connection does not support pinging".to_string(),
            ))
        })
    }

    fn close(&self) -> BoxFuture<'_, ConnectionResult<()>>;
}
