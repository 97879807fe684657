use super::handle::BorrowedConnection;
use crate::connection::ConnectionResult;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

pub(crate) type WaiterReceiver = oneshot::Receiver<ConnectionResult<BorrowedConnection>>;

/// A caller parked in the cache queue.
///
/// The caller owns the receiving half; once it gives up (timeout, shutdown
/// or dropped future) the receiver is gone and the waiter counts as
/// cancelled.
pub(crate) struct Waiter {
    sender: oneshot::Sender<ConnectionResult<BorrowedConnection>>,
    enqueued_at: Instant,
}

impl Waiter {
    pub fn new() -> (Self, WaiterReceiver) {
        let (sender, receiver) = oneshot::channel();
        let waiter = Self {
            sender,
            enqueued_at: Instant::now(),
        };
        (waiter, receiver)
    }

    pub fn is_cancelled(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn waited(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    /// Hand the connection to the waiter. Returns it back if the waiter went
    /// away in the meantime.
    pub fn complete(self, connection: BorrowedConnection) -> Option<BorrowedConnection> {
        match self.sender.send(Ok(connection)) {
            Ok(()) => None,
            Err(Ok(connection)) => Some(connection),
            Err(Err(_)) => None,
        }
    }

    pub fn fail(self, error: crate::utils::error::ConnectionError) {
        let _ = self.sender.send(Err(error));
    }
}
