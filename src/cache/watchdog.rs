use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

/// One-shot timer bounding how long a connection may stay borrowed.
///
/// Cancelling is idempotent and racing a cancel against the timer firing is
/// harmless: the fire callback re-checks the lease id under the cache lock.
#[derive(Debug)]
pub(crate) struct Watchdog {
    lease_id: u64,
    abort: Option<AbortHandle>,
}

impl Watchdog {
    pub fn arm<F>(runtime: &Handle, lease_id: u64, after: Duration, on_fire: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = runtime.spawn(async move {
            tokio::time::sleep(after).await;
            on_fire.await;
        });

        Self {
            lease_id,
            abort: Some(task.abort_handle()),
        }
    }

    pub fn lease_id(&self) -> u64 {
        self.lease_id
    }

    pub fn cancel(&mut self) {
        if let Some(abort) = self.abort.take() {
            abort.abort();
        }
    }

    /// Forget the timer without aborting it; used from inside the fire
    /// callback itself.
    pub fn disarm(&mut self) {
        self.abort = None;
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.cancel();
    }
}
