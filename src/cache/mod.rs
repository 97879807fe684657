//! Single-connection cache: one live connection per target address, lent
//! to one borrower at a time.

pub mod handle;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod single;
pub mod state;
pub mod stats;
mod waiter;
mod watchdog;

pub use handle::BorrowedConnection;
pub use single::{CacheSettings, SingleConnectionCache};
pub use state::CacheState;
pub use stats::CacheStats;
