// plccache - connection cache and pool for industrial protocol clients

pub mod api;
pub mod cache;
pub mod config;
pub mod connection;
pub mod pool;
pub mod telemetry;
pub mod utils;

// Re-export commonly used types
pub use cache::{BorrowedConnection, CacheSettings, CacheState, CacheStats, SingleConnectionCache};
pub use connection::{Connection, ConnectionFactory, Driver, DriverRegistry};
pub use pool::{ConnectionPool, PoolStats};
pub use utils::error::{ConnectionError, PlcCacheError, RejectReason, Result};
