//! REST management surface: pool statistics, telemetry and the operator
//! force-reconnect action.

pub mod handlers;
pub mod server;
pub mod types;

pub use server::{build_router, start_api_server};
pub use types::ApiState;
