pub mod management;
pub mod pool;
pub mod telemetry;

pub use management::*;
pub use pool::*;
pub use telemetry::*;
