use crate::cache::CacheStats;
use crate::pool::ConnectionPool;
use crate::telemetry::TelemetryHistory;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Shared state of every API handler.
#[derive(Clone)]
pub struct ApiState {
    pub pool: Arc<ConnectionPool>,
    pub telemetry: Option<TelemetryHistory>,
    pub start_time: Instant,
}

impl ApiState {
    pub fn new(pool: Arc<ConnectionPool>, telemetry: Option<TelemetryHistory>) -> Self {
        Self {
            pool,
            telemetry,
            start_time: Instant::now(),
        }
    }
}

/// API health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub caches: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Result of an operator reconnect request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReconnectResponse {
    pub success: bool,
    pub message: String,
    pub stats: Option<CacheStats>,
}
