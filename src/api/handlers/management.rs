use crate::api::types::{ApiState, HealthResponse};
use axum::{extract::State, http::StatusCode, Json};
use std::fmt::Write;

/// GET /health - Health check endpoint
pub async fn health_check(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    let status = if state.pool.is_closed() {
        "closed"
    } else {
        "healthy"
    };
    let response = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        caches: state.pool.len(),
    };

    (StatusCode::OK, Json(response))
}

/// GET /metrics - Prometheus text exposition of the pool
pub async fn get_metrics(State(state): State<ApiState>) -> (StatusCode, String) {
    let stats = state.pool.stats();

    let mut metrics = format!(
        "# HELP plccache_caches Connection caches known to the pool\n\
         # TYPE plccache_caches gauge\n\
         plccache_caches {}\n\
         # HELP plccache_caches_borrowed Caches whose connection is currently borrowed\n\
         # TYPE plccache_caches_borrowed gauge\n\
         plccache_caches_borrowed {}\n\
         # HELP plccache_caches_disconnected Caches without a connection\n\
         # TYPE plccache_caches_disconnected gauge\n\
         plccache_caches_disconnected {}\n\
         # HELP plccache_waiters Callers waiting for a connection\n\
         # TYPE plccache_waiters gauge\n\
         plccache_waiters {}\n",
        stats.total_caches, stats.borrowed, stats.disconnected, stats.queued
    );

    #[cfg(feature = "metrics")]
    {
        let encoder = prometheus::TextEncoder::new();
        if let Err(e) = encoder.encode_utf8(&prometheus::gather(), &mut metrics) {
            let _ = writeln!(metrics, "# failed to encode registry: {}", e);
        }
    }
    #[cfg(not(feature = "metrics"))]
    for cache in &stats.caches {
        let _ = writeln!(
            metrics,
            "plccache_borrows_total{{address=\"{}\"}} {}",
            cache.address, cache.borrows
        );
    }

    (StatusCode::OK, metrics)
}
