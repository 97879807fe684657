use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::api::handlers::{
    get_cache_stats, get_metrics, get_pool_stats, get_telemetry_events, health_check,
    reconnect_cache,
};
use crate::api::types::ApiState;
use crate::config::ApiConfig;
use crate::utils::error::{PlcCacheError, Result};

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .route("/api/pool/stats", get(get_pool_stats))
        .route("/api/pool/caches/{address}", get(get_cache_stats))
        .route("/api/pool/caches/{address}/reconnect", post(reconnect_cache))
        .route("/api/telemetry/events", get(get_telemetry_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the management API and serve it on a background task.
pub async fn start_api_server(config: &ApiConfig, state: ApiState) -> Result<JoinHandle<()>> {
    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.bind_port)
        .parse()
        .map_err(|e| PlcCacheError::Config(format!("Invalid API bind address: {}", e)))?;

    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!("Management API listening on http://{}", local_addr);

    let router = build_router(state);
    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router).await {
            error!("Management API error: {}", err);
        }
    });

    Ok(handle)
}
