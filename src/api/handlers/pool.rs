use crate::api::types::{ApiState, ErrorResponse, ReconnectResponse};
use crate::cache::CacheStats;
use crate::pool::PoolStats;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

/// GET /api/pool/stats - every cache in the pool
pub async fn get_pool_stats(State(state): State<ApiState>) -> (StatusCode, Json<PoolStats>) {
    (StatusCode::OK, Json(state.pool.stats()))
}

/// GET /api/pool/caches/{address} - one cache, address URL-encoded
pub async fn get_cache_stats(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Result<Json<CacheStats>, (StatusCode, Json<ErrorResponse>)> {
    state.pool.cache_stats(&address).map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!(
                "No connection cache for '{}'",
                address
            ))),
        )
    })
}

/// POST /api/pool/caches/{address}/reconnect - drop and re-establish the connection
pub async fn reconnect_cache(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> (StatusCode, Json<ReconnectResponse>) {
    match state.pool.trigger_reconnect(&address) {
        Ok(()) => {
            info!("Operator requested reconnect of {}", address);
            let response = ReconnectResponse {
                success: true,
                message: format!("Reconnect of {} triggered", address),
                stats: state.pool.cache_stats(&address),
            };
            (StatusCode::OK, Json(response))
        }
        Err(e) => {
            let response = ReconnectResponse {
                success: false,
                message: e.to_string(),
                stats: None,
            };
            (StatusCode::NOT_FOUND, Json(response))
        }
    }
}
