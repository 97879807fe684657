mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::MockDevice;
use plccache::api::{build_router, ApiState};
use plccache::telemetry::TelemetryHistory;
use plccache::{ConnectionPool, DriverRegistry};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

fn test_state() -> ApiState {
    let telemetry = TelemetryHistory::new(100, 24);
    let pool = ConnectionPool::builder(DriverRegistry::with_builtin_drivers())
        .telemetry(telemetry.clone())
        .build();
    ApiState::new(Arc::new(pool), Some(telemetry))
}

async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let state = test_state();
    state.pool.prewarm("loopback://demo").unwrap();

    let (status, health) = send(build_router(state), "GET", "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert!(health["version"].is_string());
    assert_eq!(health["caches"], 1);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let state = test_state();
    let connection = state.pool.get_connection("loopback://metrics").await.unwrap();
    connection.close();

    let response = build_router(state)
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics.contains("plccache_caches 1"));
    assert!(metrics.contains("plccache_caches_borrowed 0"));
    assert!(metrics.contains("plccache_borrows_total"));
}

#[tokio::test]
async fn test_pool_stats_endpoint() {
    let state = test_state();
    let _held = state.pool.get_connection("loopback://a").await.unwrap();
    state.pool.prewarm("loopback://b").unwrap();

    let (status, stats) = send(build_router(state), "GET", "/api/pool/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_caches"], 2);
    assert_eq!(stats["borrowed"], 1);
    assert_eq!(stats["acquire_timeout_ms"], 10_000);
    assert_eq!(stats["caches"][0]["address"], "loopback://a");
    assert_eq!(stats["caches"][0]["state"], "borrowed");
}

#[tokio::test]
async fn test_cache_stats_with_encoded_address() {
    let state = test_state();
    let connection = state.pool.get_connection("loopback://demo").await.unwrap();
    connection.close();

    let (status, stats) = send(
        build_router(state),
        "GET",
        "/api/pool/caches/loopback%3A%2F%2Fdemo",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["address"], "loopback://demo");
    assert_eq!(stats["state"], "available");
    assert_eq!(stats["borrows"], 1);
    assert_eq!(stats["connects"], 1);
}

#[tokio::test]
async fn test_unknown_cache_is_not_found() {
    let (status, body) = send(
        build_router(test_state()),
        "GET",
        "/api/pool/caches/s7%3A%2F%2F10.0.0.9",
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("s7://10.0.0.9"));
}

#[tokio::test]
async fn test_reconnect_endpoint() {
    let state = test_state();
    let connection = state.pool.get_connection("loopback://plc").await.unwrap();

    let (status, body) = send(
        build_router(state.clone()),
        "POST",
        "/api/pool/caches/loopback%3A%2F%2Fplc/reconnect",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["stats"]["breaks"], 1);
    assert_eq!(body["stats"]["connects"], 2);
    assert!(connection.is_closed());

    let (status, body) = send(
        build_router(state),
        "POST",
        "/api/pool/caches/loopback%3A%2F%2Fother/reconnect",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_telemetry_events_endpoint() {
    let device = MockDevice::new();
    device.set_fail_connect(true);

    let telemetry = TelemetryHistory::new(100, 24);
    let mut registry = DriverRegistry::with_builtin_drivers();
    registry.register(device.driver());
    let pool = ConnectionPool::builder(registry)
        .acquire_timeout(Duration::from_secs(1))
        .telemetry(telemetry.clone())
        .build();
    let state = ApiState::new(Arc::new(pool), Some(telemetry.clone()));

    assert!(state.pool.get_connection("mock://down").await.is_err());
    for _ in 0..100 {
        if !telemetry.is_empty().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let (status, events) = send(
        build_router(state.clone()),
        "GET",
        "/api/telemetry/events?severity=error&address=mock%3A%2F%2Fdown",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["category"], "connection");
    assert_eq!(events[0]["details"]["address"], "mock://down");

    let (_, events) = send(
        build_router(state),
        "GET",
        "/api/telemetry/events?severity=warning",
    )
    .await;
    assert!(events.as_array().unwrap().is_empty());
}
