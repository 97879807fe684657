use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::api::types::ApiState;
use crate::telemetry::{TelemetryEvent, TelemetrySeverity};

/// Query parameters for telemetry list endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct TelemetryQueryParams {
    #[serde(default)]
    pub minutes: Option<u32>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub severity: Option<TelemetrySeverity>,
    #[serde(default)]
    pub address: Option<String>,
}

/// GET /api/telemetry/events
pub async fn get_telemetry_events(
    State(state): State<ApiState>,
    Query(params): Query<TelemetryQueryParams>,
) -> (StatusCode, Json<Vec<TelemetryEvent>>) {
    let mut events = match state.telemetry.as_ref() {
        Some(history) => match params.minutes {
            Some(minutes) => history.get_events_since(minutes as i64).await,
            None => history.get_events().await,
        },
        None => Vec::new(),
    };

    if let Some(severity) = params.severity {
        events.retain(|event| event.severity == severity);
    }
    if let Some(address) = params.address.as_deref() {
        events.retain(|event| event.address() == Some(address));
    }

    events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    let limit = params.limit.unwrap_or(100).clamp(1, 500);
    events.truncate(limit);

    (StatusCode::OK, Json(events))
}
