use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Severity level of telemetry events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TelemetrySeverity {
    Info,
    Warning,
    Error,
}

/// Something an operator may want to know about after the fact: a failed
/// connect, a connection thrown away as broken, a reclaimed lease.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub timestamp: DateTime<Utc>,
    pub severity: TelemetrySeverity,
    pub category: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl TelemetryEvent {
    /// Target address recorded in the event details, if any.
    pub fn address(&self) -> Option<&str> {
        self.details
            .as_ref()
            .and_then(|details| details.get("address"))
            .and_then(Value::as_str)
    }
}

/// Bounded in-memory event history, trimmed by count and by age.
#[derive(Debug, Clone)]
pub struct TelemetryHistory {
    events: Arc<RwLock<VecDeque<TelemetryEvent>>>,
    max_events: usize,
    max_age: ChronoDuration,
}

impl TelemetryHistory {
    /// Create a new telemetry history buffer.
    pub fn new(max_events: usize, retention_hours: u64) -> Self {
        Self {
            events: Arc::new(RwLock::new(VecDeque::with_capacity(max_events.max(1)))),
            max_events: max_events.max(1),
            max_age: ChronoDuration::hours(retention_hours as i64),
        }
    }

    /// Append an event to the history, trimming by age and size.
    pub async fn add_event(&self, event: TelemetryEvent) {
        let mut events = self.events.write().await;

        // Drop expired events first.
        let cutoff = Utc::now() - self.max_age;
        while events.front().is_some_and(|front| front.timestamp < cutoff) {
            events.pop_front();
        }

        events.push_back(event);
        while events.len() > self.max_events {
            events.pop_front();
        }
    }

    /// Convenience helper that fills in the timestamp for you.
    pub async fn record_event(
        &self,
        severity: TelemetrySeverity,
        category: impl Into<String>,
        message: impl Into<String>,
        details: Option<Value>,
    ) {
        let event = TelemetryEvent {
            timestamp: Utc::now(),
            severity,
            category: category.into(),
            message: message.into(),
            details,
        };
        self.add_event(event).await;
    }

    /// Return all retained events.
    pub async fn get_events(&self) -> Vec<TelemetryEvent> {
        let events = self.events.read().await;
        events.iter().cloned().collect()
    }

    /// Return events recorded within the last `minutes`.
    pub async fn get_events_since(&self, minutes: i64) -> Vec<TelemetryEvent> {
        let events = self.events.read().await;
        let cutoff = Utc::now() - ChronoDuration::minutes(minutes);

        events
            .iter()
            .filter(|event| event.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// Return events whose details name `address`.
    pub async fn get_events_for_address(&self, address: &str) -> Vec<TelemetryEvent> {
        let events = self.events.read().await;
        events
            .iter()
            .filter(|event| event.address() == Some(address))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn history_is_bounded_by_count() {
        let history = TelemetryHistory::new(2, 24);
        for i in 0..3 {
            history
                .record_event(
                    TelemetrySeverity::Warning,
                    "connection",
                    format!("event {}", i),
                    None,
                )
                .await;
        }

        let events = history.get_events().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "event 1");
        assert_eq!(events[1].message, "event 2");
    }

    #[tokio::test]
    async fn old_events_are_dropped_on_insert() {
        let history = TelemetryHistory::new(10, 1);
        history
            .add_event(TelemetryEvent {
                timestamp: Utc::now() - ChronoDuration::hours(2),
                severity: TelemetrySeverity::Info,
                category: "connection".to_string(),
                message: "stale".to_string(),
                details: None,
            })
            .await;
        history
            .record_event(TelemetrySeverity::Info, "connection", "fresh", None)
            .await;

        let events = history.get_events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "fresh");
    }

    #[tokio::test]
    async fn events_filter_by_address() {
        let history = TelemetryHistory::new(10, 24);
        history
            .record_event(
                TelemetrySeverity::Error,
                "connection",
                "connect failed",
                Some(json!({ "address": "s7://10.0.0.1" })),
            )
            .await;
        history
            .record_event(
                TelemetrySeverity::Warning,
                "connection",
                "discarded",
                Some(json!({ "address": "modbus-tcp://10.0.0.2" })),
            )
            .await;

        let events = history.get_events_for_address("s7://10.0.0.1").await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "connect failed");
        assert_eq!(history.len().await, 2);
        assert_eq!(history.get_events_since(5).await.len(), 2);
    }
}
