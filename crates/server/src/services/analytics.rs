//! Server-side analytics events.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Errors reported by an analytics sink.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("analytics sink unavailable: {0}")]
    Unavailable(String),
}

/// A tracked event.
#[derive(Debug, Clone, Serialize)]
pub struct TrackEvent {
    /// Account the event belongs to, if any.
    pub user_id: Option<String>,
    pub event: String,
    pub properties: Value,
}

/// Analytics sink.
#[async_trait]
pub trait Analytics: Send + Sync {
    async fn track(&self, event: TrackEvent) -> Result<(), AnalyticsError>;
}

/// Writes events to the structured log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAnalytics;

#[async_trait]
impl Analytics for TracingAnalytics {
    async fn track(&self, event: TrackEvent) -> Result<(), AnalyticsError> {
        tracing::info!(
            target: "analytics",
            user_id = event.user_id.as_deref().unwrap_or("anonymous"),
            event = %event.event,
            properties = %event.properties,
            "track"
        );
        Ok(())
    }
}
