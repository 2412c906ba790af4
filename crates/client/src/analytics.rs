//! Identity forwarding to an analytics collaborator.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors reported by an analytics sink.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("analytics sink unavailable: {0}")]
    Unavailable(String),
}

/// Analytics sink.
#[async_trait]
pub trait Analytics: Send + Sync {
    /// Associate subsequent events with a user and its traits.
    async fn identify(&self, user_id: &str, traits: Map<String, Value>)
    -> Result<(), AnalyticsError>;
}

/// Writes identify calls to the structured log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAnalytics;

#[async_trait]
impl Analytics for TracingAnalytics {
    async fn identify(
        &self,
        user_id: &str,
        traits: Map<String, Value>,
    ) -> Result<(), AnalyticsError> {
        let traits = Value::Object(traits);
        tracing::info!(
            target: "analytics",
            user_id,
            traits = %traits,
            "identify"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tracing_sink_accepts_traits() {
        let mut traits = Map::new();
        traits.insert("email".to_string(), Value::from("ana@example.com"));

        let result = TracingAnalytics.identify("auth0|ana", traits).await;

        assert!(result.is_ok());
    }
}
