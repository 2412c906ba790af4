//! Service alerts, fetched after load.

use std::sync::Arc;

use chrono::Utc;

use commuter_core::{ServiceAlert, filter_active};

use super::{BackgroundTask, Session, SessionEvent, Shared};

impl Session {
    /// Fetch alerts and keep those active today (UTC).
    ///
    /// Never fails: any error is reported as a background failure and
    /// leaves an empty list.
    pub async fn refresh_service_alerts(&self) -> Vec<ServiceAlert> {
        let shared = &self.inner.shared;
        refresh(shared, shared.epoch()).await
    }

    /// Start a refresh without waiting for it.
    pub(super) async fn spawn_service_alerts(&self) {
        let shared = Arc::clone(&self.inner.shared);
        let epoch = shared.epoch();
        let task = tokio::spawn(async move {
            refresh(&shared, epoch).await;
        });

        if let Some(previous) = self.inner.alerts_task.lock().await.replace(task) {
            previous.abort();
        }
    }
}

async fn refresh(shared: &Shared, epoch: u64) -> Vec<ServiceAlert> {
    let alerts = match shared.api.service_alerts().await {
        Ok(alerts) => filter_active(alerts, Utc::now().date_naive()),
        Err(e) => {
            shared.report(BackgroundTask::ServiceAlerts, &e);
            Vec::new()
        }
    };

    {
        let mut state = shared.state.write().await;
        // Cleared meanwhile
        if shared.epoch() != epoch {
            return alerts;
        }
        state.service_alerts.clone_from(&alerts);
    }

    tracing::debug!(active = alerts.len(), "Service alerts updated");
    shared.publish(SessionEvent::ServiceAlertsUpdated {
        active: alerts.len(),
    });
    alerts
}
