//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ServerConfig;
use crate::db::{AlertRepository, AlertStore};
use crate::services::{self, CommuterService, InitError};

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    commuters: CommuterService,
    alerts: Arc<dyn AlertStore>,
    pool: Option<PgPool>,
}

impl AppState {
    /// Create state from already-built services.
    ///
    /// Without a pool, readiness always succeeds.
    #[must_use]
    pub fn new(
        commuters: CommuterService,
        alerts: Arc<dyn AlertStore>,
        pool: Option<PgPool>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                commuters,
                alerts,
                pool,
            }),
        }
    }

    /// Create the production state backed by `PostgreSQL`.
    ///
    /// # Errors
    ///
    /// Returns an error if an external client cannot be built.
    pub fn from_config(config: &ServerConfig, pool: PgPool) -> Result<Self, InitError> {
        let commuters = services::commuter_service(config, &pool)?;
        let alerts = Arc::new(AlertRepository::new(pool.clone()));
        Ok(Self::new(commuters, alerts, Some(pool)))
    }

    #[must_use]
    pub fn commuters(&self) -> &CommuterService {
        &self.inner.commuters
    }

    #[must_use]
    pub fn alerts(&self) -> &dyn AlertStore {
        self.inner.alerts.as_ref()
    }

    /// Check database connectivity.
    pub async fn is_ready(&self) -> bool {
        match &self.inner.pool {
            Some(pool) => sqlx::query("SELECT 1").fetch_one(pool).await.is_ok(),
            None => true,
        }
    }
}
