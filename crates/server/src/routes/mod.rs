//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness
//! GET  /health/ready           - Database readiness
//!
//! # Commuters
//! GET  /commuters?account=ID   - Commuters linked to an account
//! POST /commuters              - Create a commuter
//! PUT  /commuters/{id}         - Save a commuter
//!
//! # Service alerts
//! GET  /service-alerts         - All stored alerts (clients filter by day)
//!
//! # Auth
//! GET  /login/{link}           - Log in with a commuter's invite link
//! POST /logout                 - Destroy the session
//! ```

pub mod alerts;
pub mod auth;
pub mod commuters;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
};

use crate::state::AppState;

/// Build the application router (without session or tracing layers).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route(
            "/commuters",
            get(commuters::by_account).post(commuters::create),
        )
        .route("/commuters/{id}", put(commuters::update))
        .route("/service-alerts", get(alerts::index))
        .route("/login/{link}", get(auth::login_with_link))
        .route("/logout", post(auth::logout))
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.is_ready().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::Map;

    use commuter_core::{Address, Email, LatLng};

    use crate::config::BrandingConfig;
    use crate::db::MemoryStore;
    use crate::models::email::{DeliveryResult, EmailOptions};
    use crate::services::accounts::{Account, AccountError, AccountService, Group, NewAccount};
    use crate::services::analytics::TracingAnalytics;
    use crate::services::geocode::{GeocodeError, GeocodeService};
    use crate::services::mailer::{Mailer, MailerError};
    use crate::services::{CommuterDeps, CommuterService};
    use crate::state::AppState;

    struct NoDirectory;

    #[async_trait]
    impl AccountService for NoDirectory {
        async fn create_account(&self, _: &NewAccount) -> Result<Account, AccountError> {
            Err(AccountError::NotFound("directory disabled".to_string()))
        }

        async fn get_account(&self, _: &str) -> Result<Account, AccountError> {
            Err(AccountError::NotFound("directory disabled".to_string()))
        }

        async fn get_groups(&self, _: &str) -> Result<Vec<Group>, AccountError> {
            Ok(Vec::new())
        }

        async fn add_to_group(&self, _: &Account, _: &Group) -> Result<(), AccountError> {
            Ok(())
        }

        async fn group_accounts(&self, _: &Group) -> Result<Vec<Account>, AccountError> {
            Ok(Vec::new())
        }

        async fn account_groups(&self, _: &Account) -> Result<Vec<Group>, AccountError> {
            Ok(Vec::new())
        }

        async fn remove_from_group(&self, _: &Account, _: &Group) -> Result<(), AccountError> {
            Ok(())
        }

        async fn find_account_by_email(&self, _: &Email) -> Result<Option<Account>, AccountError> {
            Ok(None)
        }
    }

    struct NoGeocoder;

    #[async_trait]
    impl GeocodeService for NoGeocoder {
        async fn reverse(&self, _: LatLng) -> Result<Address, GeocodeError> {
            Err(GeocodeError::Api {
                status: 503,
                message: "unavailable".to_string(),
            })
        }
    }

    struct AcceptingMailer;

    #[async_trait]
    impl Mailer for AcceptingMailer {
        async fn send(&self, _: &EmailOptions) -> Result<DeliveryResult, MailerError> {
            Ok(DeliveryResult {
                id: Some("123".to_string()),
                status: Some("sent".to_string()),
                details: Map::new(),
            })
        }
    }

    /// State over a fresh in-memory store, returned alongside it.
    pub fn memory_state() -> (AppState, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let commuters = CommuterService::new(CommuterDeps {
            commuters: store.clone(),
            emails: store.clone(),
            accounts: Arc::new(NoDirectory),
            geocoder: Arc::new(NoGeocoder),
            mailer: Arc::new(AcceptingMailer),
            analytics: Arc::new(TracingAnalytics),
            branding: BrandingConfig {
                domain: "https://planner.example.com".to_string(),
                application_name: "Commute Planner".to_string(),
                organization_name: "Metro Commuter Services".to_string(),
                organization_url: "https://metro.example.com".to_string(),
                survey_url: None,
            },
        });
        (AppState::new(commuters, store.clone(), None), store)
    }
}
