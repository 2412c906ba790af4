//! Service alert route handlers.

use axum::{Json, extract::State};

use commuter_core::ServiceAlert;

use crate::error::Result;
use crate::state::AppState;

/// All stored alerts. Clients keep only those active today.
pub async fn index(State(state): State<AppState>) -> Result<Json<Vec<ServiceAlert>>> {
    Ok(Json(state.alerts().list_all().await?))
}
