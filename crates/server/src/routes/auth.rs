//! Invite-link login and logout.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tower_sessions::Session;
use tracing::instrument;

use commuter_core::Commuter;

use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::models::{CurrentCommuter, session_keys};
use crate::state::AppState;

/// Log in with a commuter's invite link.
///
/// Stores the commuter in the session and returns it.
#[instrument(skip_all)]
pub async fn login_with_link(
    State(state): State<AppState>,
    session: Session,
    Path(link): Path<String>,
) -> Result<Json<Commuter>> {
    let commuter = state
        .commuters()
        .find_by_link(&link)
        .await?
        .ok_or_else(|| AppError::NotFound("commuter".to_string()))?;
    let id = commuter
        .id
        .ok_or_else(|| AppError::Internal("stored commuter without id".to_string()))?;

    session
        .insert(session_keys::CURRENT_COMMUTER, CurrentCommuter { id, link })
        .await?;

    set_sentry_user(&id, commuter.email.as_deref());
    tracing::info!(commuter = %id, "Commuter logged in with link");
    Ok(Json(commuter))
}

/// Destroy the session.
pub async fn logout(session: Session) -> StatusCode {
    if let Err(e) = session.flush().await {
        tracing::error!("Failed to flush session: {}", e);
    }
    clear_sentry_user();
    StatusCode::NO_CONTENT
}
