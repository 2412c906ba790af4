//! Unified error handling with Sentry integration.
//!
//! Route handlers return `Result<T, AppError>`. Server-side failures are
//! captured to Sentry before responding; their details never reach the client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::CommuterError;

/// Application-level error type for the server.
#[derive(Debug, Error)]
pub enum AppError {
    /// Commuter operation failed.
    #[error("Commuter error: {0}")]
    Commuter(#[from] CommuterError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Session store failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Commuter(err) => match err {
                CommuterError::Repository(err) => repository_status(err),
                CommuterError::InvalidEmail(_) | CommuterError::NotSaved => {
                    StatusCode::BAD_REQUEST
                }
                CommuterError::Account(_)
                | CommuterError::Geocode(_)
                | CommuterError::Delivery(_) => StatusCode::BAD_GATEWAY,
            },
            Self::Database(err) => repository_status(err),
            Self::Session(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

const fn repository_status(err: &RepositoryError) -> StatusCode {
    match err {
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Conflict(_) => StatusCode::CONFLICT,
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match status {
            StatusCode::INTERNAL_SERVER_ERROR => "Internal server error".to_string(),
            StatusCode::BAD_GATEWAY => "External service error".to_string(),
            StatusCode::NOT_FOUND => match &self {
                Self::NotFound(what) => format!("Not found: {what}"),
                _ => "Not found".to_string(),
            },
            StatusCode::CONFLICT => "Conflict".to_string(),
            _ => self.to_string(),
        };

        (status, message).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Associate subsequent Sentry events with a commuter.
pub fn set_sentry_user(commuter_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(commuter_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mailer::MailerError;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("commuter 7".to_string());
        assert_eq!(err.to_string(), "Not found: commuter 7");

        let err = AppError::BadRequest("account is required".to_string());
        assert_eq!(err.to_string(), "Bad request: account is required");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(AppError::Database(RepositoryError::Conflict("link".to_string()))),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_commuter_error_status_codes() {
        assert_eq!(
            get_status(CommuterError::Repository(RepositoryError::NotFound).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(CommuterError::InvalidEmail(MailerError::MissingRecipient).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(CommuterError::NotSaved.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(
                CommuterError::Delivery(MailerError::InvalidAddress("x".to_string())).into()
            ),
            StatusCode::BAD_GATEWAY
        );
    }
}
