//! Client error types.

use thiserror::Error;

/// Errors from the planner API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced a response (connection, timeout, TLS).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server rejected the request, or its response body could not be
    /// read to the end.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The response body was not the expected JSON.
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl ClientError {
    /// Whether the server could not be reached at all.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Errors from the local cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced to session callers.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Looking up the logged-in user's commuter failed; no session was
    /// delivered.
    #[error("failed to load commuter: {0}")]
    Commuter(#[source] ClientError),

    /// Logging in with an invite link failed.
    #[error("login failed: {0}")]
    Login(#[source] ClientError),

    /// The logout request failed. The local session is cleared regardless.
    #[error("logout failed: {0}")]
    Logout(#[source] ClientError),

    /// The operation needs a loaded session.
    #[error("session is not loaded")]
    NotLoaded,

    /// The operation needs a logged-in user.
    #[error("no user is logged in")]
    NotLoggedIn,

    /// [`Session::teardown`](crate::Session::teardown) has run.
    #[error("session has been torn down")]
    TornDown,
}
