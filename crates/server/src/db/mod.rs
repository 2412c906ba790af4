//! Persistence for commuters, email records and service alerts.
//!
//! # Database: `planner` schema
//!
//! ## Tables
//!
//! - `commuter` - Commuter profiles (JSONB `opts`/`profile`/`stats`)
//! - `email` - One row per successful send, append-only
//! - `service_alert` - Transit service alerts with an active window
//! - `tower_sessions.session` - Server sessions (created by the session store)
//!
//! # Stores
//!
//! Services talk to the database only through the [`CommuterStore`],
//! [`EmailStore`] and [`AlertStore`] traits. The `PostgreSQL` repositories
//! are the production implementations; [`MemoryStore`] implements all three
//! in memory for tests and local development.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p commuter-cli -- migrate
//! ```

pub mod alerts;
pub mod commuters;
pub mod emails;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use commuter_core::{Commuter, CommuterId, ServiceAlert};

use crate::models::email::{EmailRecord, NewEmailRecord};

pub use alerts::AlertRepository;
pub use commuters::CommuterRepository;
pub use emails::EmailRepository;
pub use memory::MemoryStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate invite link).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Commuter persistence.
///
/// Natural scan order is ascending commuter ID.
#[async_trait]
pub trait CommuterStore: Send + Sync {
    /// Fetch up to `limit` commuters after skipping `skip`, in scan order.
    async fn find_page(&self, skip: usize, limit: usize) -> Result<Vec<Commuter>, RepositoryError>;

    /// All commuters linked to a directory account.
    async fn find_by_account(&self, account: &str) -> Result<Vec<Commuter>, RepositoryError>;

    /// The commuter owning an invite link token.
    async fn find_by_link(&self, link: &str) -> Result<Option<Commuter>, RepositoryError>;

    /// A commuter by ID.
    async fn get(&self, id: CommuterId) -> Result<Option<Commuter>, RepositoryError>;

    /// Insert a new commuter. Always assigns a fresh invite link.
    async fn create(&self, commuter: Commuter) -> Result<Commuter, RepositoryError>;

    /// Insert or update a commuter.
    ///
    /// Assigns an invite link only when the commuter has none; an existing
    /// link is never replaced. Updates the passed record with the stored
    /// ID and link.
    async fn save(&self, commuter: &mut Commuter) -> Result<(), RepositoryError>;
}

/// Email record persistence. Records are append-only.
#[async_trait]
pub trait EmailStore: Send + Sync {
    async fn create(&self, record: NewEmailRecord) -> Result<EmailRecord, RepositoryError>;

    /// The most recently modified record for a commuter.
    async fn latest_for_commuter(
        &self,
        commuter: CommuterId,
    ) -> Result<Option<EmailRecord>, RepositoryError>;

    /// Every record for a commuter, newest first.
    async fn list_for_commuter(
        &self,
        commuter: CommuterId,
    ) -> Result<Vec<EmailRecord>, RepositoryError>;
}

/// Service alert persistence.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Every stored alert, ordered by start date.
    async fn list_all(&self) -> Result<Vec<ServiceAlert>, RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Convert a page offset or size to a SQL bigint.
fn to_sql_count(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
