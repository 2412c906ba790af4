//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! planner-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `PLANNER_DATABASE_URL` - `PostgreSQL` connection string
//!
//! Planner migrations live in `crates/server/migrations/`. The session
//! table is owned by the session store and migrated by it.

use commuter_server::db::create_pool;
use commuter_server::middleware::session::migrate_session_store;
use secrecy::SecretString;
use thiserror::Error;

/// Errors that can occur while migrating.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run planner and session store migrations.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn run() -> Result<(), MigrationError> {
    let _ = dotenvy::dotenv();

    let database_url = std::env::var("PLANNER_DATABASE_URL")
        .map(SecretString::from)
        .map_err(|_| MigrationError::MissingEnvVar("PLANNER_DATABASE_URL"))?;

    tracing::info!("Connecting to planner database...");
    let pool = create_pool(&database_url).await?;

    tracing::info!("Running planner migrations...");
    sqlx::migrate!("../server/migrations").run(&pool).await?;

    tracing::info!("Running session store migrations...");
    migrate_session_store(&pool).await?;

    tracing::info!("Migrations complete");
    Ok(())
}
