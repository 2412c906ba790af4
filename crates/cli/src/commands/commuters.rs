//! Batch maintenance over every commuter.
//!
//! # Usage
//!
//! ```bash
//! planner-cli commuters update-statuses --limit 50
//! planner-cli commuters sync-accounts
//! ```
//!
//! Both commands read the full server configuration from the environment.
//! A failing record aborts the pass; pages already processed keep their
//! changes, so a pass can simply be re-run.

use std::num::NonZeroUsize;

use commuter_server::config::ServerConfig;
use commuter_server::db::create_pool;
use commuter_server::services::{self, CommuterService};
use commuter_server::services::batch::{BatchOptions, BatchSummary};

async fn service() -> Result<CommuterService, Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;
    let pool = create_pool(&config.database_url).await?;
    Ok(services::commuter_service(&config, &pool)?)
}

fn options(limit: Option<NonZeroUsize>) -> BatchOptions {
    limit.map_or_else(BatchOptions::default, BatchOptions::with_limit)
}

fn report(what: &str, summary: BatchSummary) {
    tracing::info!(
        pages = summary.pages,
        records = summary.records,
        "{what} complete"
    );
}

/// Recompute the status of every commuter.
///
/// # Errors
///
/// Returns an error if configuration is invalid or any page fails.
pub async fn update_statuses(limit: Option<NonZeroUsize>) -> Result<(), Box<dyn std::error::Error>> {
    let commuters = service().await?;
    let summary = commuters.update_all_statuses(options(limit)).await?;
    report("Status update", summary);
    Ok(())
}

/// Sync every account-backed commuter with the directory.
///
/// # Errors
///
/// Returns an error if configuration is invalid or any page fails.
pub async fn sync_accounts(limit: Option<NonZeroUsize>) -> Result<(), Box<dyn std::error::Error>> {
    let commuters = service().await?;
    let summary = commuters.sync_all_accounts(options(limit)).await?;
    report("Account sync", summary);
    Ok(())
}
