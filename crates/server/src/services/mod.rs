//! Business logic services.
//!
//! # Services
//!
//! - `accounts` - Directory accounts and group membership
//! - `analytics` - Analytics event tracking
//! - `batch` - Paged apply over an unbounded collection
//! - `commuters` - Commuter lifecycle, outreach email and status
//! - `geocode` - Reverse geocoding
//! - `mailer` - Templated email delivery over SMTP

pub mod accounts;
pub mod analytics;
pub mod batch;
pub mod commuters;
pub mod geocode;
pub mod mailer;

use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;

pub use commuters::{CommuterDeps, CommuterError, CommuterService};

use crate::config::ServerConfig;
use crate::db::{CommuterRepository, EmailRepository};
use accounts::{AccountError, DirectoryClient};
use analytics::TracingAnalytics;
use geocode::{GeocodeError, HttpGeocoder};
use mailer::{MailerError, SmtpMailer};

/// Error wiring the production collaborators.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("directory client: {0}")]
    Directory(#[from] AccountError),

    #[error("geocoder client: {0}")]
    Geocoder(#[from] GeocodeError),

    #[error("mailer: {0}")]
    Mailer(#[from] MailerError),
}

/// Build a [`CommuterService`] backed by `PostgreSQL` and the configured
/// directory, geocoder and SMTP relay.
///
/// # Errors
///
/// Returns an error if any HTTP client or the SMTP transport cannot be built.
pub fn commuter_service(config: &ServerConfig, pool: &PgPool) -> Result<CommuterService, InitError> {
    Ok(CommuterService::new(CommuterDeps {
        commuters: Arc::new(CommuterRepository::new(pool.clone())),
        emails: Arc::new(EmailRepository::new(pool.clone())),
        accounts: Arc::new(DirectoryClient::new(&config.directory)?),
        geocoder: Arc::new(HttpGeocoder::new(&config.geocoder)?),
        mailer: Arc::new(SmtpMailer::new(&config.email)?),
        analytics: Arc::new(TracingAnalytics),
        branding: config.branding.clone(),
    }))
}
