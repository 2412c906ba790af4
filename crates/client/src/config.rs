//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `PLANNER_API_URL` - Base URL of the planner server
//!
//! ## Optional
//! - `PLANNER_CACHE_PATH` - JSON file backing the local cache (default: in memory)

use std::path::PathBuf;

use thiserror::Error;
use url::Url;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Session client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Planner server base URL.
    pub api_url: Url,
    /// Cache file; `None` keeps the cache in memory.
    pub cache_path: Option<PathBuf>,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `PLANNER_API_URL` is missing or not a URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let raw = std::env::var("PLANNER_API_URL")
            .map_err(|_| ConfigError::MissingEnvVar("PLANNER_API_URL".to_string()))?;
        let api_url = parse_api_url(&raw)
            .map_err(|e| ConfigError::InvalidEnvVar("PLANNER_API_URL".to_string(), e.to_string()))?;

        let cache_path = std::env::var("PLANNER_CACHE_PATH")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            api_url,
            cache_path,
        })
    }
}

/// Parse a base URL so that relative joins keep its path.
pub(crate) fn parse_api_url(raw: &str) -> Result<Url, url::ParseError> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    Url::parse(&raw)
}
