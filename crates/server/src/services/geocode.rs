//! Reverse geocoding client.
//!
//! Calls `GET {GEOCODER_URL}/geocode/reverse/{lat},{lng}` and reads the
//! address fields from the JSON body.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::instrument;

use commuter_core::{Address, LatLng};

use crate::config::GeocoderConfig;

/// Errors that can occur when geocoding.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Geocoder returned an error response.
    #[error("geocoder error: {status} - {message}")]
    Api { status: u16, message: String },
}

/// Reverse geocoding.
#[async_trait]
pub trait GeocodeService: Send + Sync {
    async fn reverse(&self, coordinate: LatLng) -> Result<Address, GeocodeError>;
}

/// HTTP geocoder client.
#[derive(Clone)]
pub struct HttpGeocoder {
    inner: Arc<HttpGeocoderInner>,
}

struct HttpGeocoderInner {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGeocoder {
    /// Create a new geocoder client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &GeocoderConfig) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpGeocoderInner {
                client,
                base_url: config.base_url.trim_end_matches('/').to_string(),
            }),
        })
    }

    fn reverse_url(&self, coordinate: LatLng) -> String {
        format!("{}/geocode/reverse/{coordinate}", self.inner.base_url)
    }
}

#[async_trait]
impl GeocodeService for HttpGeocoder {
    #[instrument(skip(self), fields(coordinate = %coordinate))]
    async fn reverse(&self, coordinate: LatLng) -> Result<Address, GeocodeError> {
        let response = self
            .inner
            .client
            .get(self.reverse_url(coordinate))
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GeocodeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let address: Address = response.json().await?;
        tracing::debug!(city = ?address.city, "Reverse geocoding complete");
        Ok(address)
    }
}
