//! Planner HTTP API.
//!
//! # Endpoints
//!
//! - `GET /commuters?account=` - commuters linked to an account
//! - `POST /commuters` - create a commuter
//! - `PUT /commuters/{id}` - save a commuter
//! - `GET /service-alerts` - stored service alerts
//! - `GET /login/{link}` - log in with an invite link
//! - `POST /logout` - destroy the server session

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::instrument;
use url::Url;

use commuter_core::{Commuter, ServiceAlert};

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Remote operations the session depends on.
#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn find_commuters(&self, account: &str) -> Result<Vec<Commuter>, ClientError>;

    /// Create a commuter that has no ID yet.
    async fn create_commuter(&self, commuter: &Commuter) -> Result<Commuter, ClientError>;

    /// Save a commuter that already has an ID.
    async fn save_commuter(&self, commuter: &Commuter) -> Result<Commuter, ClientError>;

    async fn service_alerts(&self) -> Result<Vec<ServiceAlert>, ClientError>;

    async fn login_with_link(&self, link: &str) -> Result<Commuter, ClientError>;

    async fn logout(&self) -> Result<(), ClientError>;
}

/// `reqwest` implementation of [`SessionApi`].
///
/// Keeps server session cookies between requests.
#[derive(Clone)]
pub struct HttpApi {
    inner: Arc<HttpApiInner>,
}

struct HttpApiInner {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpApi {
    /// Create a client for the configured server.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpApiInner {
                client,
                base_url: config.api_url.clone(),
            }),
        })
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.inner.base_url.join(path)?)
    }

    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        // A body that breaks after the status line is an API failure
        let body = response.text().await.map_err(|e| ClientError::Api {
            status: status.as_u16(),
            message: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl SessionApi for HttpApi {
    #[instrument(skip(self))]
    async fn find_commuters(&self, account: &str) -> Result<Vec<Commuter>, ClientError> {
        let mut url = self.url("commuters")?;
        url.query_pairs_mut().append_pair("account", account);

        let response = self.inner.client.get(url).send().await?;
        Self::handle_response(response).await
    }

    #[instrument(skip_all)]
    async fn create_commuter(&self, commuter: &Commuter) -> Result<Commuter, ClientError> {
        let response = self
            .inner
            .client
            .post(self.url("commuters")?)
            .json(commuter)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    #[instrument(skip_all, fields(commuter = ?commuter.id))]
    async fn save_commuter(&self, commuter: &Commuter) -> Result<Commuter, ClientError> {
        let Some(id) = commuter.id else {
            return self.create_commuter(commuter).await;
        };

        let response = self
            .inner
            .client
            .put(self.url(&format!("commuters/{id}"))?)
            .json(commuter)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    #[instrument(skip(self))]
    async fn service_alerts(&self) -> Result<Vec<ServiceAlert>, ClientError> {
        let response = self.inner.client.get(self.url("service-alerts")?).send().await?;
        Self::handle_response(response).await
    }

    #[instrument(skip_all)]
    async fn login_with_link(&self, link: &str) -> Result<Commuter, ClientError> {
        let mut url = self.url("login/")?;
        url.path_segments_mut()
            .map_err(|()| ClientError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push(link);

        let response = self.inner.client.get(url).send().await?;
        Self::handle_response(response).await
    }

    #[instrument(skip(self))]
    async fn logout(&self) -> Result<(), ClientError> {
        let response = self.inner.client.post(self.url("logout")?).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::parse_api_url;

    fn api() -> HttpApi {
        HttpApi::new(&ClientConfig {
            api_url: parse_api_url("https://planner.example.com/api").unwrap(),
            cache_path: None,
        })
        .unwrap()
    }

    #[test]
    fn test_urls_are_relative_to_base() {
        let api = api();
        assert_eq!(
            api.url("service-alerts").unwrap().as_str(),
            "https://planner.example.com/api/service-alerts"
        );
        assert_eq!(
            api.url("commuters/7").unwrap().as_str(),
            "https://planner.example.com/api/commuters/7"
        );
    }

    #[test]
    fn test_transport_classification() {
        let api_error = ClientError::Api {
            status: 500,
            message: "boom".to_string(),
        };
        assert!(!api_error.is_transport());
    }
}
