//! Integration tests for the commute planner.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p commuter-integration-tests
//! ```
//!
//! No database or external service is needed: the server runs over
//! [`MemoryStore`] and the client session runs against [`FakeApi`].
//!
//! # Test Categories
//!
//! - `session_load` - Session bootstrap from every cache state
//! - `session_persist` - Background persistence, clear and login flows
//! - `batch_reconcile` - Paged passes and email status reconciliation
//! - `server_roundtrip` - The HTTP client against a live in-process server

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use commuter_client::analytics::{Analytics, AnalyticsError};
use commuter_client::api::SessionApi;
use commuter_client::cache::MemoryCache;
use commuter_client::{ClientError, Session, SessionDeps, SessionEvent};
use commuter_core::{Address, Commuter, CommuterId, Email, LatLng, ServiceAlert, User, new_link_token};
use commuter_server::config::BrandingConfig;
use commuter_server::db::MemoryStore;
use commuter_server::models::{DeliveryResult, EmailOptions};
use commuter_server::services::accounts::{Account, AccountError, AccountService, Group, NewAccount};
use commuter_server::services::analytics::TracingAnalytics;
use commuter_server::services::geocode::{GeocodeError, GeocodeService};
use commuter_server::services::mailer::{Mailer, MailerError};
use commuter_server::services::{CommuterDeps, CommuterService};

// =============================================================================
// Client fakes
// =============================================================================

/// How a faked request fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// The server is unreachable.
    Transport,
    /// The server answers with this status.
    Status(u16),
}

impl Failure {
    async fn into_error(self) -> ClientError {
        match self {
            Self::Transport => transport_error().await,
            Self::Status(status) => ClientError::Api {
                status,
                message: "fake failure".to_string(),
            },
        }
    }
}

/// A real transport error, produced without touching the network.
pub async fn transport_error() -> ClientError {
    let err = reqwest::Client::new()
        .get("not a url")
        .send()
        .await
        .unwrap_err();
    ClientError::Transport(err)
}

/// In-memory planner API that counts calls.
#[derive(Default)]
pub struct FakeApi {
    commuters: Mutex<Vec<Commuter>>,
    alerts: Mutex<Vec<ServiceAlert>>,
    lookup_failure: Mutex<Option<Failure>>,
    alerts_failure: Mutex<Option<Failure>>,
    lookup_delay: Mutex<Duration>,
    next_id: AtomicI32,
    pub find_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub save_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
}

impl FakeApi {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI32::new(1),
            ..Self::default()
        })
    }

    /// Store a commuter as if the server had created it.
    pub fn insert(&self, mut commuter: Commuter) -> Commuter {
        commuter.id = Some(CommuterId::new(self.next_id.fetch_add(1, Ordering::SeqCst)));
        commuter.ensure_link();
        self.commuters.lock().unwrap().push(commuter.clone());
        commuter
    }

    pub fn set_alerts(&self, alerts: Vec<ServiceAlert>) {
        *self.alerts.lock().unwrap() = alerts;
    }

    pub fn fail_lookup(&self, failure: Failure) {
        *self.lookup_failure.lock().unwrap() = Some(failure);
    }

    pub fn clear_lookup_failure(&self) {
        *self.lookup_failure.lock().unwrap() = None;
    }

    pub fn fail_alerts(&self, failure: Failure) {
        *self.alerts_failure.lock().unwrap() = Some(failure);
    }

    pub fn delay_lookup(&self, delay: Duration) {
        *self.lookup_delay.lock().unwrap() = delay;
    }

    #[must_use]
    pub fn stored(&self) -> Vec<Commuter> {
        self.commuters.lock().unwrap().clone()
    }

    #[must_use]
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionApi for FakeApi {
    async fn find_commuters(&self, account: &str) -> Result<Vec<Commuter>, ClientError> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.lookup_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failure = *self.lookup_failure.lock().unwrap();
        if let Some(failure) = failure {
            return Err(failure.into_error().await);
        }

        Ok(self
            .commuters
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.account.as_deref() == Some(account))
            .cloned()
            .collect())
    }

    async fn create_commuter(&self, commuter: &Commuter) -> Result<Commuter, ClientError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut commuter = commuter.clone();
        commuter.link = Some(new_link_token());
        Ok(self.insert(commuter))
    }

    async fn save_commuter(&self, commuter: &Commuter) -> Result<Commuter, ClientError> {
        if commuter.id.is_none() {
            return self.create_commuter(commuter).await;
        }
        self.save_calls.fetch_add(1, Ordering::SeqCst);

        let mut stored = self.commuters.lock().unwrap();
        let Some(existing) = stored.iter_mut().find(|c| c.id == commuter.id) else {
            return Err(ClientError::Api {
                status: 404,
                message: "Not found".to_string(),
            });
        };
        let link = existing.link.clone();
        *existing = commuter.clone();
        existing.link = link;
        Ok(existing.clone())
    }

    async fn service_alerts(&self) -> Result<Vec<ServiceAlert>, ClientError> {
        let failure = *self.alerts_failure.lock().unwrap();
        if let Some(failure) = failure {
            return Err(failure.into_error().await);
        }
        Ok(self.alerts.lock().unwrap().clone())
    }

    async fn login_with_link(&self, link: &str) -> Result<Commuter, ClientError> {
        self.commuters
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.link.as_deref() == Some(link))
            .cloned()
            .ok_or(ClientError::Api {
                status: 404,
                message: "Not found: commuter".to_string(),
            })
    }

    async fn logout(&self) -> Result<(), ClientError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Analytics sink that remembers every identify call.
#[derive(Default)]
pub struct RecordingAnalytics {
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl RecordingAnalytics {
    #[must_use]
    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Analytics for RecordingAnalytics {
    async fn identify(
        &self,
        user_id: &str,
        traits: Map<String, Value>,
    ) -> Result<(), AnalyticsError> {
        self.calls.lock().unwrap().push((user_id.to_string(), traits));
        Ok(())
    }
}

/// Collaborators shared by the sessions of one test.
pub struct Harness {
    pub api: Arc<FakeApi>,
    pub cache: Arc<MemoryCache>,
    pub analytics: Arc<RecordingAnalytics>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    #[must_use]
    pub fn new() -> Self {
        Self {
            api: FakeApi::new(),
            cache: Arc::new(MemoryCache::new()),
            analytics: Arc::new(RecordingAnalytics::default()),
        }
    }

    /// A fresh session over this harness. Sessions built from the same
    /// harness share the cache, like page reloads in one browser.
    #[must_use]
    pub fn session(&self, bootstrap: Option<User>) -> Session {
        Session::initialize(SessionDeps {
            cache: self.cache.clone(),
            api: self.api.clone(),
            analytics: self.analytics.clone(),
            bootstrap,
        })
    }
}

/// A directory-backed user.
#[must_use]
pub fn user(name: &str) -> User {
    let mut user = User::new(format!("auth0|{name}"), Some(format!("{name}@example.com")));
    user.account = Some(format!("acct-{name}"));
    user
}

/// Wait for the first event matching `matches`.
pub async fn next_event(
    events: &mut broadcast::Receiver<SessionEvent>,
    matches: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .unwrap()
}

/// Poll `condition` until it holds.
pub async fn eventually(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

// =============================================================================
// Server fakes
// =============================================================================

/// Directory that knows nobody.
pub struct EmptyDirectory;

#[async_trait]
impl AccountService for EmptyDirectory {
    async fn create_account(&self, data: &NewAccount) -> Result<Account, AccountError> {
        Ok(Account {
            href: format!("acct-{}", data.email),
            email: Some(data.email.clone()),
            given_name: data.given_name.clone(),
            surname: data.surname.clone(),
            extra: Map::new(),
        })
    }

    async fn get_account(&self, href: &str) -> Result<Account, AccountError> {
        Err(AccountError::NotFound(href.to_string()))
    }

    async fn get_groups(&self, _: &str) -> Result<Vec<Group>, AccountError> {
        Ok(Vec::new())
    }

    async fn add_to_group(&self, _: &Account, _: &Group) -> Result<(), AccountError> {
        Ok(())
    }

    async fn group_accounts(&self, _: &Group) -> Result<Vec<Account>, AccountError> {
        Ok(Vec::new())
    }

    async fn account_groups(&self, _: &Account) -> Result<Vec<Group>, AccountError> {
        Ok(Vec::new())
    }

    async fn remove_from_group(&self, _: &Account, _: &Group) -> Result<(), AccountError> {
        Ok(())
    }

    async fn find_account_by_email(&self, _: &Email) -> Result<Option<Account>, AccountError> {
        Ok(None)
    }
}

/// Geocoder that is always down.
pub struct DownGeocoder;

#[async_trait]
impl GeocodeService for DownGeocoder {
    async fn reverse(&self, _: LatLng) -> Result<Address, GeocodeError> {
        Err(GeocodeError::Api {
            status: 503,
            message: "unavailable".to_string(),
        })
    }
}

/// Mailer that records what it was asked to send.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailOptions>>,
    fail: Mutex<bool>,
    status: Mutex<Option<String>>,
}

impl RecordingMailer {
    #[must_use]
    pub fn sent(&self) -> Vec<EmailOptions> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail(&self) {
        *self.fail.lock().unwrap() = true;
    }

    /// Status reported for later sends; `None` reports no status.
    pub fn report_status(&self, status: Option<&str>) {
        *self.status.lock().unwrap() = status.map(String::from);
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, options: &EmailOptions) -> Result<DeliveryResult, MailerError> {
        if *self.fail.lock().unwrap() {
            return Err(MailerError::InvalidAddress("relay refused".to_string()));
        }
        self.sent.lock().unwrap().push(options.clone());
        Ok(DeliveryResult {
            id: Some(format!("msg-{}", self.sent.lock().unwrap().len())),
            status: self.status.lock().unwrap().clone(),
            details: Map::new(),
        })
    }
}

#[must_use]
pub fn branding() -> BrandingConfig {
    BrandingConfig {
        domain: "https://planner.example.com".to_string(),
        application_name: "Commute Planner".to_string(),
        organization_name: "Metro Commuter Services".to_string(),
        organization_url: "https://metro.example.com".to_string(),
        survey_url: Some("https://survey.example.com".to_string()),
    }
}

/// A commuter service over `store` with in-process collaborators.
#[must_use]
pub fn commuter_service(store: &Arc<MemoryStore>, mailer: &Arc<RecordingMailer>) -> CommuterService {
    CommuterService::new(CommuterDeps {
        commuters: store.clone(),
        emails: store.clone(),
        accounts: Arc::new(EmptyDirectory),
        geocoder: Arc::new(DownGeocoder),
        mailer: mailer.clone(),
        analytics: Arc::new(TracingAnalytics),
        branding: branding(),
    })
}
