//! Commuter lifecycle and outreach.
//!
//! [`CommuterService`] owns every operation that touches more than the
//! commuter store: account-backed creation, directory sync, geocoding,
//! templated email with its append-only record, status derivation and
//! paged reconciliation passes.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use commuter_core::{Commuter, CommuterId, LatLng, NOT_INVITED};

use super::accounts::{AccountError, AccountService, NewAccount};
use super::analytics::{Analytics, TrackEvent};
use super::batch::{
    BatchError, BatchOptions, BatchSummary, CommuterPages, iterate_and_apply_with_tick,
};
use super::geocode::{GeocodeError, GeocodeService};
use super::mailer::{Mailer, MailerError, validate};
use crate::config::BrandingConfig;
use crate::db::{CommuterStore, EmailStore, RepositoryError};
use crate::models::email::{EmailOptions, EmailRecord, NewEmailRecord, Recipient};

/// Template for the trip plan email.
pub const PLAN_TEMPLATE: &str = "plan";

/// Template confirming a carpool matching sign-up.
pub const CARPOOL_SIGN_UP_TEMPLATE: &str = "carpool-matching-sign-up";

/// Errors from commuter operations.
#[derive(Debug, Error)]
pub enum CommuterError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("directory error: {0}")]
    Account(#[from] AccountError),

    #[error("geocoding failed: {0}")]
    Geocode(#[from] GeocodeError),

    /// Email options failed validation; nothing was sent.
    #[error("invalid email: {0}")]
    InvalidEmail(#[source] MailerError),

    /// The mailer failed; no email record was created.
    #[error("email delivery failed: {0}")]
    Delivery(#[source] MailerError),

    /// The commuter has not been stored yet.
    #[error("commuter has not been saved")]
    NotSaved,
}

/// Collaborators of a [`CommuterService`].
pub struct CommuterDeps {
    pub commuters: Arc<dyn CommuterStore>,
    pub emails: Arc<dyn EmailStore>,
    pub accounts: Arc<dyn AccountService>,
    pub geocoder: Arc<dyn GeocodeService>,
    pub mailer: Arc<dyn Mailer>,
    pub analytics: Arc<dyn Analytics>,
    pub branding: BrandingConfig,
}

/// Commuter operations.
#[derive(Clone)]
pub struct CommuterService {
    inner: Arc<CommuterDeps>,
}

impl CommuterService {
    #[must_use]
    pub fn new(deps: CommuterDeps) -> Self {
        Self {
            inner: Arc::new(deps),
        }
    }

    /// The underlying commuter store.
    #[must_use]
    pub fn store(&self) -> &dyn CommuterStore {
        self.inner.commuters.as_ref()
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Commuters linked to a directory account.
    ///
    /// # Errors
    ///
    /// Returns `CommuterError::Repository` if the query fails.
    pub async fn find_by_account(&self, account: &str) -> Result<Vec<Commuter>, CommuterError> {
        Ok(self.inner.commuters.find_by_account(account).await?)
    }

    /// The commuter owning an invite link.
    ///
    /// # Errors
    ///
    /// Returns `CommuterError::Repository` if the query fails.
    pub async fn find_by_link(&self, link: &str) -> Result<Option<Commuter>, CommuterError> {
        Ok(self.inner.commuters.find_by_link(link).await?)
    }

    /// # Errors
    ///
    /// Returns `CommuterError::Repository` if the query fails.
    pub async fn get(&self, id: CommuterId) -> Result<Option<Commuter>, CommuterError> {
        Ok(self.inner.commuters.get(id).await?)
    }

    /// Insert or update a commuter.
    ///
    /// # Errors
    ///
    /// Returns `CommuterError::Repository` if the write fails.
    pub async fn save(&self, commuter: &mut Commuter) -> Result<(), CommuterError> {
        Ok(self.inner.commuters.save(commuter).await?)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create a commuter, creating its directory account first when account
    /// data with an email is given.
    ///
    /// # Errors
    ///
    /// Returns `CommuterError::Account` if the account cannot be created;
    /// no commuter is stored in that case.
    #[instrument(skip_all)]
    pub async fn generate(
        &self,
        account: Option<&NewAccount>,
        mut commuter: Commuter,
    ) -> Result<Commuter, CommuterError> {
        if let Some(data) = account.filter(|data| !data.email.trim().is_empty()) {
            let created = self.inner.accounts.create_account(data).await?;
            tracing::info!(account = %created.href, "Created account for commuter");
            commuter.account = Some(created.href);
        }

        let commuter = self.inner.commuters.create(commuter).await?;
        tracing::info!(commuter = ?commuter.id, "Commuter generated");
        Ok(commuter)
    }

    /// [`generate`](Self::generate), then email the trip plan.
    ///
    /// # Errors
    ///
    /// Returns any error from creation or from sending the plan. A failed
    /// send leaves the created commuter in place.
    pub async fn generate_and_send_plan(
        &self,
        account: Option<&NewAccount>,
        commuter: Commuter,
    ) -> Result<Commuter, CommuterError> {
        let commuter = self.generate(account, commuter).await?;
        self.send_plan(&commuter).await?;
        Ok(commuter)
    }

    /// Copy names and email from the linked directory account, then save.
    ///
    /// Does nothing for commuters without an account.
    ///
    /// # Errors
    ///
    /// Returns `CommuterError::Account` if the account cannot be fetched.
    #[instrument(skip_all, fields(commuter = ?commuter.id))]
    pub async fn sync_with_account(&self, commuter: &mut Commuter) -> Result<(), CommuterError> {
        let Some(href) = commuter.account.as_deref() else {
            return Ok(());
        };

        let account = self.inner.accounts.get_account(href).await?;
        commuter.given_name = account.given_name;
        commuter.surname = account.surname;
        commuter.email = account.email;
        self.save(commuter).await
    }

    /// Record the commute and opt the commuter into carpool matching, then
    /// send the confirmation email.
    ///
    /// # Errors
    ///
    /// Returns an error if the save or the email fails. The profile change
    /// is kept when only the email fails.
    #[instrument(skip_all, fields(commuter = ?commuter.id))]
    pub async fn carpool_sign_up(
        &self,
        commuter: &mut Commuter,
        commute: Value,
    ) -> Result<EmailRecord, CommuterError> {
        commuter.update_profile("commute", commute);
        commuter.update_profile("carpool_matching", Value::Bool(true));
        self.save(commuter).await?;

        self.send_email(
            commuter,
            CARPOOL_SIGN_UP_TEMPLATE,
            EmailOptions {
                subject: Some("Signed Up for Carpool Matching".to_string()),
                ..EmailOptions::default()
            },
        )
        .await
    }

    /// Set the coordinate and copy the reverse-geocoded address, then save.
    ///
    /// # Errors
    ///
    /// Returns `CommuterError::Geocode` if the lookup fails; the commuter is
    /// not modified in that case.
    #[instrument(skip_all, fields(commuter = ?commuter.id, coordinate = %coordinate))]
    pub async fn reverse_geocode(
        &self,
        commuter: &mut Commuter,
        coordinate: LatLng,
    ) -> Result<(), CommuterError> {
        let address = self.inner.geocoder.reverse(coordinate).await?;
        commuter.coordinate = Some(coordinate);
        commuter.apply_address(address);
        self.save(commuter).await
    }

    // =========================================================================
    // Email
    // =========================================================================

    /// Options every email to this commuter starts from.
    #[must_use]
    pub fn base_email_options(&self, commuter: &Commuter, template: &str) -> EmailOptions {
        let branding = &self.inner.branding;
        let name = commuter.full_name();

        EmailOptions {
            domain: Some(branding.domain.clone()),
            application_name: Some(branding.application_name.clone()),
            link: commuter
                .link
                .as_ref()
                .map(|link| format!("{}/planner/{link}", branding.domain)),
            name: Some(name.clone()),
            organization: Some(branding.organization_name.clone()),
            organization_url: Some(branding.organization_url.clone()),
            template: Some(template.to_string()),
            to: Some(Recipient {
                name: Some(name),
                email: commuter.email.clone(),
            }),
            ..EmailOptions::default()
        }
    }

    /// Send a templated email and record it.
    ///
    /// `options` override the base options key by key. The merged options
    /// must name a template and a valid `to.email`; this is checked before
    /// the mailer is called. A mailer failure creates no record.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEmail` for bad options, `NotSaved` for a commuter
    /// without an ID, `Delivery` if the mailer fails and `Repository` if the
    /// record cannot be stored.
    #[instrument(skip(self, commuter, options), fields(commuter = ?commuter.id))]
    pub async fn send_email(
        &self,
        commuter: &Commuter,
        template: &str,
        options: EmailOptions,
    ) -> Result<EmailRecord, CommuterError> {
        let options = options.merged_over(self.base_email_options(commuter, template));
        validate(&options).map_err(CommuterError::InvalidEmail)?;
        let id = commuter.id.ok_or(CommuterError::NotSaved)?;

        let result = self
            .inner
            .mailer
            .send(&options)
            .await
            .map_err(CommuterError::Delivery)?;

        let event = TrackEvent {
            user_id: commuter.account.clone(),
            event: format!("Sent Email: \"{template}\""),
            properties: serde_json::to_value(&options).unwrap_or(Value::Null),
        };
        if let Err(e) = self.inner.analytics.track(event).await {
            tracing::warn!(error = %e, "Failed to track sent email");
        }

        let record = self
            .inner
            .emails
            .create(NewEmailRecord {
                account: commuter.account.clone(),
                commuter: id,
                organization: commuter.organization,
                metadata: options,
                result,
            })
            .await?;

        tracing::info!(email = %record.id, status = record.delivery_status(), "Email recorded");
        Ok(record)
    }

    /// Email the commuter their trip plan.
    ///
    /// # Errors
    ///
    /// See [`send_email`](Self::send_email).
    pub async fn send_plan(&self, commuter: &Commuter) -> Result<EmailRecord, CommuterError> {
        let branding = &self.inner.branding;
        self.send_email(
            commuter,
            PLAN_TEMPLATE,
            EmailOptions {
                subject: Some(format!(
                    "Get your commute plan from {}",
                    branding.application_name
                )),
                survey: branding.survey_url.clone(),
                ..EmailOptions::default()
            },
        )
        .await
    }

    /// Recompute `status` from the most recently modified email record, or
    /// `"not invited"` when there is none, then save.
    ///
    /// # Errors
    ///
    /// Returns `CommuterError::Repository` if the lookup or save fails.
    #[instrument(skip_all, fields(commuter = ?commuter.id))]
    pub async fn update_status(&self, commuter: &mut Commuter) -> Result<(), CommuterError> {
        let latest = match commuter.id {
            Some(id) => self.inner.emails.latest_for_commuter(id).await?,
            None => None,
        };

        commuter.status = latest.map_or_else(
            || NOT_INVITED.to_string(),
            |record| record.delivery_status().to_string(),
        );
        self.save(commuter).await
    }

    // =========================================================================
    // Batch passes
    // =========================================================================

    /// Run a batch pass over every stored commuter.
    ///
    /// See [`super::batch`] for ordering, failure and caller obligations: run at
    /// most one pass at a time and don't mutate the collection meanwhile.
    ///
    /// # Errors
    ///
    /// Returns the first fetch or transform failure.
    pub async fn iterate_and_apply<F, Fut, R, E, K>(
        &self,
        options: BatchOptions,
        transform: F,
        tick: K,
    ) -> Result<BatchSummary, BatchError<E>>
    where
        F: FnMut(Vec<Commuter>) -> Vec<Fut>,
        Fut: Future<Output = Result<R, E>>,
        K: FnMut(&[R]),
    {
        let pages = CommuterPages::new(self.store());
        iterate_and_apply_with_tick(&pages, options, transform, tick).await
    }

    /// Recompute the status of every commuter.
    ///
    /// # Errors
    ///
    /// Returns the first failure; earlier pages keep their new status.
    #[instrument(skip(self))]
    pub async fn update_all_statuses(
        &self,
        options: BatchOptions,
    ) -> Result<BatchSummary, BatchError<CommuterError>> {
        self.iterate_and_apply(
            options,
            |page| {
                page.into_iter()
                    .map(|mut commuter| async move {
                        self.update_status(&mut commuter).await?;
                        Ok::<_, CommuterError>(commuter)
                    })
                    .collect()
            },
            |page| tracing::info!(commuters = page.len(), "Statuses updated"),
        )
        .await
    }

    /// Sync every account-backed commuter with its directory account.
    ///
    /// # Errors
    ///
    /// Returns the first failure; earlier pages stay synced.
    #[instrument(skip(self))]
    pub async fn sync_all_accounts(
        &self,
        options: BatchOptions,
    ) -> Result<BatchSummary, BatchError<CommuterError>> {
        self.iterate_and_apply(
            options,
            |page| {
                page.into_iter()
                    .map(|mut commuter| async move {
                        self.sync_with_account(&mut commuter).await?;
                        Ok::<_, CommuterError>(commuter)
                    })
                    .collect()
            },
            |page| tracing::info!(commuters = page.len(), "Accounts synced"),
        )
        .await
    }
}
