//! Outgoing email options and the records kept for each send.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use commuter_core::{CommuterId, Email, EmailId, OrganizationId};

/// Status recorded when the mailer result carries none.
pub const DEFAULT_DELIVERY_STATUS: &str = "sent";

/// Who an email goes to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Options for a single templated email.
///
/// The commuter service builds a base set from the commuter and the
/// branding config; callers pass overrides which win key by key. Keys the
/// templates don't know are kept in `extra` and stored with the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub survey: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Recipient>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EmailOptions {
    /// Options with only a template and subject set.
    #[must_use]
    pub fn template(template: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            template: Some(template.into()),
            subject: Some(subject.into()),
            ..Self::default()
        }
    }

    /// Shallow merge: every field set on `self` replaces the one in `base`.
    ///
    /// `to` is replaced as a whole, never merged field by field.
    #[must_use]
    pub fn merged_over(self, base: Self) -> Self {
        let mut extra = base.extra;
        extra.extend(self.extra);

        Self {
            domain: self.domain.or(base.domain),
            application_name: self.application_name.or(base.application_name),
            link: self.link.or(base.link),
            name: self.name.or(base.name),
            organization: self.organization.or(base.organization),
            organization_url: self.organization_url.or(base.organization_url),
            template: self.template.or(base.template),
            subject: self.subject.or(base.subject),
            survey: self.survey.or(base.survey),
            to: self.to.or(base.to),
            extra,
        }
    }

    /// The validated recipient address, if there is one.
    #[must_use]
    pub fn recipient_email(&self) -> Option<Email> {
        self.to
            .as_ref()
            .and_then(|to| to.email.as_deref())
            .and_then(|email| Email::parse(email).ok())
    }
}

/// What the mail transport reported for a send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    /// Transport message ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl DeliveryResult {
    /// The reported status, or [`DEFAULT_DELIVERY_STATUS`].
    #[must_use]
    pub fn status(&self) -> &str {
        self.status.as_deref().unwrap_or(DEFAULT_DELIVERY_STATUS)
    }
}

/// A stored record of a sent email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRecord {
    #[serde(rename = "_id")]
    pub id: EmailId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(rename = "_commuter")]
    pub commuter: CommuterId,
    #[serde(default, rename = "_organization", skip_serializing_if = "Option::is_none")]
    pub organization: Option<OrganizationId>,
    pub metadata: EmailOptions,
    pub result: DeliveryResult,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl EmailRecord {
    /// The delivery status this record contributes to the commuter.
    #[must_use]
    pub fn delivery_status(&self) -> &str {
        self.result.status()
    }
}

/// An email record before it is stored.
#[derive(Debug, Clone)]
pub struct NewEmailRecord {
    pub account: Option<String>,
    pub commuter: CommuterId,
    pub organization: Option<OrganizationId>,
    pub metadata: EmailOptions,
    pub result: DeliveryResult,
}
