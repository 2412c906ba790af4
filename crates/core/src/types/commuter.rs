//! Commuter profile record.
//!
//! A commuter is a rider profile used for trip planning and email outreach.
//! It is either anonymous (a throwaway profile that only lives in the
//! client cache) or backed by a persisted record linked to a directory
//! account.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::id::{CommuterId, OrganizationId, UserId};
use super::user::User;

/// Status of a commuter that has never been emailed.
pub const NOT_INVITED: &str = "not invited";

/// Name used for identity fields of a commuter synthesized from a user.
pub const PLACEHOLDER_NAME: &str = "unknown";

/// A latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl std::fmt::Display for LatLng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

/// A postal address as returned by reverse geocoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// A commuter profile.
///
/// The wire form uses camelCase keys (`givenName`, `internalId`), which is
/// also the form stored in the client cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commuter {
    /// Database ID; `None` until the commuter has been created server-side.
    #[serde(default, rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<CommuterId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_id: Option<String>,
    #[serde(default, rename = "_organization", skip_serializing_if = "Option::is_none")]
    pub organization: Option<OrganizationId>,
    #[serde(default, rename = "_user", skip_serializing_if = "Option::is_none")]
    pub user: Option<UserId>,
    #[serde(default = "default_anonymous")]
    pub anonymous: bool,
    /// Invite link token. Generated once, never changed afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinate: Option<LatLng>,
    #[serde(default)]
    pub opts: Map<String, Value>,
    #[serde(default)]
    pub profile: Map<String, Value>,
    #[serde(default)]
    pub stats: Map<String, Value>,
}

const fn default_anonymous() -> bool {
    true
}

fn default_status() -> String {
    NOT_INVITED.to_string()
}

impl Default for Commuter {
    fn default() -> Self {
        Self {
            id: None,
            account: None,
            email: None,
            given_name: None,
            surname: None,
            internal_id: None,
            organization: None,
            user: None,
            anonymous: default_anonymous(),
            link: None,
            labels: Vec::new(),
            status: default_status(),
            address: None,
            coordinate: None,
            opts: Map::new(),
            profile: Map::new(),
            stats: Map::new(),
        }
    }
}

impl Commuter {
    /// A throwaway profile with no identity fields.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A non-anonymous profile synthesized from a user's identity.
    ///
    /// Name fields are placeholders; the real names arrive once the
    /// commuter is synced with its directory account.
    #[must_use]
    pub fn for_user(user: &User) -> Self {
        Self {
            account: Some(user.account_id().to_string()),
            email: user.email.clone(),
            given_name: Some(PLACEHOLDER_NAME.to_string()),
            surname: Some(PLACEHOLDER_NAME.to_string()),
            anonymous: false,
            ..Self::default()
        }
    }

    /// Generate the invite link token if the commuter has none yet.
    ///
    /// Returns `true` if a token was generated.
    pub fn ensure_link(&mut self) -> bool {
        if self.link.is_some() {
            return false;
        }
        self.link = Some(new_link_token());
        true
    }

    /// Display name used in email greetings.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!(
            "{} {}",
            self.given_name.as_deref().unwrap_or_default(),
            self.surname.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string()
    }

    /// Set a single profile key.
    pub fn update_profile(&mut self, key: impl Into<String>, value: Value) {
        self.profile.insert(key.into(), value);
    }

    /// Copy the non-empty parts of a geocoded address onto the commuter.
    pub fn apply_address(&mut self, address: Address) {
        let current = self.address.get_or_insert_with(Address::default);
        if address.address.is_some() {
            current.address = address.address;
        }
        if address.city.is_some() {
            current.city = address.city;
        }
        if address.state.is_some() {
            current.state = address.state;
        }
        if address.zip.is_some() {
            current.zip = address.zip;
        }
        if address.country.is_some() {
            current.country = address.country;
        }
    }
}

/// A fresh invite link token: a UUID v4 without dashes.
#[must_use]
pub fn new_link_token() -> String {
    Uuid::new_v4().simple().to_string()
}
