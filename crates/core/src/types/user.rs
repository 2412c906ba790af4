//! Identity record for a logged-in user.
//!
//! Users come from the identity/directory service. The planner never owns
//! them; it caches the record client-side and links commuters to the
//! directory account through [`User::account_id`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Directory group granting administrator access.
pub const ADMINISTRATOR_GROUP: &str = "administrator";

/// Directory group granting organization manager access.
pub const MANAGER_GROUP: &str = "manager";

/// A user identity as delivered by the identity service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Identity provider subject.
    pub user_id: String,
    /// Primary email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Given (first) name.
    #[serde(default, rename = "givenName", skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    /// Family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    /// Directory account href, when the identity is backed by a directory account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Names of the directory groups this user belongs to.
    #[serde(default)]
    pub groups: Vec<String>,
    /// Metadata only the application may write (e.g. `is_admin`).
    #[serde(default)]
    pub app_metadata: Map<String, Value>,
    /// Metadata the user may edit.
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
}

impl User {
    /// Create a user with only a subject and email set.
    #[must_use]
    pub fn new(user_id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email,
            given_name: None,
            surname: None,
            account: None,
            groups: Vec::new(),
            app_metadata: Map::new(),
            user_metadata: Map::new(),
        }
    }

    /// The identifier commuters reference in their `account` field.
    ///
    /// Falls back to the subject when no directory account is attached.
    #[must_use]
    pub fn account_id(&self) -> &str {
        self.account.as_deref().unwrap_or(&self.user_id)
    }

    /// Whether the application metadata flags this user as an administrator.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.app_metadata
            .get("is_admin")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Whether the user belongs to the named directory group.
    #[must_use]
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}
