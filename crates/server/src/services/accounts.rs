//! Identity/directory service client.
//!
//! Accounts live in an external directory and are referenced by their
//! `href`. Commuters store that href in their `account` field.
//!
//! # Endpoints
//!
//! - `POST {api}/accounts` - create an account (`409` when the email is taken)
//! - `GET {href}` - fetch an account
//! - `GET {api}/accounts?email=` - search accounts by email
//! - `GET {api}/groups?name=` - search groups by name
//! - `GET {account href}/groups` - groups an account belongs to
//! - `GET {group href}/accounts` - members of a group
//! - `POST {group href}/accounts` - add an account to a group (`409` when already a member)
//! - `DELETE {group href}/accounts?href=` - remove an account from a group

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::instrument;
use url::Url;

use commuter_core::{Email, MANAGER_GROUP};

use crate::config::DirectoryConfig;

/// Errors that can occur when talking to the directory.
#[derive(Debug, Error)]
pub enum AccountError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Directory returned an error response.
    #[error("directory error: {status} - {message}")]
    Api { status: u16, message: String },

    /// An account with this email already exists.
    #[error("account already exists: {0}")]
    AlreadyExists(String),

    /// The account is already a member of the group.
    #[error("account is already in group {0}")]
    AlreadyInGroup(String),

    /// The account is not a member of the group.
    #[error("account is not in group {0}")]
    NotInGroup(String),

    /// Account or group not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Failed to build a request.
    #[error("invalid directory configuration: {0}")]
    Config(String),
}

/// A directory account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub href: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Data for creating an account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub email: String,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl NewAccount {
    /// Display name used in messages about this account.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!(
            "{} {} ({})",
            self.given_name.as_deref().unwrap_or_default(),
            self.surname.as_deref().unwrap_or_default(),
            self.email
        )
    }
}

/// A directory group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub href: String,
    pub name: String,
}

#[derive(Deserialize)]
struct Items<T> {
    items: Vec<T>,
}

/// Directory operations the planner needs.
#[async_trait]
pub trait AccountService: Send + Sync {
    async fn create_account(&self, data: &NewAccount) -> Result<Account, AccountError>;

    async fn get_account(&self, href: &str) -> Result<Account, AccountError>;

    /// Groups with exactly this name.
    async fn get_groups(&self, name: &str) -> Result<Vec<Group>, AccountError>;

    async fn add_to_group(&self, account: &Account, group: &Group) -> Result<(), AccountError>;

    async fn remove_from_group(&self, account: &Account, group: &Group)
    -> Result<(), AccountError>;

    async fn group_accounts(&self, group: &Group) -> Result<Vec<Account>, AccountError>;

    async fn account_groups(&self, account: &Account) -> Result<Vec<Group>, AccountError>;

    async fn find_account_by_email(&self, email: &Email) -> Result<Option<Account>, AccountError>;
}

/// Create an account, or fetch the existing one when the email is taken.
///
/// # Errors
///
/// Returns any directory error other than an email conflict.
pub async fn create_or_retrieve_account(
    accounts: &dyn AccountService,
    data: &NewAccount,
) -> Result<Account, AccountError> {
    match accounts.create_account(data).await {
        Ok(account) => Ok(account),
        Err(AccountError::AlreadyExists(_)) => {
            let email = Email::parse(&data.email)
                .map_err(|e| AccountError::Config(format!("invalid email: {e}")))?;
            accounts
                .find_account_by_email(&email)
                .await?
                .ok_or_else(|| AccountError::NotFound(data.email.clone()))
        }
        Err(e) => Err(e),
    }
}

/// Create or retrieve an account and add it to the manager group.
///
/// A missing password is replaced by a random one; the manager signs in
/// through a reset link.
///
/// # Errors
///
/// Returns `AccountError::AlreadyInGroup` if the account is already a
/// manager and `AccountError::NotFound` if the directory has no manager group.
#[instrument(skip_all, fields(email = %data.email))]
pub async fn promote_to_manager(
    accounts: &dyn AccountService,
    data: &NewAccount,
) -> Result<Account, AccountError> {
    let group = accounts
        .get_groups(MANAGER_GROUP)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AccountError::NotFound(format!("group {MANAGER_GROUP}")))?;

    let mut data = data.clone();
    if data.password.is_none() {
        data.password = Some(uuid::Uuid::new_v4().simple().to_string());
    }

    let account = create_or_retrieve_account(accounts, &data).await?;
    accounts.add_to_group(&account, &group).await?;
    tracing::info!(href = %account.href, "Account promoted to manager");
    Ok(account)
}

/// Name of the group holding the managers of one organization.
#[must_use]
pub fn organization_manager_group(organization: &str) -> String {
    format!("organization-{organization}-manager")
}

/// The first group with this name.
///
/// # Errors
///
/// Returns `AccountError::NotFound` if the directory has no such group.
pub async fn find_group(accounts: &dyn AccountService, name: &str) -> Result<Group, AccountError> {
    accounts
        .get_groups(name)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AccountError::NotFound(format!("group {name}")))
}

/// Accounts in the manager group, or in one organization's manager group.
///
/// # Errors
///
/// Returns `AccountError::NotFound` if the group does not exist.
#[instrument(skip(accounts))]
pub async fn list_managers(
    accounts: &dyn AccountService,
    organization: Option<&str>,
) -> Result<Vec<Account>, AccountError> {
    let name = organization.map_or_else(|| MANAGER_GROUP.to_string(), organization_manager_group);
    let group = find_group(accounts, &name).await?;
    accounts.group_accounts(&group).await
}

/// Groups the account at `href` belongs to.
///
/// # Errors
///
/// Returns `AccountError::NotFound` if the account does not exist.
pub async fn groups_of(
    accounts: &dyn AccountService,
    href: &str,
) -> Result<Vec<Group>, AccountError> {
    let account = accounts.get_account(href).await?;
    accounts.account_groups(&account).await
}

/// Add the account at `href` to the group named `name`.
///
/// # Errors
///
/// Returns `AccountError::NotFound` if the account or group does not exist
/// and `AccountError::AlreadyInGroup` if it is already a member.
#[instrument(skip(accounts))]
pub async fn join_group(
    accounts: &dyn AccountService,
    href: &str,
    name: &str,
) -> Result<(), AccountError> {
    let account = accounts.get_account(href).await?;
    let group = find_group(accounts, name).await?;
    accounts.add_to_group(&account, &group).await?;
    tracing::info!(group = %group.name, "Account added to group");
    Ok(())
}

/// Remove the account at `href` from the group named `name`.
///
/// # Errors
///
/// Returns `AccountError::NotFound` if the account does not exist and
/// `AccountError::NotInGroup` if it is not a member.
#[instrument(skip(accounts))]
pub async fn leave_group(
    accounts: &dyn AccountService,
    href: &str,
    name: &str,
) -> Result<(), AccountError> {
    let account = accounts.get_account(href).await?;
    remove_membership(accounts, &account, name).await
}

/// Take the account registered under `email` out of the manager group.
///
/// # Errors
///
/// Returns `AccountError::NotFound` if no account has this email and
/// `AccountError::NotInGroup` if it is not a manager.
#[instrument(skip_all, fields(email = %email))]
pub async fn demote_manager(
    accounts: &dyn AccountService,
    email: &Email,
) -> Result<Account, AccountError> {
    let account = accounts
        .find_account_by_email(email)
        .await?
        .ok_or_else(|| AccountError::NotFound(email.to_string()))?;
    remove_membership(accounts, &account, MANAGER_GROUP).await?;
    Ok(account)
}

async fn remove_membership(
    accounts: &dyn AccountService,
    account: &Account,
    name: &str,
) -> Result<(), AccountError> {
    let group = accounts
        .account_groups(account)
        .await?
        .into_iter()
        .find(|g| g.name == name)
        .ok_or_else(|| AccountError::NotInGroup(name.to_string()))?;

    accounts.remove_from_group(account, &group).await?;
    tracing::info!(href = %account.href, group = %group.name, "Account removed from group");
    Ok(())
}

/// REST client for the directory service.
#[derive(Clone)]
pub struct DirectoryClient {
    inner: Arc<DirectoryClientInner>,
}

struct DirectoryClientInner {
    client: reqwest::Client,
    api_url: String,
}

impl DirectoryClient {
    /// Create a new directory client.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &DirectoryConfig) -> Result<Self, AccountError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", config.api_key.expose_secret());
        let mut auth_value = HeaderValue::from_str(&auth_value)
            .map_err(|e| AccountError::Config(format!("Invalid API key format: {e}")))?;
        auth_value.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_value);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            inner: Arc::new(DirectoryClientInner {
                client,
                api_url: config.api_url.clone(),
            }),
        })
    }

    fn account_url(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else {
            format!("{}/accounts/{}", self.inner.api_url, href.trim_start_matches('/'))
        }
    }

    fn search_url(&self, collection: &str, key: &str, value: &str) -> Result<Url, AccountError> {
        Url::parse_with_params(
            &format!("{}/{collection}", self.inner.api_url),
            &[(key, value)],
        )
        .map_err(|e| AccountError::Config(format!("invalid directory URL: {e}")))
    }

    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, AccountError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let message = response.text().await.unwrap_or_default();
        Err(AccountError::Api {
            status: status.as_u16(),
            message,
        })
    }

    fn membership_url(group: &Group, account: &Account) -> Result<Url, AccountError> {
        Url::parse_with_params(
            &format!("{}/accounts", group.href.trim_end_matches('/')),
            &[("href", account.href.as_str())],
        )
        .map_err(|e| AccountError::Config(format!("invalid group href: {e}")))
    }
}

#[async_trait]
impl AccountService for DirectoryClient {
    #[instrument(skip_all, fields(email = %data.email))]
    async fn create_account(&self, data: &NewAccount) -> Result<Account, AccountError> {
        let response = self
            .inner
            .client
            .post(format!("{}/accounts", self.inner.api_url))
            .json(data)
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            return Err(AccountError::AlreadyExists(data.email.clone()));
        }
        Self::handle_response(response).await
    }

    #[instrument(skip(self))]
    async fn get_account(&self, href: &str) -> Result<Account, AccountError> {
        let response = self.inner.client.get(self.account_url(href)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AccountError::NotFound(href.to_string()));
        }
        Self::handle_response(response).await
    }

    #[instrument(skip(self))]
    async fn get_groups(&self, name: &str) -> Result<Vec<Group>, AccountError> {
        let url = self.search_url("groups", "name", name)?;
        let response = self.inner.client.get(url).send().await?;

        let groups: Items<Group> = Self::handle_response(response).await?;
        Ok(groups.items)
    }

    #[instrument(skip_all, fields(account = %account.href, group = %group.name))]
    async fn add_to_group(&self, account: &Account, group: &Group) -> Result<(), AccountError> {
        let response = self
            .inner
            .client
            .post(format!("{}/accounts", group.href.trim_end_matches('/')))
            .json(&serde_json::json!({ "href": account.href }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            return Err(AccountError::AlreadyInGroup(group.name.clone()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AccountError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    #[instrument(skip_all, fields(account = %account.href, group = %group.name))]
    async fn remove_from_group(
        &self,
        account: &Account,
        group: &Group,
    ) -> Result<(), AccountError> {
        let url = Self::membership_url(group, account)?;
        let response = self.inner.client.delete(url).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AccountError::NotInGroup(group.name.clone()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AccountError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    #[instrument(skip_all, fields(group = %group.name))]
    async fn group_accounts(&self, group: &Group) -> Result<Vec<Account>, AccountError> {
        let response = self
            .inner
            .client
            .get(format!("{}/accounts", group.href.trim_end_matches('/')))
            .send()
            .await?;

        let accounts: Items<Account> = Self::handle_response(response).await?;
        Ok(accounts.items)
    }

    #[instrument(skip_all, fields(account = %account.href))]
    async fn account_groups(&self, account: &Account) -> Result<Vec<Group>, AccountError> {
        let url = format!("{}/groups", self.account_url(&account.href));
        let response = self.inner.client.get(url).send().await?;

        let groups: Items<Group> = Self::handle_response(response).await?;
        Ok(groups.items)
    }

    #[instrument(skip_all)]
    async fn find_account_by_email(&self, email: &Email) -> Result<Option<Account>, AccountError> {
        let url = self.search_url("accounts", "email", email.as_str())?;
        let response = self.inner.client.get(url).send().await?;

        let accounts: Items<Account> = Self::handle_response(response).await?;
        Ok(accounts.items.into_iter().next())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use std::sync::Mutex;

    /// Directory fake with one existing account, a manager group and the
    /// manager group of organization 7.
    struct FakeDirectory {
        accounts: Mutex<Vec<Account>>,
        groups: Vec<Group>,
        memberships: Mutex<Vec<(String, String)>>,
    }

    fn account(href: &str, email: &str) -> Account {
        Account {
            href: href.to_string(),
            email: Some(email.to_string()),
            given_name: None,
            surname: None,
            extra: Map::new(),
        }
    }

    fn group(name: &str) -> Group {
        Group {
            href: format!("group-{name}"),
            name: name.to_string(),
        }
    }

    impl FakeDirectory {
        fn new() -> Self {
            Self {
                accounts: Mutex::new(vec![account("acct-existing", "old@example.com")]),
                groups: vec![group(MANAGER_GROUP), group(&organization_manager_group("7"))],
                memberships: Mutex::new(Vec::new()),
            }
        }

        fn without_groups() -> Self {
            Self {
                groups: Vec::new(),
                ..Self::new()
            }
        }

        fn members(&self, name: &str) -> Vec<String> {
            self.memberships
                .lock()
                .unwrap()
                .iter()
                .filter(|(group, _)| group == name)
                .map(|(_, href)| href.clone())
                .collect()
        }
    }

    #[async_trait]
    impl AccountService for FakeDirectory {
        async fn create_account(&self, data: &NewAccount) -> Result<Account, AccountError> {
            let mut accounts = self.accounts.lock().unwrap();
            if accounts.iter().any(|a| a.email.as_deref() == Some(data.email.as_str())) {
                return Err(AccountError::AlreadyExists(data.email.clone()));
            }
            assert!(data.password.is_some());
            let created = account(&format!("acct-{}", data.email), &data.email);
            accounts.push(created.clone());
            Ok(created)
        }

        async fn get_account(&self, href: &str) -> Result<Account, AccountError> {
            self.accounts
                .lock()
                .unwrap()
                .iter()
                .find(|a| a.href == href)
                .cloned()
                .ok_or_else(|| AccountError::NotFound(href.to_string()))
        }

        async fn get_groups(&self, name: &str) -> Result<Vec<Group>, AccountError> {
            Ok(self.groups.iter().filter(|g| g.name == name).cloned().collect())
        }

        async fn add_to_group(&self, account: &Account, group: &Group) -> Result<(), AccountError> {
            let mut memberships = self.memberships.lock().unwrap();
            let membership = (group.name.clone(), account.href.clone());
            if memberships.contains(&membership) {
                return Err(AccountError::AlreadyInGroup(group.name.clone()));
            }
            memberships.push(membership);
            Ok(())
        }

        async fn remove_from_group(
            &self,
            account: &Account,
            group: &Group,
        ) -> Result<(), AccountError> {
            let mut memberships = self.memberships.lock().unwrap();
            let before = memberships.len();
            memberships.retain(|(g, href)| !(*g == group.name && *href == account.href));
            if memberships.len() == before {
                return Err(AccountError::NotInGroup(group.name.clone()));
            }
            Ok(())
        }

        async fn group_accounts(&self, group: &Group) -> Result<Vec<Account>, AccountError> {
            let mut members = Vec::new();
            for href in self.members(&group.name) {
                members.push(self.get_account(&href).await?);
            }
            Ok(members)
        }

        async fn account_groups(&self, account: &Account) -> Result<Vec<Group>, AccountError> {
            let memberships = self.memberships.lock().unwrap();
            Ok(self
                .groups
                .iter()
                .filter(|g| memberships.contains(&(g.name.clone(), account.href.clone())))
                .cloned()
                .collect())
        }

        async fn find_account_by_email(
            &self,
            email: &Email,
        ) -> Result<Option<Account>, AccountError> {
            Ok(self
                .accounts
                .lock()
                .unwrap()
                .iter()
                .find(|a| a.email.as_deref() == Some(email.as_str()))
                .cloned())
        }
    }

    fn new_account(email: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            given_name: Some("Grace".to_string()),
            surname: Some("Hopper".to_string()),
            password: None,
        }
    }

    // =========================================================================
    // Promotion
    // =========================================================================

    #[tokio::test]
    async fn test_promote_creates_account_and_joins_group() {
        let directory = FakeDirectory::new();
        let account = promote_to_manager(&directory, &new_account("grace@example.com"))
            .await
            .unwrap();

        assert_eq!(account.href, "acct-grace@example.com");
        assert_eq!(directory.members(MANAGER_GROUP), ["acct-grace@example.com"]);
    }

    #[tokio::test]
    async fn test_promote_reuses_existing_account() {
        let directory = FakeDirectory::new();
        let account = promote_to_manager(&directory, &new_account("old@example.com"))
            .await
            .unwrap();
        assert_eq!(account.href, "acct-existing");
    }

    #[tokio::test]
    async fn test_promote_twice_is_a_conflict() {
        let directory = FakeDirectory::new();
        let data = new_account("grace@example.com");
        promote_to_manager(&directory, &data).await.unwrap();

        let result = promote_to_manager(&directory, &data).await;
        assert!(matches!(result, Err(AccountError::AlreadyInGroup(_))));
    }

    #[tokio::test]
    async fn test_missing_manager_group() {
        let directory = FakeDirectory::without_groups();

        let result = promote_to_manager(&directory, &new_account("grace@example.com")).await;
        assert!(matches!(result, Err(AccountError::NotFound(_))));
    }

    // =========================================================================
    // Manager listing and group membership
    // =========================================================================

    #[tokio::test]
    async fn test_list_managers_by_group() {
        let directory = FakeDirectory::new();
        promote_to_manager(&directory, &new_account("grace@example.com"))
            .await
            .unwrap();
        join_group(&directory, "acct-existing", &organization_manager_group("7"))
            .await
            .unwrap();

        let all = list_managers(&directory, None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].href, "acct-grace@example.com");

        let org = list_managers(&directory, Some("7")).await.unwrap();
        assert_eq!(org.len(), 1);
        assert_eq!(org[0].href, "acct-existing");

        let missing = list_managers(&directory, Some("8")).await;
        assert!(matches!(missing, Err(AccountError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_join_and_leave_group() {
        let directory = FakeDirectory::new();

        join_group(&directory, "acct-existing", MANAGER_GROUP).await.unwrap();
        let groups = groups_of(&directory, "acct-existing").await.unwrap();
        assert_eq!(groups, [group(MANAGER_GROUP)]);

        leave_group(&directory, "acct-existing", MANAGER_GROUP).await.unwrap();
        assert!(groups_of(&directory, "acct-existing").await.unwrap().is_empty());

        let again = leave_group(&directory, "acct-existing", MANAGER_GROUP).await;
        assert!(matches!(again, Err(AccountError::NotInGroup(_))));
    }

    #[tokio::test]
    async fn test_group_operations_need_known_account_and_group() {
        let directory = FakeDirectory::new();

        let unknown_account = join_group(&directory, "acct-nobody", MANAGER_GROUP).await;
        assert!(matches!(unknown_account, Err(AccountError::NotFound(_))));

        let unknown_group = join_group(&directory, "acct-existing", "drivers").await;
        assert!(matches!(unknown_group, Err(AccountError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_demote_manager_by_email() {
        let directory = FakeDirectory::new();
        promote_to_manager(&directory, &new_account("grace@example.com"))
            .await
            .unwrap();
        let email = Email::parse("grace@example.com").unwrap();

        let account = demote_manager(&directory, &email).await.unwrap();

        assert_eq!(account.href, "acct-grace@example.com");
        assert!(directory.members(MANAGER_GROUP).is_empty());

        let stranger = Email::parse("nobody@example.com").unwrap();
        let result = demote_manager(&directory, &stranger).await;
        assert!(matches!(result, Err(AccountError::NotFound(_))));
    }

    #[test]
    fn test_membership_url_carries_account_href() {
        let url = DirectoryClient::membership_url(
            &Group {
                href: "https://directory.example.com/v1/groups/g1/".to_string(),
                name: MANAGER_GROUP.to_string(),
            },
            &account("https://directory.example.com/v1/accounts/a1", "a@example.com"),
        )
        .unwrap();

        assert_eq!(
            url.as_str(),
            "https://directory.example.com/v1/groups/g1/accounts?href=https%3A%2F%2Fdirectory.example.com%2Fv1%2Faccounts%2Fa1"
        );
    }

    #[test]
    fn test_account_url_accepts_full_hrefs() {
        let client = DirectoryClient::new(&DirectoryConfig {
            api_url: "https://directory.example.com/v1".to_string(),
            api_key: SecretString::from("k3y-Q9x!vT2#mR8$"),
        })
        .unwrap();

        assert_eq!(
            client.account_url("https://directory.example.com/v1/accounts/abc"),
            "https://directory.example.com/v1/accounts/abc"
        );
        assert_eq!(
            client.account_url("abc"),
            "https://directory.example.com/v1/accounts/abc"
        );
        assert_eq!(
            client
                .search_url("accounts", "email", "a+b@example.com")
                .unwrap()
                .as_str(),
            "https://directory.example.com/v1/accounts?email=a%2Bb%40example.com"
        );
    }
}
