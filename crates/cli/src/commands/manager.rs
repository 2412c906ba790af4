//! Manager account commands.
//!
//! # Usage
//!
//! ```bash
//! planner-cli manager add -e manager@example.com -g Dana -s Reyes
//! planner-cli manager list --organization 7
//! planner-cli manager remove -e manager@example.com
//!
//! planner-cli manager groups https://directory.example.com/v1/accounts/abc
//! planner-cli manager join https://directory.example.com/v1/accounts/abc organization-7-manager
//! planner-cli manager leave https://directory.example.com/v1/accounts/abc organization-7-manager
//! ```
//!
//! # Environment Variables
//!
//! - `DIRECTORY_API_URL` - Base URL of the directory REST API
//! - `DIRECTORY_API_KEY` - Directory API key
//!
//! The full server configuration is loaded, so the other `PLANNER_*`
//! variables must be set as well.

use commuter_core::Email;
use commuter_server::config::ServerConfig;
use commuter_server::services::accounts::{self, Account, DirectoryClient, NewAccount};

fn directory() -> Result<DirectoryClient, Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;
    Ok(DirectoryClient::new(&config.directory)?)
}

fn describe(account: &Account) -> String {
    format!(
        "{} {} <{}> {}",
        account.given_name.as_deref().unwrap_or_default(),
        account.surname.as_deref().unwrap_or_default(),
        account.email.as_deref().unwrap_or_default(),
        account.href
    )
}

/// Create a manager account, or add an existing account to the manager group.
///
/// # Errors
///
/// Returns an error if the email is invalid, the directory rejects the
/// request, or the account is already a manager.
pub async fn add(
    email: String,
    given_name: Option<String>,
    surname: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let email = Email::parse(&email)?;
    let directory = directory()?;

    let data = NewAccount {
        email: email.to_string(),
        given_name,
        surname,
        password: None,
    };

    tracing::info!("Promoting {} to manager...", data.display_name());
    let account = accounts::promote_to_manager(&directory, &data).await?;
    tracing::info!(href = %account.href, "Manager added");
    Ok(())
}

/// Print the managers, or the managers of one organization.
///
/// # Errors
///
/// Returns an error if the directory is unreachable or the group does not exist.
#[allow(clippy::print_stdout)]
pub async fn list(organization: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let directory = directory()?;
    let managers = accounts::list_managers(&directory, organization.as_deref()).await?;

    tracing::info!(count = managers.len(), "Managers");
    for account in &managers {
        println!("{}", describe(account));
    }
    Ok(())
}

/// Take an account out of the manager group.
///
/// # Errors
///
/// Returns an error if the email is invalid, no account has it, or the
/// account is not a manager.
pub async fn remove(email: String) -> Result<(), Box<dyn std::error::Error>> {
    let email = Email::parse(&email)?;
    let directory = directory()?;

    let account = accounts::demote_manager(&directory, &email).await?;
    tracing::info!(href = %account.href, "Manager removed");
    Ok(())
}

/// Print the groups an account belongs to.
///
/// # Errors
///
/// Returns an error if the account does not exist.
#[allow(clippy::print_stdout)]
pub async fn groups(account: String) -> Result<(), Box<dyn std::error::Error>> {
    let directory = directory()?;
    for group in accounts::groups_of(&directory, &account).await? {
        println!("{}\t{}", group.name, group.href);
    }
    Ok(())
}

/// Add an account to a group by name.
///
/// # Errors
///
/// Returns an error if the account or group does not exist, or the
/// account is already a member.
pub async fn join(account: String, group: String) -> Result<(), Box<dyn std::error::Error>> {
    let directory = directory()?;
    accounts::join_group(&directory, &account, &group).await?;
    Ok(())
}

/// Remove an account from a group by name.
///
/// # Errors
///
/// Returns an error if the account does not exist or is not a member.
pub async fn leave(account: String, group: String) -> Result<(), Box<dyn std::error::Error>> {
    let directory = directory()?;
    accounts::leave_group(&directory, &account, &group).await?;
    Ok(())
}
