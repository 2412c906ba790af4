//! Commute planner CLI - database migrations and maintenance tools.
//!
//! # Usage
//!
//! ```bash
//! # Run planner and session store migrations
//! planner-cli migrate
//!
//! # Recompute every commuter's status, 50 records per page
//! planner-cli commuters update-statuses --limit 50
//!
//! # Pull names and emails from the directory for every account-backed commuter
//! planner-cli commuters sync-accounts
//!
//! # Add a manager account
//! planner-cli manager add -e manager@example.com -g Dana -s Reyes
//!
//! # List the managers of organization 7
//! planner-cli manager list --organization 7
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `commuters update-statuses` - Recompute commuter statuses in pages
//! - `commuters sync-accounts` - Sync commuters with their directory accounts
//! - `manager add` - Create or promote a manager account
//! - `manager list` - List managers, optionally for one organization
//! - `manager remove` - Take an account out of the manager group
//! - `manager groups|join|leave` - Inspect and edit an account's group memberships

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::num::NonZeroUsize;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "planner-cli")]
#[command(author, version, about = "Commute planner CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Batch maintenance over all commuters
    Commuters {
        #[command(subcommand)]
        action: CommuterAction,
    },
    /// Manage manager accounts
    Manager {
        #[command(subcommand)]
        action: ManagerAction,
    },
}

#[derive(Subcommand)]
enum CommuterAction {
    /// Recompute the status of every commuter
    UpdateStatuses {
        /// Records per page
        #[arg(short, long)]
        limit: Option<NonZeroUsize>,
    },
    /// Sync every account-backed commuter with the directory
    SyncAccounts {
        /// Records per page
        #[arg(short, long)]
        limit: Option<NonZeroUsize>,
    },
}

#[derive(Subcommand)]
enum ManagerAction {
    /// Create a manager account, or promote an existing one
    Add {
        /// Manager email address
        #[arg(short, long)]
        email: String,

        /// Given name
        #[arg(short, long)]
        given_name: Option<String>,

        /// Surname
        #[arg(short, long)]
        surname: Option<String>,
    },
    /// List managers
    List {
        /// Only managers of this organization
        #[arg(short, long)]
        organization: Option<String>,
    },
    /// Remove an account from the manager group
    Remove {
        /// Manager email address
        #[arg(short, long)]
        email: String,
    },
    /// List the groups of an account
    Groups {
        /// Account href
        account: String,
    },
    /// Add an account to a group
    Join {
        /// Account href
        account: String,
        /// Group name
        group: String,
    },
    /// Remove an account from a group
    Leave {
        /// Account href
        account: String,
        /// Group name
        group: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Commuters { action } => match action {
            CommuterAction::UpdateStatuses { limit } => {
                commands::commuters::update_statuses(limit).await?;
            }
            CommuterAction::SyncAccounts { limit } => {
                commands::commuters::sync_accounts(limit).await?;
            }
        },
        Commands::Manager { action } => match action {
            ManagerAction::Add {
                email,
                given_name,
                surname,
            } => {
                commands::manager::add(email, given_name, surname).await?;
            }
            ManagerAction::List { organization } => commands::manager::list(organization).await?,
            ManagerAction::Remove { email } => commands::manager::remove(email).await?,
            ManagerAction::Groups { account } => commands::manager::groups(account).await?,
            ManagerAction::Join { account, group } => {
                commands::manager::join(account, group).await?;
            }
            ManagerAction::Leave { account, group } => {
                commands::manager::leave(account, group).await?;
            }
        },
    }
    Ok(())
}
