//! Session-related types.

use serde::{Deserialize, Serialize};

use commuter_core::CommuterId;

/// Commuter logged in through an invite link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentCommuter {
    pub id: CommuterId,
    pub link: String,
}

/// Session keys.
pub mod keys {
    /// Key for the commuter logged in by invite link.
    pub const CURRENT_COMMUTER: &str = "current_commuter";
}
