//! Core types for the commute planner.
//!
//! This module provides type-safe wrappers and records for common domain concepts.

pub mod alert;
pub mod commuter;
pub mod email;
pub mod id;
pub mod plan;
pub mod user;

pub use alert::{ServiceAlert, filter_active};
pub use commuter::{Address, Commuter, LatLng, NOT_INVITED, PLACEHOLDER_NAME, new_link_token};
pub use email::{Email, EmailError};
pub use id::*;
pub use plan::Plan;
pub use user::{ADMINISTRATOR_GROUP, MANAGER_GROUP, User};

/// Free-form session settings, persisted verbatim to the client cache.
pub type Settings = serde_json::Map<String, serde_json::Value>;
