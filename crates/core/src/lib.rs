//! Commute Planner Core - Shared types library.
//!
//! This crate provides the record types used across all commute planner components:
//! - `server` - Commuter persistence, email outreach and batch reconciliation
//! - `client` - Session bootstrap for the trip-planning front end
//! - `cli` - Command-line tools for migrations and reconciliation passes
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, email addresses, users, commuters, plans and service alerts

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
