//! Commute Planner session client.
//!
//! Assembles a [`Session`] from the local cache, a server-embedded bootstrap
//! payload and the planner API, then keeps the cache and the server in step
//! with local mutations through a background persistence task.
//!
//! # Modules
//!
//! - [`cache`] - Local key/value cache (`moka` in memory, or a JSON file)
//! - [`api`] - Planner HTTP API
//! - [`analytics`] - Identity forwarding
//! - [`session`] - The session aggregate, its bootstrap and persistence

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod analytics;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod session;

pub use error::{CacheError, ClientError, SessionError};
pub use session::{BackgroundTask, Session, SessionDeps, SessionEvent, SessionState};
