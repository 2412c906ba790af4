//! Domain models for the server.

pub mod email;
pub mod session;

pub use email::{DeliveryResult, EmailOptions, EmailRecord, NewEmailRecord, Recipient};
pub use session::{CurrentCommuter, keys as session_keys};
