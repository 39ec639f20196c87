//! Session management
//!
//! - [`store`] - the process-wide Session Store fed by the auth provider's events
//! - [`bootstrap`] - fetch-or-create reconciliation of the user's profile

pub mod bootstrap;
pub mod store;

pub use bootstrap::{BootstrapError, BootstrapOutcome, ProfileBootstrap};
pub use store::{Session, SessionStore, SessionStoreError};
