#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the attendqr application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod attendance;
pub mod backend;
pub mod errors;
pub mod guard;
pub mod handlers;
pub mod models;
pub mod notifications;
pub mod session;
pub mod settings;
pub mod state;
pub mod utils;
pub mod validation;

// In-memory backend and fixtures for unit and integration tests
#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use errors::AppError;
pub use handlers::{configure_services, health};
pub use session::{Session, SessionStore};
pub use settings::AttendqrSettings;
pub use state::AppState;
