//! Testing utilities for AttendQR
//!
//! - [`mock`] - in-memory backend implementing every backend seam
//! - [`fixtures`] - pre-built identities, settings and application state
//!
//! ## Usage
//!
//! ```rust,ignore
//! use attendqr::testing::{mock::InMemoryBackend, TestFixtures};
//! use std::sync::Arc;
//!
//! async fn signed_in_student() {
//!     let backend = Arc::new(InMemoryBackend::new());
//!     let student = TestFixtures::student(&backend);
//!     let state = TestFixtures::app_state(Arc::clone(&backend)).await;
//!     TestFixtures::sign_in(&state, &backend, &student).await;
//! }
//! ```

pub mod fixtures;
pub mod mock;

pub use fixtures::TestFixtures;
pub use mock::{InMemoryBackend, Operation};

/// Common test constants
pub mod constants {
    pub const TEST_PASSWORD: &str = "password123";

    pub const STUDENT_EMAIL: &str = "john.doe@example.com";
    pub const STUDENT_NAME: &str = "John Doe";
    pub const STUDENT_ENROLLMENT: &str = "EN2024001";

    pub const ADMIN_EMAIL: &str = "admin@example.com";
    pub const ADMIN_NAME: &str = "Jane Admin";
}
