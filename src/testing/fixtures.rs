//! Test fixtures providing pre-built test objects

use super::constants::{
    ADMIN_EMAIL, ADMIN_NAME, STUDENT_EMAIL, STUDENT_ENROLLMENT, STUDENT_NAME, TEST_PASSWORD,
};
use super::mock::InMemoryBackend;
use crate::models::{AuthEvent, Identity, NewProfile, Profile, UserMetadata};
use crate::settings::AttendqrSettings;
use crate::state::AppState;
use std::sync::Arc;
use std::time::Duration;

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    /// Default settings with a short settle timeout
    #[must_use]
    pub fn settings() -> AttendqrSettings {
        let mut settings = AttendqrSettings::default();
        settings.session.settle_timeout_secs = 2;
        settings
    }

    #[must_use]
    pub fn settle_timeout() -> Duration {
        Duration::from_secs(Self::settings().session.settle_timeout_secs)
    }

    #[must_use]
    pub fn student_metadata() -> UserMetadata {
        UserMetadata {
            full_name: Some(STUDENT_NAME.to_string()),
            role: Some("student".to_string()),
            enrollment_no: Some(STUDENT_ENROLLMENT.to_string()),
            semester: Some("5".to_string()),
            branch: Some("CSE".to_string()),
            course: Some("B.Tech".to_string()),
        }
    }

    #[must_use]
    pub fn admin_metadata() -> UserMetadata {
        UserMetadata {
            full_name: Some(ADMIN_NAME.to_string()),
            role: Some("admin".to_string()),
            ..UserMetadata::default()
        }
    }

    /// Registered student without a profile row
    #[must_use]
    pub fn student(backend: &InMemoryBackend) -> Identity {
        backend.register_user(STUDENT_EMAIL, TEST_PASSWORD, Self::student_metadata())
    }

    /// Registered admin without a profile row
    #[must_use]
    pub fn admin(backend: &InMemoryBackend) -> Identity {
        backend.register_user(ADMIN_EMAIL, TEST_PASSWORD, Self::admin_metadata())
    }

    /// Registered identity with its profile already stored
    #[must_use]
    pub fn with_profile(backend: &InMemoryBackend, identity: &Identity) -> Profile {
        backend.seed_profile(&NewProfile::from_identity(identity))
    }

    /// Application state wired to `backend`, settled after startup
    ///
    /// # Panics
    ///
    /// Panics if the initial session does not settle
    pub async fn app_state(backend: Arc<InMemoryBackend>) -> AppState {
        let state = AppState::start(backend, Self::settings()).await;
        state
            .session
            .settled(Self::settle_timeout())
            .await
            .expect("initial session should settle");
        state
    }

    /// Sign `identity` in through the provider's event stream and wait for the
    /// session store to settle on it
    ///
    /// # Panics
    ///
    /// Panics if the session does not settle
    pub async fn sign_in(state: &AppState, backend: &InMemoryBackend, identity: &Identity) {
        backend.emit(AuthEvent::SignedIn, Some(identity));
        state
            .session
            .settled_for(&identity.id, Self::settle_timeout())
            .await
            .expect("session should settle for the signed-in identity");
    }
}
