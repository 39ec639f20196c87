//! Seams to the hosted backend-as-a-service
//!
//! The application consumes three collaborators: the auth provider, the
//! profile store and the QR session/attendance store. Each is a trait so the
//! session and attendance layers can run against the real HTTP adapter
//! ([`HostedBackend`]) or an in-memory stand-in in tests.

use crate::models::{
    AttendanceRecord, AuthSession, AuthStateChange, BackendError, NewAttendance, NewProfile,
    NewQrSession, Profile, ProfileUpdate, QrSession, SignUpResult, UserMetadata,
};
use async_trait::async_trait;
use tokio::sync::broadcast;

mod auth;
mod rest;
mod tables;

pub use rest::HostedBackend;

/// Authentication provider operations
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Register a new identity carrying the given metadata
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the registration or cannot be reached
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> Result<SignUpResult, BackendError>;

    /// Authenticate with email and password
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials are rejected or the provider cannot be reached
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError>;

    /// End the current session
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot revoke the session
    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Current session, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be queried
    async fn get_session(&self) -> Result<Option<AuthSession>, BackendError>;

    /// Exchange the refresh token for a fresh session
    ///
    /// # Errors
    ///
    /// Returns an error if there is no session or the refresh is rejected
    async fn refresh_session(&self) -> Result<AuthSession, BackendError>;

    /// Subscribe to the authentication event stream
    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange>;
}

/// `profiles` relation
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Profile for an identity; `Ok(None)` when the store reports no rows
    ///
    /// # Errors
    ///
    /// Returns an error for any failure other than "no rows"
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>, BackendError>;

    /// Insert a profile; a second profile for the same identity fails with a
    /// uniqueness violation
    ///
    /// # Errors
    ///
    /// Returns an error if the insert is rejected
    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile, BackendError>;

    /// Apply a partial update and return the stored row
    ///
    /// # Errors
    ///
    /// Returns an error if the update is rejected or the profile does not exist
    async fn update_profile(
        &self,
        user_id: &str,
        update: &ProfileUpdate,
    ) -> Result<Profile, BackendError>;

    /// Cheap read used to check the data store is reachable
    ///
    /// # Errors
    ///
    /// Returns an error if the check fails
    async fn check_connection(&self) -> Result<(), BackendError>;
}

/// `qr_codes` and `attendance_records` relations
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the insert is rejected
    async fn insert_qr_session(&self, session: &NewQrSession) -> Result<QrSession, BackendError>;

    /// Active session carrying this token, if any
    ///
    /// # Errors
    ///
    /// Returns an error for any failure other than "no rows"
    async fn find_active_qr_session(&self, token: &str)
        -> Result<Option<QrSession>, BackendError>;

    /// Sessions issued by an admin, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    async fn list_qr_sessions(&self, admin_id: &str) -> Result<Vec<QrSession>, BackendError>;

    /// # Errors
    ///
    /// Returns an error for any failure other than "no rows"
    async fn find_attendance(
        &self,
        qr_code_id: &str,
        student_id: &str,
    ) -> Result<Option<AttendanceRecord>, BackendError>;

    /// # Errors
    ///
    /// Returns an error if the insert is rejected
    async fn insert_attendance(
        &self,
        record: &NewAttendance,
    ) -> Result<AttendanceRecord, BackendError>;

    /// Records for one session, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    async fn list_session_attendance(
        &self,
        qr_code_id: &str,
    ) -> Result<Vec<AttendanceRecord>, BackendError>;

    /// Records for one student, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    async fn list_student_attendance(
        &self,
        student_id: &str,
    ) -> Result<Vec<AttendanceRecord>, BackendError>;
}
