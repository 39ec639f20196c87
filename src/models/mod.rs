//! Data types shared across the session, guard and attendance layers.
//!
//! Identities and auth sessions are issued by the hosted auth provider and are
//! never mutated locally. Profiles and attendance rows live in the hosted data
//! store and are only ever read or written through the backend traits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod attendance;
pub mod errors;
pub mod profile;

pub use attendance::{AttendanceRecord, AttendanceStatus, NewAttendance, NewQrSession, QrSession};
pub use errors::BackendError;
pub use profile::{NewProfile, Profile, ProfileUpdate};

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

/// Role of a profile; decides which dashboard a user lands on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Student,
}

impl Role {
    /// Dashboard route for this role
    #[must_use]
    pub fn dashboard_path(self) -> &'static str {
        match self {
            Role::Admin => "/admin",
            Role::Student => "/student",
        }
    }

    /// Parse a role coming from free-form sign-up metadata.
    ///
    /// Anything that is not recognisably `admin` becomes `student`.
    #[must_use]
    pub fn from_metadata(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("admin") => Role::Admin,
            _ => Role::Student,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata attached to an identity at sign-up time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semester: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,
}

/// Authenticated principal as issued by the auth provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub metadata: UserMetadata,
}

impl Identity {
    /// Local part of the email address, if there is one
    #[must_use]
    pub fn email_local_part(&self) -> Option<&str> {
        self.email
            .split('@')
            .next()
            .filter(|local| !local.trim().is_empty())
    }
}

/// Credential-bearing session issued by the auth provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub user: Identity,
}

/// Kind of authentication event delivered by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

impl fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthEvent::InitialSession => "INITIAL_SESSION",
            AuthEvent::SignedIn => "SIGNED_IN",
            AuthEvent::SignedOut => "SIGNED_OUT",
            AuthEvent::TokenRefreshed => "TOKEN_REFRESHED",
            AuthEvent::UserUpdated => "USER_UPDATED",
        };
        f.write_str(name)
    }
}

/// One entry of the provider's authentication event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthStateChange {
    pub event: AuthEvent,
    pub session: Option<AuthSession>,
}

impl AuthStateChange {
    #[must_use]
    pub fn new(event: AuthEvent, session: Option<AuthSession>) -> Self {
        Self { event, session }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self::new(AuthEvent::SignedOut, None)
    }

    /// Identity carried by the event, `None` on sign-out
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.session.as_ref().map(|session| &session.user)
    }
}

/// Result of a sign-up call.
///
/// Providers that require email confirmation return the new identity without a
/// session; auto-confirming providers sign the user in straight away.
#[derive(Debug, Clone)]
pub struct SignUpResult {
    pub user: Identity,
    pub session: Option<AuthSession>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_metadata_defaults_to_student() {
        assert_eq!(Role::from_metadata(None), Role::Student);
        assert_eq!(Role::from_metadata(Some("lecturer")), Role::Student);
        assert_eq!(Role::from_metadata(Some(" Admin ")), Role::Admin);
    }

    #[test]
    fn test_role_dashboard_paths() {
        assert_eq!(Role::Admin.dashboard_path(), "/admin");
        assert_eq!(Role::Student.dashboard_path(), "/student");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Admin).unwrap();
        assert_eq!(json, "\"admin\"");
        let role: Role = serde_json::from_str("\"student\"").unwrap();
        assert_eq!(role, Role::Student);
    }

    #[test]
    fn test_email_local_part() {
        let identity = Identity {
            id: "u1".to_string(),
            email: "jane.doe@example.com".to_string(),
            metadata: UserMetadata::default(),
        };
        assert_eq!(identity.email_local_part(), Some("jane.doe"));

        let no_local = Identity {
            email: "@example.com".to_string(),
            ..identity
        };
        assert_eq!(no_local.email_local_part(), None);
    }
}
