//! Route guard for role-scoped views
//!
//! Evaluation is a pure function of the session's loading flag, whether an
//! identity and a profile are present, the profile's role and the role the
//! view requires.

use crate::models::Role;
use crate::notifications::Notification;
use crate::session::Session;
use std::fmt;

/// Inputs the guard decides on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardInput {
    pub loading: bool,
    pub has_identity: bool,
    /// Role of the loaded profile; `None` when there is no profile
    pub profile_role: Option<Role>,
    pub required_role: Option<Role>,
}

impl GuardInput {
    #[must_use]
    pub fn from_session(session: &Session, required_role: Option<Role>) -> Self {
        Self {
            loading: session.loading,
            has_identity: session.identity.is_some(),
            profile_role: session.profile.as_ref().map(|profile| profile.role),
            required_role,
        }
    }

    #[must_use]
    pub fn evaluate(self) -> GuardState {
        if self.loading {
            return GuardState::Loading;
        }
        if !self.has_identity {
            return GuardState::Unauthenticated;
        }
        let Some(actual) = self.profile_role else {
            return GuardState::ProfileError;
        };
        match self.required_role {
            Some(required) if required != actual => GuardState::Forbidden { actual },
            _ => GuardState::Admitted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Loading,
    Unauthenticated,
    ProfileError,
    Forbidden { actual: Role },
    Admitted,
}

/// What the HTTP layer should do for a guard state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Render a placeholder and do not navigate
    Wait,
    Redirect {
        location: &'static str,
        notification: Option<Notification>,
    },
    Admit,
}

impl GuardState {
    #[must_use]
    pub fn decision(self) -> GuardDecision {
        match self {
            GuardState::Loading => GuardDecision::Wait,
            GuardState::Unauthenticated => GuardDecision::Redirect {
                location: "/login",
                notification: None,
            },
            GuardState::ProfileError => GuardDecision::Redirect {
                location: "/login",
                notification: Some(Notification::error(
                    "Authentication Error",
                    "Your profile could not be loaded. Please try logging in again.",
                )),
            },
            GuardState::Forbidden { actual } => GuardDecision::Redirect {
                location: actual.dashboard_path(),
                notification: Some(Notification::error(
                    "Access Denied",
                    "You don't have permission to access this page.",
                )),
            },
            GuardState::Admitted => GuardDecision::Admit,
        }
    }
}

impl fmt::Display for GuardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardState::Loading => f.write_str("LOADING"),
            GuardState::Unauthenticated => f.write_str("UNAUTHENTICATED"),
            GuardState::ProfileError => f.write_str("PROFILE_ERROR"),
            GuardState::Forbidden { actual } => write!(f, "FORBIDDEN({actual})"),
            GuardState::Admitted => f.write_str("ADMITTED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(
        loading: bool,
        has_identity: bool,
        profile_role: Option<Role>,
        required_role: Option<Role>,
    ) -> GuardInput {
        GuardInput {
            loading,
            has_identity,
            profile_role,
            required_role,
        }
    }

    #[test]
    fn test_signed_out_user_is_sent_to_login() {
        let state = input(false, false, None, Some(Role::Admin)).evaluate();
        assert_eq!(state, GuardState::Unauthenticated);
        assert_eq!(
            state.decision(),
            GuardDecision::Redirect {
                location: "/login",
                notification: None
            }
        );
    }

    #[test]
    fn test_student_on_admin_view_is_sent_to_student_dashboard() {
        let state = input(false, true, Some(Role::Student), Some(Role::Admin)).evaluate();
        assert_eq!(state, GuardState::Forbidden { actual: Role::Student });

        let GuardDecision::Redirect {
            location,
            notification,
        } = state.decision()
        else {
            panic!("expected redirect");
        };
        assert_eq!(location, "/student");
        assert_eq!(notification.unwrap().title, "Access Denied");
    }

    #[test]
    fn test_missing_profile_is_a_profile_error() {
        let state = input(false, true, None, Some(Role::Student)).evaluate();
        assert_eq!(state, GuardState::ProfileError);

        let GuardDecision::Redirect {
            location,
            notification,
        } = state.decision()
        else {
            panic!("expected redirect");
        };
        assert_eq!(location, "/login");
        assert!(notification
            .unwrap()
            .description
            .contains("profile could not be loaded"));
    }

    #[test]
    fn test_loading_wins_over_everything() {
        for has_identity in [false, true] {
            for role in [None, Some(Role::Admin), Some(Role::Student)] {
                let state = input(true, has_identity, role, Some(Role::Admin)).evaluate();
                assert_eq!(state, GuardState::Loading);
                assert_eq!(state.decision(), GuardDecision::Wait);
            }
        }
    }

    #[test]
    fn test_matching_or_unrestricted_role_is_admitted() {
        assert_eq!(
            input(false, true, Some(Role::Admin), Some(Role::Admin)).evaluate(),
            GuardState::Admitted
        );
        assert_eq!(
            input(false, true, Some(Role::Admin), None).evaluate(),
            GuardState::Admitted
        );
    }

    #[test]
    fn test_evaluation_is_pure() {
        let guard_input = input(false, true, Some(Role::Student), Some(Role::Admin));
        assert_eq!(guard_input.evaluate(), guard_input.evaluate());
    }

    #[test]
    fn test_from_session() {
        let session = Session::default();
        let guard_input = GuardInput::from_session(&session, Some(Role::Student));
        assert!(guard_input.loading);
        assert!(!guard_input.has_identity);
        assert_eq!(guard_input.profile_role, None);
    }
}
