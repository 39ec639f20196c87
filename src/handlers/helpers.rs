// Shared handler plumbing: guard adapter and small view helpers
use crate::guard::{GuardDecision, GuardInput};
use crate::models::{Identity, Profile, Role};
use crate::session::Session;
use crate::state::AppState;
use crate::utils::logging::LoggingHelper;
use crate::utils::responses::ResponseBuilder;
use actix_web::HttpResponse;

/// A session the guard admitted; identity and profile are both present
pub struct Admitted {
    pub identity: Identity,
    pub profile: Profile,
}

/// Run the route guard for `path` against the current session.
///
/// Returns the signed-in user on admission, otherwise the response to send:
/// a loading placeholder or a redirect with its notification queued.
///
/// # Errors
///
/// Returns the loading or redirect response when the guard does not admit
pub fn guard(
    state: &AppState,
    path: &str,
    required_role: Option<Role>,
) -> Result<Admitted, HttpResponse> {
    let session = state.session.snapshot();
    let evaluated = GuardInput::from_session(&session, required_role).evaluate();
    LoggingHelper::log_guard_decision(path, &evaluated.to_string());

    match evaluated.decision() {
        GuardDecision::Wait => Err(ResponseBuilder::loading()),
        GuardDecision::Redirect {
            location,
            notification,
        } => {
            if let Some(notification) = notification {
                state.notifier.push(notification);
            }
            Err(ResponseBuilder::redirect(location))
        }
        GuardDecision::Admit => match (session.identity, session.profile) {
            (Some(identity), Some(profile)) => Ok(Admitted { identity, profile }),
            _ => Err(ResponseBuilder::redirect("/login")),
        },
    }
}

/// Where a settled, signed-in session belongs
#[must_use]
pub fn landing_path(session: &Session) -> Option<&'static str> {
    session
        .profile
        .as_ref()
        .map(|profile| profile.role.dashboard_path())
}
