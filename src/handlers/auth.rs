// Authentication handlers: login, registration and logout
use super::helpers::landing_path;
use crate::errors::AppError;
use crate::notifications::Notification;
use crate::session::Session;
use crate::state::AppState;
use crate::utils::responses::ResponseBuilder;
use crate::validation::{friendly_message, LoginForm, RegistrationForm};
use actix_web::{web, HttpResponse, Result};
use log::{debug, info};
use serde_json::json;

/// Signed-in visitors of `/login` or `/register` go to their dashboard
fn signed_in_redirect(session: &Session) -> Option<HttpResponse> {
    if session.loading {
        return Some(ResponseBuilder::loading());
    }
    landing_path(session).map(ResponseBuilder::redirect)
}

/// Login view
///
/// # Errors
/// Never fails; the view is built from the current session
pub async fn login_page(state: web::Data<AppState>) -> Result<HttpResponse> {
    let session = state.session.snapshot();
    if let Some(response) = signed_in_redirect(&session) {
        return Ok(response);
    }

    Ok(ResponseBuilder::ok().json(&json!({
        "view": "login",
        "fields": ["email", "password"],
        "register": "/register",
    })))
}

/// Sign in and send the user to their dashboard
///
/// # Errors
/// Returns an error if validation fails, the credentials are rejected or the
/// session does not settle in time
pub async fn login(
    state: web::Data<AppState>,
    form: web::Json<LoginForm>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    if let Err(err) = form.validate() {
        state.notifier.push(err.notification());
        return Err(err.into());
    }

    let session = state.session.sign_in(form.email(), &form.password).await?;
    match landing_path(&session) {
        Some(location) => {
            info!("User signed in, continuing to {location}");
            Ok(ResponseBuilder::see_other(location))
        }
        None => {
            state.notifier.push(Notification::error(
                "Profile Missing",
                "Your profile could not be loaded. Please try logging in again or contact support.",
            ));
            Ok(ResponseBuilder::see_other("/login"))
        }
    }
}

/// Registration view
///
/// # Errors
/// Never fails; the view is built from the current session
pub async fn register_page(state: web::Data<AppState>) -> Result<HttpResponse> {
    let session = state.session.snapshot();
    if let Some(response) = signed_in_redirect(&session) {
        return Ok(response);
    }

    Ok(ResponseBuilder::ok().json(&json!({
        "view": "register",
        "fields": [
            "full_name", "email", "password", "confirm_password", "role",
            "enrollment_no", "semester", "branch", "course",
        ],
        "roles": ["student", "admin"],
        "login": "/login",
    })))
}

/// Create an account
///
/// # Errors
/// Returns an error if validation fails or the provider rejects the
/// registration
pub async fn register(
    state: web::Data<AppState>,
    form: web::Json<RegistrationForm>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    if let Err(err) = form.validate() {
        state.notifier.push(err.notification());
        return Err(err.into());
    }

    let result = match state
        .session
        .sign_up(form.email(), &form.password, &form.metadata())
        .await
    {
        Ok(result) => result,
        Err(err) => {
            state.notifier.push(Notification::error(
                "Registration Failed",
                friendly_message(&err.to_string()),
            ));
            return Err(err.into());
        }
    };

    state.notifier.push(Notification::info(
        "Registration Successful",
        "Your account has been created successfully! You can now log in.",
    ));

    let signed_in = result.session.is_some();
    if signed_in {
        if let Some(location) = landing_path(&state.session.snapshot()) {
            return Ok(ResponseBuilder::see_other(location));
        }
    }
    debug!("Registered {} without an active session", result.user.id);

    Ok(ResponseBuilder::created().json(&json!({
        "user_id": result.user.id,
        "email": result.user.email,
        "confirmation_required": !signed_in,
        "login": "/login",
    })))
}

/// Sign out and return to the login view
///
/// # Errors
/// Returns an error if the provider could not end the session
pub async fn logout(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    state.session.sign_out().await?;
    Ok(ResponseBuilder::see_other("/login"))
}
