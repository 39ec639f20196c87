// Diagnostic views: connection check, manual profile creation and a scripted
// test registration
use crate::errors::AppError;
use crate::models::{Role, UserMetadata};
use crate::notifications::Notification;
use crate::session::{BootstrapOutcome, SessionStoreError};
use crate::state::AppState;
use crate::utils::responses::ResponseBuilder;
use crate::validation::{friendly_message, ValidationError, MIN_PASSWORD_LENGTH};
use actix_web::{web, HttpResponse, Result};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

const TEST_EMAIL: &str = "test@example.com";
const TEST_PASSWORD: &str = "password123";
const TEST_FULL_NAME: &str = "Test User";

/// One step of the scripted registration
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: &'static str,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepReport {
    fn passed(step: &'static str, message: impl Into<String>) -> Self {
        Self {
            step,
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    fn failed(step: &'static str, error: impl Into<String>) -> Self {
        Self {
            step,
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TestRegistrationRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: Role,
}

impl Default for TestRegistrationRequest {
    fn default() -> Self {
        Self {
            email: TEST_EMAIL.to_string(),
            password: TEST_PASSWORD.to_string(),
            full_name: TEST_FULL_NAME.to_string(),
            role: Role::Student,
        }
    }
}

impl TestRegistrationRequest {
    /// Test accounts carry only a name and a role, no enrollment details
    fn metadata(&self) -> UserMetadata {
        UserMetadata {
            full_name: Some(self.full_name.clone()),
            role: Some(self.role.as_str().to_string()),
            ..UserMetadata::default()
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.email.trim().is_empty() {
            return Err(ValidationError::MissingField("Email"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ValidationError::WeakPassword);
        }
        Ok(())
    }
}

// =============================================================================
// Database fix
// =============================================================================

/// # Errors
/// Never fails; the view is built from the current session
pub async fn database_fix_page(state: web::Data<AppState>) -> Result<HttpResponse> {
    let session = state.session.snapshot();
    Ok(ResponseBuilder::ok().json(&json!({
        "view": "database-fix",
        "signed_in": session.is_signed_in(),
        "has_profile": session.profile.is_some(),
        "actions": {
            "test_connection": "/database-fix/test-connection",
            "create_profile": "/database-fix/create-profile",
        },
    })))
}

/// Probe the `profiles` relation
///
/// # Errors
/// Never fails; a failed check is reported in the body
pub async fn test_connection(state: web::Data<AppState>) -> Result<HttpResponse> {
    match state.profiles.check_connection().await {
        Ok(()) => {
            info!("Database connection check passed");
            Ok(ResponseBuilder::ok().json(&json!({
                "success": true,
                "message": "Database connection successful",
            })))
        }
        Err(err) => {
            warn!("Database connection check failed: {err}");
            Ok(ResponseBuilder::ok().json(&json!({
                "success": false,
                "error": friendly_message(&err.to_string()),
            })))
        }
    }
}

/// Create the signed-in user's profile if it is missing
///
/// # Errors
/// Returns an error without a signed-in identity or if the bootstrap fails
pub async fn create_profile(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    match state.session.refresh_profile().await {
        Ok((profile, outcome)) => {
            let notification = match outcome {
                BootstrapOutcome::Created => {
                    Notification::info("Success", "Profile created successfully!")
                }
                BootstrapOutcome::Existing | BootstrapOutcome::Reconciled => Notification::info(
                    "Profile Found",
                    "Profile already exists and was loaded successfully",
                ),
            };
            state.notifier.push(notification);
            Ok(ResponseBuilder::ok().json(&json!({
                "success": true,
                "created": outcome == BootstrapOutcome::Created,
                "profile": profile,
            })))
        }
        Err(SessionStoreError::NotSignedIn) => {
            state.notifier.push(Notification::error(
                "Authentication Error",
                "Please log in first to create a profile",
            ));
            Err(SessionStoreError::NotSignedIn.into())
        }
        Err(err) => {
            error!("Manual profile creation failed: {err}");
            state.notifier.push(Notification::error(
                "Error",
                format!("Failed to create profile: {}", friendly_message(&err.to_string())),
            ));
            Err(err.into())
        }
    }
}

// =============================================================================
// Test registration
// =============================================================================

/// # Errors
/// Never fails
pub async fn test_registration_page() -> Result<HttpResponse> {
    Ok(ResponseBuilder::ok().json(&json!({
        "view": "test-registration",
        "defaults": {
            "email": TEST_EMAIL,
            "password": TEST_PASSWORD,
            "full_name": TEST_FULL_NAME,
            "role": Role::Student,
        },
        "cleanup": "/test-registration/cleanup",
    })))
}

/// Register a test account, bootstrap its profile and sign in, reporting
/// each step
///
/// # Errors
/// Never fails; failed steps are reported in the body
pub async fn run_test_registration(
    state: web::Data<AppState>,
    body: Option<web::Json<TestRegistrationRequest>>,
) -> Result<HttpResponse> {
    let request = body.map(web::Json::into_inner).unwrap_or_default();
    let mut steps = Vec::new();

    let signed_up = match request.validate() {
        Err(err) => {
            steps.push(StepReport::failed("Validation", err.to_string()));
            None
        }
        Ok(()) => match state
            .session
            .sign_up(&request.email, &request.password, &request.metadata())
            .await
        {
            Ok(result) => {
                steps.push(StepReport::passed(
                    "User Creation",
                    format!("Created user {}", result.user.id),
                ));
                Some(result)
            }
            Err(err) => {
                steps.push(StepReport::failed(
                    "User Creation",
                    friendly_message(&err.to_string()),
                ));
                None
            }
        },
    };

    let mut profile = None;
    if let Some(result) = &signed_up {
        if result.session.is_some() {
            match state.session.refresh_profile().await {
                Ok((created, outcome)) => {
                    let message = if outcome == BootstrapOutcome::Created {
                        "Profile created"
                    } else {
                        "Profile already existed"
                    };
                    steps.push(StepReport::passed("Profile Creation", message));
                    profile = Some(created);
                }
                Err(err) => steps.push(StepReport::failed(
                    "Profile Creation",
                    friendly_message(&err.to_string()),
                )),
            }
        } else {
            steps.push(StepReport::passed(
                "Profile Creation",
                "Skipped: no session issued, email confirmation is pending",
            ));
        }

        match state.session.sign_in(&request.email, &request.password).await {
            Ok(session) => {
                steps.push(StepReport::passed("Login", "Signed in"));
                if profile.is_none() {
                    profile = session.profile;
                }
            }
            Err(err) => steps.push(StepReport::failed(
                "Login",
                friendly_message(&err.to_string()),
            )),
        }
    }

    let success = !steps.is_empty() && steps.iter().all(|step| step.success);
    info!("Test registration for {} finished, success={success}", request.email);
    Ok(ResponseBuilder::ok().json(&json!({
        "success": success,
        "steps": steps,
        "profile": profile,
    })))
}

/// Sign the test user out
///
/// # Errors
/// Never fails; a failed sign-out is logged
pub async fn cleanup_test_registration(state: web::Data<AppState>) -> Result<HttpResponse> {
    if let Err(err) = state.session.sign_out().await {
        warn!("Test registration cleanup could not sign out: {err}");
    }
    state.notifier.push(Notification::info(
        "Cleanup",
        "Test user signed out. Manual cleanup may be needed.",
    ));
    Ok(ResponseBuilder::ok().json(&json!({ "success": true })))
}
