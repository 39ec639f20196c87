// Role-scoped views: admin QR sessions, student scanning and the profile page
use super::helpers::guard;
use crate::attendance::{AttendanceError, MarkOutcome};
use crate::errors::AppError;
use crate::models::{ProfileUpdate, Role};
use crate::notifications::Notification;
use crate::state::AppState;
use crate::utils::responses::ResponseBuilder;
use actix_web::{web, HttpRequest, HttpResponse, Result};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct GenerateQrRequest {
    #[serde(default)]
    pub session_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    /// Decoded content of the scanned QR code
    pub qr_data: String,
}

// =============================================================================
// Admin
// =============================================================================

/// Admin dashboard: profile and the admin's sessions with scan counts
///
/// # Errors
/// Returns an error if the sessions cannot be listed
pub async fn admin_dashboard(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let admin = match guard(&state, req.path(), Some(Role::Admin)) {
        Ok(admitted) => admitted,
        Err(response) => return Ok(response),
    };

    let sessions = state
        .attendance
        .sessions_for_admin(&admin.identity.id)
        .await?;
    Ok(ResponseBuilder::ok().json(&json!({
        "view": "admin-dashboard",
        "profile": admin.profile,
        "sessions": sessions,
    })))
}

/// Issue a QR attendance session
///
/// # Errors
/// Returns an error for a blank session name or if the session cannot be
/// stored or rendered
pub async fn generate_qr(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<GenerateQrRequest>,
) -> Result<HttpResponse, AppError> {
    let admin = match guard(&state, req.path(), Some(Role::Admin)) {
        Ok(admitted) => admitted,
        Err(response) => return Ok(response),
    };

    match state
        .attendance
        .create_session(&admin.identity, &body.session_name)
        .await
    {
        Ok(generated) => {
            state.notifier.push(Notification::info(
                "QR Code Generated",
                "QR code has been generated successfully!",
            ));
            let listing = format!("/admin/qr/{}/attendance", generated.session.id);
            Ok(ResponseBuilder::created()
                .with_header("Location", &listing)
                .json(&generated))
        }
        Err(err) => {
            state.notifier.push(err.generation_notification());
            Err(err.into())
        }
    }
}

/// Attendance recorded against one session
///
/// # Errors
/// Returns an error if the records cannot be listed
pub async fn session_attendance(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    if let Err(response) = guard(&state, req.path(), Some(Role::Admin)) {
        return Ok(response);
    }

    let qr_code_id = path.into_inner();
    let records = state.attendance.records_for_session(&qr_code_id).await?;
    Ok(ResponseBuilder::ok().json(&json!({
        "qr_code_id": qr_code_id,
        "total": records.len(),
        "records": records,
    })))
}

// =============================================================================
// Student
// =============================================================================

/// Student dashboard: profile and attendance history
///
/// # Errors
/// Returns an error if the history cannot be listed
pub async fn student_dashboard(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let student = match guard(&state, req.path(), Some(Role::Student)) {
        Ok(admitted) => admitted,
        Err(response) => return Ok(response),
    };

    let history = state
        .attendance
        .history_for_student(&student.identity.id)
        .await?;
    Ok(ResponseBuilder::ok().json(&json!({
        "view": "student-dashboard",
        "profile": student.profile,
        "history": history,
    })))
}

/// Mark attendance from a scanned QR code
///
/// # Errors
/// Returns an error without a signed-in student, or if the store fails
pub async fn scan(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<ScanRequest>,
) -> Result<HttpResponse, AppError> {
    let session = state.session.snapshot();
    if session.loading {
        return Ok(ResponseBuilder::loading());
    }
    if session.identity.is_none() || session.profile.is_none() {
        let err = AttendanceError::NotSignedIn;
        state.notifier.push(err.scan_notification());
        return Err(err.into());
    }

    let student = match guard(&state, req.path(), Some(Role::Student)) {
        Ok(admitted) => admitted,
        Err(response) => return Ok(response),
    };

    let outcome = match state
        .attendance
        .mark_attendance(&student.identity, &student.profile, &body.qr_data)
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            state.notifier.push(err.scan_notification());
            return Err(err.into());
        }
    };

    let notification = outcome.notification();
    state.notifier.push(notification.clone());

    Ok(match outcome {
        MarkOutcome::Marked { record, .. } => ResponseBuilder::created().json(&json!({
            "message": notification.description,
            "record": record,
        })),
        MarkOutcome::InvalidCode => ResponseBuilder::bad_request()
            .with_error_code("invalid_qr_code")
            .with_message(&notification.description)
            .with_additional_fields(json!({ "title": notification.title }))
            .build(),
        MarkOutcome::NotFoundOrExpired => ResponseBuilder::not_found()
            .with_error_code("qr_not_found")
            .with_message(&notification.description)
            .with_additional_fields(json!({ "title": notification.title }))
            .build(),
        MarkOutcome::AlreadyMarked => ResponseBuilder::conflict()
            .with_error_code("already_marked")
            .with_message(&notification.description)
            .with_additional_fields(json!({ "title": notification.title }))
            .build(),
    })
}

// =============================================================================
// Profile
// =============================================================================

/// The signed-in user's profile
///
/// # Errors
/// Never fails once admitted
pub async fn profile_page(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    match guard(&state, req.path(), None) {
        Ok(admitted) => Ok(ResponseBuilder::ok().json(&json!({
            "view": "profile",
            "email": admitted.identity.email,
            "profile": admitted.profile,
        }))),
        Err(response) => Ok(response),
    }
}

/// Update the signed-in user's profile
///
/// # Errors
/// Returns an error if the store rejects the update
pub async fn update_profile(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<ProfileUpdate>,
) -> Result<HttpResponse, AppError> {
    if let Err(response) = guard(&state, req.path(), None) {
        return Ok(response);
    }

    let update = body.into_inner();
    if update.is_empty() {
        return Ok(ResponseBuilder::bad_request()
            .with_error_code("empty_update")
            .with_message("No profile fields to update")
            .build());
    }

    match state.session.update_profile(&update).await {
        Ok(profile) => {
            state
                .notifier
                .push(Notification::info("Profile Updated", "Your profile has been saved."));
            Ok(ResponseBuilder::ok().json(&profile))
        }
        Err(err) => {
            state
                .notifier
                .push(Notification::error("Error", "Failed to update profile"));
            Err(err.into())
        }
    }
}
