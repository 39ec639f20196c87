// Landing page, health check, session and notification feeds, 404
use super::helpers::landing_path;
use crate::models::HealthResponse;
use crate::state::AppState;
use crate::utils::responses::ResponseBuilder;
use actix_web::{web, HttpRequest, HttpResponse, Result};
use log::warn;
use serde_json::json;

/// Landing page: links to the entry points, and the dashboard when signed in
///
/// # Errors
/// Never fails
pub async fn index(state: web::Data<AppState>) -> Result<HttpResponse> {
    let session = state.session.snapshot();
    if session.loading {
        return Ok(ResponseBuilder::loading());
    }

    Ok(ResponseBuilder::ok().json(&json!({
        "view": "index",
        "app": "AttendQR",
        "signed_in": session.is_signed_in(),
        "dashboard": landing_path(&session),
        "links": {
            "login": "/login",
            "register": "/register",
        },
    })))
}

/// Health check endpoint
///
/// # Errors
/// Returns an error if health status cannot be determined
pub async fn health() -> Result<HttpResponse> {
    let response = HealthResponse {
        status: "ok".to_string(),
        message: "AttendQR is running".to_string(),
    };
    Ok(HttpResponse::Ok().json(response))
}

/// Current session projection
///
/// # Errors
/// Never fails
pub async fn session_state(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(ResponseBuilder::ok().json(&state.session.snapshot()))
}

/// Drain queued notifications, oldest first
///
/// # Errors
/// Never fails
pub async fn notifications(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(ResponseBuilder::ok().json(&state.notifier.drain()))
}

/// Catch-all for unknown routes
///
/// # Errors
/// Never fails
pub async fn not_found(req: HttpRequest) -> Result<HttpResponse> {
    warn!("404: no route for {} {}", req.method(), req.path());
    Ok(ResponseBuilder::page_not_found())
}
