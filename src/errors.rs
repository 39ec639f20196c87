//! Handler-facing error type
//!
//! Every failure a handler can hit converts into [`AppError`], which renders
//! as the JSON body `{ "error", "error_description" }`. The user-visible
//! notification for the failure has already been queued by the layer that
//! produced it.

use crate::attendance::AttendanceError;
use crate::models::BackendError;
use crate::session::{BootstrapError, SessionStoreError};
use crate::utils::responses::ResponseBuilder;
use crate::validation::{friendly_message, ValidationError};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Session(#[from] SessionStoreError),
    #[error(transparent)]
    Attendance(#[from] AttendanceError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
}

fn backend_status(err: &BackendError) -> StatusCode {
    match err {
        BackendError::NotSignedIn => StatusCode::UNAUTHORIZED,
        BackendError::Api { status, .. } if (400..500).contains(status) => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST)
        }
        BackendError::Api { .. } | BackendError::Transport(_) | BackendError::Decode(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

impl AppError {
    fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(ValidationError::MissingField(_)) => "missing_field",
            AppError::Validation(ValidationError::PasswordMismatch) => "password_mismatch",
            AppError::Validation(ValidationError::WeakPassword) => "weak_password",
            AppError::Session(SessionStoreError::NotSignedIn)
            | AppError::Attendance(AttendanceError::NotSignedIn)
            | AppError::Backend(BackendError::NotSignedIn) => "not_signed_in",
            AppError::Session(SessionStoreError::Timeout(_)) => "session_loading",
            AppError::Session(SessionStoreError::Closed) => "session_closed",
            AppError::Session(SessionStoreError::Bootstrap(_)) | AppError::Bootstrap(_) => {
                "profile_error"
            }
            AppError::Attendance(AttendanceError::EmptySessionName) => "missing_session_name",
            AppError::Attendance(AttendanceError::Qr(_)) => "qr_encoding_failed",
            AppError::Session(SessionStoreError::Backend(_))
            | AppError::Attendance(AttendanceError::Backend(_))
            | AppError::Backend(_) => "backend_error",
        }
    }

    fn description(&self) -> String {
        friendly_message(&self.to_string())
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Attendance(AttendanceError::EmptySessionName) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Session(SessionStoreError::NotSignedIn)
            | AppError::Attendance(AttendanceError::NotSignedIn) => StatusCode::UNAUTHORIZED,
            AppError::Session(SessionStoreError::Timeout(_)) => StatusCode::ACCEPTED,
            AppError::Session(SessionStoreError::Closed) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Session(SessionStoreError::Backend(err))
            | AppError::Attendance(AttendanceError::Backend(err))
            | AppError::Backend(err) => backend_status(err),
            AppError::Session(SessionStoreError::Bootstrap(_))
            | AppError::Bootstrap(_)
            | AppError::Attendance(AttendanceError::Qr(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status == StatusCode::ACCEPTED {
            return ResponseBuilder::loading();
        }

        ResponseBuilder::error(status)
            .with_error_code(self.error_code())
            .with_message(&self.description())
            .build()
    }
}
