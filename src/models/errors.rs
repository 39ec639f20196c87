//! Errors reported by the hosted backend
//!
//! The auth API and the data API share one error type. Callers branch on the
//! stable codes the data API attaches to its error payloads rather than on
//! messages.

use thiserror::Error;

/// Data API code for "the single-row request matched no rows"
pub const NO_ROWS_CODE: &str = "PGRST116";

/// Data API code for a request carrying an expired access token
pub const JWT_EXPIRED_CODE: &str = "PGRST301";

/// Postgres SQLSTATE for a unique constraint violation
pub const UNIQUE_VIOLATION_CODE: &str = "23505";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend answered with an error payload
    #[error("{message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },
    /// The request never produced a response
    #[error("request to hosted backend failed: {0}")]
    Transport(String),
    /// The response could not be understood
    #[error("unexpected response from hosted backend: {0}")]
    Decode(String),
    /// An operation needed a signed-in identity and there was none
    #[error("No user logged in")]
    NotSignedIn,
}

impl BackendError {
    #[must_use]
    pub fn api(status: u16, code: Option<&str>, message: impl Into<String>) -> Self {
        BackendError::Api {
            status,
            code: code.map(ToString::to_string),
            message: message.into(),
        }
    }

    /// Stable error code, when the backend supplied one
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            BackendError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_no_rows(&self) -> bool {
        self.code() == Some(NO_ROWS_CODE)
    }

    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        self.code() == Some(UNIQUE_VIOLATION_CODE)
    }

    #[must_use]
    pub fn is_jwt_expired(&self) -> bool {
        self.code() == Some(JWT_EXPIRED_CODE)
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}
