//! HTTP response handling system
//!
//! This module provides a unified interface for creating HTTP responses across the application,
//! offering consistent patterns for errors, redirects, loading placeholders and JSON views while
//! keeping the most common error bodies pre-serialized.

use actix_web::http::{header, StatusCode};
use actix_web::HttpResponse;
use serde_json::{json, Value};

/// Seconds a client should wait before asking again while the session loads
pub const RETRY_AFTER_SECS: u32 = 1;

// ===============================
// CACHED RESPONSES FOR PERFORMANCE
// ===============================

/// Global instance of pre-serialized common responses
static CACHED_RESPONSES: std::sync::LazyLock<CachedResponses> =
    std::sync::LazyLock::new(CachedResponses::new);

/// Container for pre-serialized common HTTP response bodies
struct CachedResponses {
    invalid_request: String,
    unauthorized: String,
    not_found: String,
    server_error: String,
    bad_gateway: String,
    loading: String,
}

impl CachedResponses {
    fn new() -> Self {
        Self {
            invalid_request: Self::create_json(
                "invalid_request",
                "The request is malformed or invalid",
            ),
            unauthorized: Self::create_json(
                "unauthorized",
                "Authentication is required to access this resource",
            ),
            not_found: Self::create_json("not_found", "The requested page does not exist"),
            server_error: Self::create_json("server_error", "An internal server error occurred"),
            bad_gateway: Self::create_json(
                "bad_gateway",
                "The hosted backend could not be reached",
            ),
            loading: json!({ "loading": true }).to_string(),
        }
    }

    fn create_json(error: &str, description: &str) -> String {
        json!({
            "error": error,
            "error_description": description
        })
        .to_string()
    }

    fn respond(status: StatusCode, body: &str) -> HttpResponse {
        HttpResponse::build(status)
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .body(body.to_string())
    }
}

/// Unified response builder that handles all types of HTTP responses
pub struct ResponseBuilder;

impl ResponseBuilder {
    // ===============================
    // ERROR RESPONSE METHODS
    // ===============================

    #[must_use]
    pub fn bad_request() -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(StatusCode::BAD_REQUEST)
    }

    #[must_use]
    pub fn unauthorized() -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(StatusCode::UNAUTHORIZED)
    }

    #[must_use]
    pub fn not_found() -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(StatusCode::NOT_FOUND)
    }

    #[must_use]
    pub fn conflict() -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(StatusCode::CONFLICT)
    }

    /// Error response with an arbitrary status
    #[must_use]
    pub fn error(status: StatusCode) -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(status)
    }

    // ===============================
    // NAVIGATION
    // ===============================

    /// Redirect (302 Found)
    #[must_use]
    pub fn redirect(location: &str) -> HttpResponse {
        HttpResponse::Found()
            .append_header((header::LOCATION, location.to_string()))
            .finish()
    }

    /// Redirect after a form submission (303 See Other)
    #[must_use]
    pub fn see_other(location: &str) -> HttpResponse {
        HttpResponse::SeeOther()
            .append_header((header::LOCATION, location.to_string()))
            .finish()
    }

    /// Placeholder while the session is still loading; no navigation happens
    #[must_use]
    pub fn loading() -> HttpResponse {
        HttpResponse::Accepted()
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .insert_header((header::RETRY_AFTER, RETRY_AFTER_SECS.to_string()))
            .body(CACHED_RESPONSES.loading.clone())
    }

    // ===============================
    // SUCCESS RESPONSE METHODS
    // ===============================

    /// Create an OK response (200) with JSON content
    #[must_use]
    pub fn ok() -> JsonResponseBuilder {
        JsonResponseBuilder::new(StatusCode::OK)
    }

    /// Create a Created response (201) with JSON content
    #[must_use]
    pub fn created() -> JsonResponseBuilder {
        JsonResponseBuilder::new(StatusCode::CREATED)
    }

    // ===============================
    // CONVENIENCE METHODS
    // ===============================

    #[must_use]
    pub fn page_not_found() -> HttpResponse {
        CachedResponses::respond(StatusCode::NOT_FOUND, &CACHED_RESPONSES.not_found)
    }
}

// ===============================
// BUILDER TYPES
// ===============================

/// Builder for error responses with fluent interface
pub struct ErrorResponseBuilder {
    status: StatusCode,
    error_code: Option<String>,
    message: Option<String>,
    additional_fields: Option<Value>,
}

/// Builder for JSON responses
pub struct JsonResponseBuilder {
    status: StatusCode,
    headers: Vec<(String, String)>,
}

impl ErrorResponseBuilder {
    fn new(status: StatusCode) -> Self {
        Self {
            status,
            error_code: None,
            message: None,
            additional_fields: None,
        }
    }

    /// Set a custom error code (e.g., "`invalid_request`", "`already_marked`")
    #[must_use]
    pub fn with_error_code(mut self, code: &str) -> Self {
        self.error_code = Some(code.to_string());
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    /// Add additional JSON fields to the response
    #[must_use]
    pub fn with_additional_fields(mut self, fields: Value) -> Self {
        self.additional_fields = Some(fields);
        self
    }

    #[must_use]
    pub fn build(self) -> HttpResponse {
        if self.error_code.is_none() && self.message.is_none() && self.additional_fields.is_none() {
            if let Some(body) = self.cached_body() {
                return CachedResponses::respond(self.status, body);
            }
        }
        self.build_custom_response()
    }

    fn cached_body(&self) -> Option<&'static str> {
        let cached = &*CACHED_RESPONSES;
        match self.status {
            StatusCode::BAD_REQUEST => Some(cached.invalid_request.as_str()),
            StatusCode::UNAUTHORIZED => Some(cached.unauthorized.as_str()),
            StatusCode::NOT_FOUND => Some(cached.not_found.as_str()),
            StatusCode::INTERNAL_SERVER_ERROR => Some(cached.server_error.as_str()),
            StatusCode::BAD_GATEWAY => Some(cached.bad_gateway.as_str()),
            _ => None,
        }
    }

    fn build_custom_response(self) -> HttpResponse {
        let mut json_body = json!({
            "error": self.error_code.clone().unwrap_or_else(|| self.default_error_code().to_string()),
            "error_description": self.message.clone().unwrap_or_else(|| {
                self.status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            }),
        });

        if let Some(Value::Object(map)) = self.additional_fields {
            for (key, value) in map {
                json_body[key] = value;
            }
        }

        HttpResponse::build(self.status)
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .json(json_body)
    }

    fn default_error_code(&self) -> &'static str {
        match self.status {
            StatusCode::BAD_REQUEST => "invalid_request",
            StatusCode::UNAUTHORIZED => "unauthorized",
            StatusCode::FORBIDDEN => "forbidden",
            StatusCode::NOT_FOUND => "not_found",
            StatusCode::CONFLICT => "conflict",
            StatusCode::BAD_GATEWAY => "bad_gateway",
            _ => "server_error",
        }
    }
}

impl JsonResponseBuilder {
    fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Build the response with JSON content
    #[must_use]
    pub fn json<T: serde::Serialize>(self, data: &T) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status);
        for (name, value) in self.headers {
            builder.insert_header((name, value));
        }
        builder.json(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    async fn body_json(response: HttpResponse) -> Value {
        let bytes = to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[actix_web::test]
    async fn test_cached_error_body() {
        let response = ResponseBuilder::unauthorized().build();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "unauthorized");
        assert!(body["error_description"].is_string());
    }

    #[actix_web::test]
    async fn test_custom_error_body() {
        let response = ResponseBuilder::conflict()
            .with_error_code("already_marked")
            .with_message("Your attendance is already recorded for this session")
            .with_additional_fields(json!({ "title": "Already Marked" }))
            .build();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["error"], "already_marked");
        assert_eq!(body["title"], "Already Marked");
    }

    #[test]
    fn test_loading_placeholder() {
        let response = ResponseBuilder::loading();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "1");
    }

    #[test]
    fn test_redirects() {
        let found = ResponseBuilder::redirect("/login");
        assert_eq!(found.status(), StatusCode::FOUND);
        assert_eq!(found.headers().get(header::LOCATION).unwrap(), "/login");

        let see_other = ResponseBuilder::see_other("/admin");
        assert_eq!(see_other.status(), StatusCode::SEE_OTHER);
    }
}
