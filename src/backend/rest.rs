//! HTTP adapter for the hosted backend
//!
//! One `HostedBackend` talks to both halves of the hosted service: the auth
//! API under `/auth/v1` and the data API under `/rest/v1`. It keeps the
//! current auth session in memory (the provider persists the credential) and
//! publishes auth state changes on a broadcast channel.

use crate::models::{AuthSession, AuthStateChange, BackendError};
use crate::settings::BackendSettings;
use log::{debug, warn};
use reqwest::{header, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use url::Url;

/// Capacity of the auth event channel; slow subscribers skip to newer events
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Accept header asking the data API for exactly one row
pub(super) const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Hosted backend client implementing every backend trait
pub struct HostedBackend {
    pub(super) client: Client,
    base_url: Url,
    anon_key: String,
    session: RwLock<Option<AuthSession>>,
    /// Serializes token refreshes; the provider rotates refresh tokens
    pub(super) refresh_lock: Mutex<()>,
    events: broadcast::Sender<AuthStateChange>,
}

impl HostedBackend {
    /// Build a client from backend settings
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built
    pub fn from_settings(settings: &BackendSettings) -> Result<Self, BackendError> {
        let base_url = Url::parse(&settings.url)
            .map_err(|e| BackendError::Transport(format!("invalid backend url '{}': {e}", settings.url)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;
        Ok(Self::new(client, base_url, settings.get_anon_key()))
    }

    #[must_use]
    pub fn new(client: Client, base_url: Url, anon_key: String) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            client,
            base_url,
            anon_key,
            session: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            events,
        }
    }

    /// Absolute URL for a path below the backend base URL
    pub(super) fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{base}/{path}"))
            .map_err(|e| BackendError::Transport(format!("invalid endpoint '{path}': {e}")))
    }

    /// Data API URL for a relation
    pub(super) fn table(&self, relation: &str) -> Result<Url, BackendError> {
        self.endpoint(&format!("rest/v1/{relation}"))
    }

    /// Attach the API key and the bearer credential.
    ///
    /// Requests made while signed in carry the user's access token so the
    /// backend's row-level security applies; otherwise the anon key is used.
    pub(super) fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .current_session()
            .map_or_else(|| self.anon_key.clone(), |session| session.access_token);
        builder
            .header("apikey", &self.anon_key)
            .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
    }

    pub(super) fn current_session(&self) -> Option<AuthSession> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(super) fn store_session(&self, session: Option<AuthSession>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    pub(super) fn publish(&self, change: AuthStateChange) {
        let event = change.event;
        if self.events.send(change).is_err() {
            debug!("No subscribers for auth event {event}");
        }
    }

    pub(super) fn subscribe_events(&self) -> broadcast::Receiver<AuthStateChange> {
        self.events.subscribe()
    }

    /// Send a request and decode a JSON body, mapping error payloads
    pub(super) async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, BackendError> {
        let response = self.send_authorized(builder).await?;
        Ok(response.json::<T>().await?)
    }

    /// Like [`Self::send_json`] but always authenticated with the anon key.
    ///
    /// Used for the auth API's credential exchanges, which must not carry a
    /// possibly expired user token.
    pub(super) async fn send_json_anonymous<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, BackendError> {
        let response = builder
            .header("apikey", &self.anon_key)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.anon_key))
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Send a request whose response body is not needed
    pub(super) async fn send_empty(&self, builder: RequestBuilder) -> Result<(), BackendError> {
        self.send_authorized(builder).await?;
        Ok(())
    }

    /// Send with the user's credential, refreshing it first when it has
    /// expired. A request the data API still rejects as expired is refreshed
    /// and retried once.
    async fn send_authorized(&self, builder: RequestBuilder) -> Result<Response, BackendError> {
        self.refresh_if_expired().await?;

        let retry = builder.try_clone();
        let sent_token = self.current_session().map(|session| session.access_token);
        let response = self.authorize(builder).send().await?;
        match Self::check_status(response).await {
            Err(err) if err.is_jwt_expired() => {
                let Some(retry) = retry else {
                    return Err(err);
                };
                if !self.refresh_rejected(sent_token.as_deref()).await? {
                    return Err(err);
                }
                debug!("Retrying request with refreshed credential");
                let response = self.authorize(retry).send().await?;
                Self::check_status(response).await
            }
            other => other,
        }
    }

    pub(super) async fn check_status(response: Response) -> Result<Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let error = parse_error_body(status.as_u16(), &body);
        warn!("Hosted backend returned {status}: {error}");
        Err(error)
    }
}

/// Error payload of either API.
///
/// The data API sends `{code, message, details, hint}` with string codes; the
/// auth API sends a numeric `code` with `error_code`/`msg`, or the OAuth-style
/// `error`/`error_description` pair.
#[derive(Debug, Default, Deserialize)]
struct ErrorPayload {
    code: Option<serde_json::Value>,
    error_code: Option<String>,
    error: Option<String>,
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
}

pub(super) fn parse_error_body(status: u16, body: &str) -> BackendError {
    let payload: ErrorPayload = serde_json::from_str(body).unwrap_or_default();

    let code = match payload.code {
        Some(serde_json::Value::String(code)) => Some(code),
        _ => payload.error_code.or_else(|| payload.error.clone()),
    };
    let message = payload
        .message
        .or(payload.msg)
        .or(payload.error_description)
        .or(payload.error)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("HTTP {status}")
            } else {
                body.trim().to_string()
            }
        });

    BackendError::Api {
        status,
        code,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> HostedBackend {
        HostedBackend::new(
            Client::new(),
            Url::parse("https://project.example.co/").unwrap(),
            "anon-key".to_string(),
        )
    }

    #[test]
    fn test_parse_data_api_no_rows() {
        let body = r#"{"code":"PGRST116","details":"The result contains 0 rows","hint":null,"message":"JSON object requested, multiple (or no) rows returned"}"#;
        let err = parse_error_body(406, body);
        assert!(err.is_no_rows());
        assert_eq!(err.status(), Some(406));
    }

    #[test]
    fn test_parse_data_api_unique_violation() {
        let body = r#"{"code":"23505","details":"Key (user_id)=(u2) already exists.","hint":null,"message":"duplicate key value violates unique constraint \"profiles_user_id_key\""}"#;
        let err = parse_error_body(409, body);
        assert!(err.is_unique_violation());
        assert!(err.to_string().starts_with("duplicate key value"));
    }

    #[test]
    fn test_parse_auth_api_errors() {
        let body = r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#;
        let err = parse_error_body(400, body);
        assert_eq!(err.code(), Some("invalid_credentials"));
        assert_eq!(err.to_string(), "Invalid login credentials");

        let oauth_style = r#"{"error":"invalid_grant","error_description":"Refresh Token Not Found"}"#;
        let err = parse_error_body(400, oauth_style);
        assert_eq!(err.code(), Some("invalid_grant"));
        assert_eq!(err.to_string(), "Refresh Token Not Found");
    }

    #[test]
    fn test_parse_non_json_body() {
        let err = parse_error_body(502, "");
        assert_eq!(err.to_string(), "HTTP 502");
        let err = parse_error_body(500, "upstream exploded");
        assert_eq!(err.to_string(), "upstream exploded");
    }

    #[test]
    fn test_endpoint_joins_paths() {
        let backend = backend();
        assert_eq!(
            backend.table("profiles").unwrap().as_str(),
            "https://project.example.co/rest/v1/profiles"
        );
        assert_eq!(
            backend.endpoint("/auth/v1/logout").unwrap().as_str(),
            "https://project.example.co/auth/v1/logout"
        );
    }

    #[test]
    fn test_authorize_uses_anon_key_without_session() {
        let backend = backend();
        let request = backend
            .authorize(backend.client.get("https://project.example.co/rest/v1/profiles"))
            .build()
            .unwrap();
        assert_eq!(request.headers()["apikey"], "anon-key");
        assert_eq!(request.headers()[header::AUTHORIZATION], "Bearer anon-key");
    }
}
