// Auth API (`/auth/v1`) half of the hosted backend
use super::rest::HostedBackend;
use super::AuthProvider;
use crate::models::{
    AuthEvent, AuthSession, AuthStateChange, BackendError, Identity, SignUpResult, UserMetadata,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;

/// Refresh this long before the provider-reported expiry
const EXPIRY_MARGIN_SECS: i64 = 30;

#[derive(Debug, Deserialize)]
struct UserRecord {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

impl From<UserRecord> for Identity {
    fn from(user: UserRecord) -> Self {
        Identity {
            id: user.id,
            email: user.email.unwrap_or_default(),
            metadata: user.user_metadata,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserRecord,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> AuthSession {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .or_else(|| {
                self.expires_in
                    .and_then(Duration::try_seconds)
                    .and_then(|ttl| now.checked_add_signed(ttl))
            });
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user.into(),
        }
    }
}

/// Sign-up answers with a full session when the provider auto-confirms
/// accounts, otherwise with the bare user
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(UserRecord),
}

fn is_expired(session: &AuthSession, now: DateTime<Utc>) -> bool {
    session
        .expires_at
        .is_some_and(|expires_at| expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) <= now)
}

impl HostedBackend {
    async fn exchange_token(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<AuthSession, BackendError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);
        let response: TokenResponse = self
            .send_json_anonymous(self.client.post(url).json(&body))
            .await?;
        Ok(response.into_session(Utc::now()))
    }

    fn establish(&self, event: AuthEvent, session: AuthSession) -> AuthSession {
        self.store_session(Some(session.clone()));
        self.publish(AuthStateChange::new(event, Some(session.clone())));
        session
    }

    /// Refresh the stored session once its access token has expired
    pub(super) async fn refresh_if_expired(&self) -> Result<(), BackendError> {
        let _refreshing = self.refresh_lock.lock().await;
        match self.current_session() {
            Some(session) if is_expired(&session, Utc::now()) && session.refresh_token.is_some() => {
                debug!("Access token expired, refreshing");
                self.refresh_locked().await.map(|_| ())
            }
            _ => Ok(()),
        }
    }

    /// Refresh after the data API rejected `rejected_token` as expired.
    ///
    /// Returns whether a newer credential is stored afterwards. A concurrent
    /// request may already have refreshed it, in which case nothing is sent.
    pub(super) async fn refresh_rejected(
        &self,
        rejected_token: Option<&str>,
    ) -> Result<bool, BackendError> {
        let _refreshing = self.refresh_lock.lock().await;
        match self.current_session() {
            Some(session) if Some(session.access_token.as_str()) != rejected_token => Ok(true),
            Some(session) if session.refresh_token.is_some() => {
                self.refresh_locked().await.map(|_| true)
            }
            _ => Ok(false),
        }
    }

    /// Exchange the refresh token; callers hold `refresh_lock`
    async fn refresh_locked(&self) -> Result<AuthSession, BackendError> {
        let refresh_token = self
            .current_session()
            .and_then(|session| session.refresh_token)
            .ok_or(BackendError::NotSignedIn)?;

        match self
            .exchange_token("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
        {
            Ok(session) => Ok(self.establish(AuthEvent::TokenRefreshed, session)),
            Err(err) => {
                warn!("Token refresh failed, clearing session: {err}");
                self.store_session(None);
                self.publish(AuthStateChange::signed_out());
                Err(err)
            }
        }
    }
}

#[async_trait]
impl AuthProvider for HostedBackend {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> Result<SignUpResult, BackendError> {
        let url = self.endpoint("auth/v1/signup")?;
        let body = json!({
            "email": email,
            "password": password,
            "data": metadata,
        });
        let response: SignUpResponse = self
            .send_json_anonymous(self.client.post(url).json(&body))
            .await?;

        match response {
            SignUpResponse::Session(tokens) => {
                let session = self.establish(AuthEvent::SignedIn, tokens.into_session(Utc::now()));
                info!("Registered and signed in user {}", session.user.id);
                Ok(SignUpResult {
                    user: session.user.clone(),
                    session: Some(session),
                })
            }
            SignUpResponse::User(user) => {
                let user = Identity::from(user);
                info!("Registered user {} (confirmation pending)", user.id);
                Ok(SignUpResult {
                    user,
                    session: None,
                })
            }
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        let session = self
            .exchange_token("password", json!({ "email": email, "password": password }))
            .await?;
        Ok(self.establish(AuthEvent::SignedIn, session))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if self.current_session().is_some() {
            let url = self.endpoint("auth/v1/logout")?;
            // Sent as is: an expired token is as good as revoked
            let response = self.authorize(self.client.post(url)).send().await?;
            match Self::check_status(response).await {
                Ok(_) => {}
                // The token is already unusable server-side; finish locally.
                Err(err) if matches!(err.status(), Some(401 | 403 | 404)) => {
                    debug!("Session already revoked by provider: {err}");
                }
                Err(err) => return Err(err),
            }
        }
        self.store_session(None);
        self.publish(AuthStateChange::signed_out());
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<AuthSession>, BackendError> {
        self.refresh_if_expired().await?;
        Ok(self.current_session())
    }

    async fn refresh_session(&self) -> Result<AuthSession, BackendError> {
        let _refreshing = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange> {
        self.subscribe_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_up_response_with_session() {
        let body = json!({
            "access_token": "access",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "refresh",
            "user": {
                "id": "u1",
                "email": "jane@example.com",
                "user_metadata": { "full_name": "Jane Smith", "role": "admin" }
            }
        });
        let response: SignUpResponse = serde_json::from_value(body).unwrap();
        let SignUpResponse::Session(tokens) = response else {
            panic!("expected a session response");
        };
        let now = Utc::now();
        let session = tokens.into_session(now);
        assert_eq!(session.user.metadata.role.as_deref(), Some("admin"));
        assert_eq!(session.expires_at, Some(now + Duration::seconds(3600)));
    }

    #[test]
    fn test_sign_up_response_without_session() {
        let body = json!({
            "id": "u1",
            "email": "jane@example.com",
            "user_metadata": { "full_name": "Jane Smith" },
            "confirmation_sent_at": "2024-01-15T09:30:00Z"
        });
        let response: SignUpResponse = serde_json::from_value(body).unwrap();
        let SignUpResponse::User(user) = response else {
            panic!("expected a user response");
        };
        let identity = Identity::from(user);
        assert_eq!(identity.email, "jane@example.com");
        assert_eq!(identity.metadata.full_name.as_deref(), Some("Jane Smith"));
    }

    #[test]
    fn test_expiry_prefers_absolute_timestamp() {
        let body = json!({
            "access_token": "access",
            "expires_in": 3600,
            "expires_at": 1_700_000_000,
            "user": { "id": "u1", "email": "a@b.c" }
        });
        let tokens: TokenResponse = serde_json::from_value(body).unwrap();
        let session = tokens.into_session(Utc::now());
        assert_eq!(session.expires_at.map(|t| t.timestamp()), Some(1_700_000_000));
        assert!(is_expired(&session, Utc::now()));
    }

    // -------------------------------------------------------------------------
    // Flows against a local backend
    // -------------------------------------------------------------------------

    use crate::backend::ProfileStore;
    use actix_web::http::StatusCode;
    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer, Route};
    use reqwest::Client;
    use std::sync::{Arc, Mutex};
    use url::Url;

    const FRESH_TOKEN: &str = "fresh-token";

    /// Requests seen by the local backend as `METHOD uri | bearer`
    #[derive(Clone, Default)]
    struct RequestLog(Arc<Mutex<Vec<String>>>);

    impl RequestLog {
        fn record(&self, req: &HttpRequest) -> String {
            let bearer = req
                .headers()
                .get("authorization")
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .trim_start_matches("Bearer ")
                .to_string();
            self.0
                .lock()
                .unwrap()
                .push(format!("{} {} | {bearer}", req.method(), req.uri()));
            bearer
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    /// Serve `routes` on an ephemeral local port and point a backend at it
    fn serve<F>(routes: F) -> (HostedBackend, RequestLog)
    where
        F: Fn(&mut web::ServiceConfig) + Clone + Send + 'static,
    {
        let log = RequestLog::default();
        let data = web::Data::new(log.clone());
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .configure(routes.clone())
        })
        .workers(1)
        .disable_signals()
        .listen(listener)
        .unwrap()
        .run();
        actix_web::rt::spawn(server);

        let backend = HostedBackend::new(
            Client::new(),
            Url::parse(&format!("http://{address}/")).unwrap(),
            "anon-key".to_string(),
        );
        (backend, log)
    }

    fn canned(status: u16, body: serde_json::Value) -> Route {
        web::route().to(move |req: HttpRequest, log: web::Data<RequestLog>| {
            let body = body.clone();
            async move {
                log.record(&req);
                HttpResponse::build(StatusCode::from_u16(status).unwrap()).json(body)
            }
        })
    }

    /// Profile row for `fresh-token`, "JWT expired" for any other credential
    async fn profiles(req: HttpRequest, log: web::Data<RequestLog>) -> HttpResponse {
        if log.record(&req) == FRESH_TOKEN {
            HttpResponse::Ok().json(json!({
                "id": "p1",
                "user_id": "u1",
                "full_name": "Jane Smith",
                "email": "jane@example.com",
                "role": "student"
            }))
        } else {
            HttpResponse::Unauthorized().json(json!({
                "code": "PGRST301",
                "details": null,
                "hint": null,
                "message": "JWT expired"
            }))
        }
    }

    fn token_body(access_token: &str) -> serde_json::Value {
        json!({
            "access_token": access_token,
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "rotated-refresh",
            "user": { "id": "u1", "email": "jane@example.com" }
        })
    }

    fn stored_session(access_token: &str, expires_in: Duration) -> AuthSession {
        AuthSession {
            access_token: access_token.to_string(),
            refresh_token: Some("refresh-1".to_string()),
            expires_at: Some(Utc::now() + expires_in),
            user: Identity {
                id: "u1".to_string(),
                email: "jane@example.com".to_string(),
                metadata: UserMetadata::default(),
            },
        }
    }

    #[actix_web::test]
    async fn test_expired_token_is_refreshed_before_data_request() {
        let (backend, log) = serve(|cfg: &mut web::ServiceConfig| {
            cfg.route("/auth/v1/token", canned(200, token_body(FRESH_TOKEN)))
                .route("/rest/v1/profiles", web::get().to(profiles));
        });
        backend.store_session(Some(stored_session("stale-token", Duration::hours(-2))));
        let mut events = backend.subscribe();

        let profile = backend.fetch_profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.user_id, "u1");

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0],
            "POST /auth/v1/token?grant_type=refresh_token | anon-key"
        );
        assert!(entries[1].starts_with("GET /rest/v1/profiles?"));
        assert!(entries[1].ends_with(&format!("| {FRESH_TOKEN}")));

        let change = events.try_recv().unwrap();
        assert_eq!(change.event, AuthEvent::TokenRefreshed);
        assert_eq!(
            backend.current_session().unwrap().refresh_token.as_deref(),
            Some("rotated-refresh")
        );
    }

    #[actix_web::test]
    async fn test_rejected_token_is_refreshed_and_retried_once() {
        let (backend, log) = serve(|cfg: &mut web::ServiceConfig| {
            cfg.route("/auth/v1/token", canned(200, token_body(FRESH_TOKEN)))
                .route("/rest/v1/profiles", web::get().to(profiles));
        });
        // Not yet expired locally, but the data API disagrees
        backend.store_session(Some(stored_session("revoked-token", Duration::hours(1))));

        let profile = backend.fetch_profile("u1").await.unwrap();
        assert!(profile.is_some());

        let entries = log.entries();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].ends_with("| revoked-token"));
        assert!(entries[1].starts_with("POST /auth/v1/token?grant_type=refresh_token"));
        assert!(entries[2].ends_with(&format!("| {FRESH_TOKEN}")));
    }

    #[actix_web::test]
    async fn test_failed_refresh_clears_session() {
        let (backend, _log) = serve(|cfg: &mut web::ServiceConfig| {
            cfg.route(
                "/auth/v1/token",
                canned(
                    400,
                    json!({ "error": "invalid_grant", "error_description": "Refresh Token Not Found" }),
                ),
            );
        });
        backend.store_session(Some(stored_session("stale-token", Duration::hours(-2))));
        let mut events = backend.subscribe();

        let err = backend.get_session().await.unwrap_err();
        assert_eq!(err.code(), Some("invalid_grant"));
        assert!(backend.current_session().is_none());
        assert_eq!(events.try_recv().unwrap().event, AuthEvent::SignedOut);
    }

    #[actix_web::test]
    async fn test_sign_out_treats_revoked_session_as_signed_out() {
        for status in [401, 403, 404] {
            let (backend, log) = serve(move |cfg: &mut web::ServiceConfig| {
                cfg.route(
                    "/auth/v1/logout",
                    canned(status, json!({ "code": status, "msg": "session not found" })),
                );
            });
            // Logout goes out with the stored token, even an expired one
            backend.store_session(Some(stored_session("stale-token", Duration::hours(-2))));
            let mut events = backend.subscribe();

            backend.sign_out().await.unwrap();

            assert_eq!(log.entries(), vec!["POST /auth/v1/logout | stale-token"]);
            assert!(backend.current_session().is_none());
            assert_eq!(events.try_recv().unwrap().event, AuthEvent::SignedOut);
        }
    }

    #[actix_web::test]
    async fn test_sign_out_failure_keeps_session() {
        let (backend, _log) = serve(|cfg: &mut web::ServiceConfig| {
            cfg.route(
                "/auth/v1/logout",
                canned(500, json!({ "code": 500, "msg": "Internal Server Error" })),
            );
        });
        backend.store_session(Some(stored_session("access", Duration::hours(1))));

        let err = backend.sign_out().await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert!(backend.current_session().is_some());
    }

    #[actix_web::test]
    async fn test_sign_in_exchanges_password_for_session() {
        let (backend, log) = serve(|cfg: &mut web::ServiceConfig| {
            cfg.route("/auth/v1/token", canned(200, token_body("access-1")));
        });
        let mut events = backend.subscribe();

        let session = backend.sign_in("jane@example.com", "password123").await.unwrap();

        assert_eq!(session.access_token, "access-1");
        assert_eq!(session.user.id, "u1");
        assert_eq!(backend.current_session(), Some(session));
        assert_eq!(
            log.entries(),
            vec!["POST /auth/v1/token?grant_type=password | anon-key"]
        );
        assert_eq!(events.try_recv().unwrap().event, AuthEvent::SignedIn);
    }
}
