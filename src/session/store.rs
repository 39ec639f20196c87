//! Session Store
//!
//! Projects the auth provider's event stream into one [`Session`] value that
//! the rest of the application reads through a `watch` channel.
//!
//! Every event bumps a generation counter. Profile bootstraps run as spawned
//! tasks and only write their result back while their generation is still the
//! current one, so a slow bootstrap for an older event can never overwrite the
//! state produced by a newer event.

use super::bootstrap::{BootstrapError, BootstrapOutcome, ProfileBootstrap};
use crate::backend::{AuthProvider, ProfileStore};
use crate::models::{
    AuthEvent, AuthStateChange, BackendError, Identity, Profile, ProfileUpdate, SignUpResult,
    UserMetadata,
};
use crate::notifications::{Notification, Notifier};
use crate::utils::logging::LoggingHelper;
use crate::validation::friendly_message;
use log::{debug, warn};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

// =============================================================================
// Types
// =============================================================================

/// Process-local projection of the authentication state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    #[serde(skip)]
    generation: u64,
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    pub loading: bool,
}

impl Default for Session {
    /// Nothing is known until the provider's initial session has been read
    fn default() -> Self {
        Self {
            generation: 0,
            identity: None,
            profile: None,
            loading: true,
        }
    }
}

impl Session {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.identity.is_some()
    }

    fn is_settled_for(&self, identity_id: &str) -> bool {
        !self.loading
            && self
                .identity
                .as_ref()
                .is_some_and(|identity| identity.id == identity_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionStoreError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    #[error("No user logged in")]
    NotSignedIn,
    #[error("session did not settle within {0:?}")]
    Timeout(Duration),
    #[error("session store has shut down")]
    Closed,
}

pub struct SessionStore {
    auth: Arc<dyn AuthProvider>,
    profiles: Arc<dyn ProfileStore>,
    notifier: Arc<Notifier>,
    state: watch::Sender<Session>,
    settle_timeout: Duration,
    listener: Mutex<Option<JoinHandle<()>>>,
}

// =============================================================================
// Lifecycle
// =============================================================================

impl SessionStore {
    /// Subscribe to the provider, project its current session and start
    /// listening for further events.
    ///
    /// The subscription is taken before the current session is read so no
    /// event published in between is lost.
    pub async fn start(
        auth: Arc<dyn AuthProvider>,
        profiles: Arc<dyn ProfileStore>,
        notifier: Arc<Notifier>,
        settle_timeout: Duration,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(Session::default());
        let store = Arc::new(Self {
            auth,
            profiles,
            notifier,
            state,
            settle_timeout,
            listener: Mutex::new(None),
        });

        let events = store.auth.subscribe();
        let initial = match store.auth.get_session().await {
            Ok(session) => AuthStateChange::new(AuthEvent::InitialSession, session),
            Err(err) => {
                warn!("Could not read the current session, starting signed out: {err}");
                store
                    .notifier
                    .push(Notification::error("Session Error", friendly_message(&err.to_string())));
                AuthStateChange::new(AuthEvent::InitialSession, None)
            }
        };
        store.dispatch(&initial);

        let handle = tokio::spawn(Self::listen(Arc::downgrade(&store), events));
        *store
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        store
    }

    /// Stop listening to the provider; the last projected state stays readable
    pub fn shutdown(&self) {
        if let Some(handle) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
            debug!("Session store listener stopped");
        }
    }

    async fn listen(store: Weak<Self>, mut events: broadcast::Receiver<AuthStateChange>) {
        loop {
            match events.recv().await {
                Ok(change) => {
                    let Some(store) = store.upgrade() else {
                        break;
                    };
                    store.dispatch(&change);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Session store lagged behind the auth provider, skipped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Auth event stream closed");
    }

    /// Apply one auth event. Runs synchronously in event order; only the
    /// profile bootstrap is deferred to a task.
    fn dispatch(self: &Arc<Self>, change: &AuthStateChange) {
        let identity = change.identity().cloned();
        LoggingHelper::log_auth_event(change.event, identity.as_ref().map(|i| i.id.as_str()));

        let mut generation = 0;
        self.state.send_modify(|session| {
            session.generation += 1;
            generation = session.generation;

            let same_identity = matches!(
                (&session.identity, &identity),
                (Some(current), Some(next)) if current.id == next.id
            );
            if !same_identity {
                session.profile = None;
            }
            session.loading = identity.is_some();
            session.identity.clone_from(&identity);
        });

        if let Some(identity) = identity {
            let store = Arc::clone(self);
            tokio::spawn(async move { store.resolve(generation, identity).await });
        }
    }

    async fn resolve(&self, generation: u64, identity: Identity) {
        let result = ProfileBootstrap::ensure(self.profiles.as_ref(), &identity).await;

        let applied = self.state.send_if_modified(|session| {
            if session.generation != generation {
                return false;
            }
            if let Ok(profile) = &result {
                session.profile = Some(profile.clone());
            }
            session.loading = false;
            true
        });

        if !applied {
            debug!(
                "Discarding stale bootstrap for {} (generation {generation})",
                identity.id
            );
            return;
        }
        if let Err(err) = result {
            warn!("Profile bootstrap failed for {}: {err}", identity.id);
            self.notifier.push(err.notification());
        }
    }
}

// =============================================================================
// Reading
// =============================================================================

impl SessionStore {
    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn settle_timeout(&self) -> Duration {
        self.settle_timeout
    }

    /// Wait until the projection has finished loading for `identity_id`
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::Timeout`] if the session is still loading,
    /// or belongs to someone else, when `timeout` elapses
    pub async fn settled_for(
        &self,
        identity_id: &str,
        timeout: Duration,
    ) -> Result<Session, SessionStoreError> {
        self.wait_until(timeout, |session| session.is_settled_for(identity_id))
            .await
    }

    /// Wait until the projection reflects a sign-out
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::Timeout`] if an identity is still present
    /// when `timeout` elapses
    pub async fn signed_out(&self, timeout: Duration) -> Result<Session, SessionStoreError> {
        self.wait_until(timeout, |session| {
            session.identity.is_none() && !session.loading
        })
        .await
    }

    /// Wait for the first load to finish, whatever its outcome
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::Timeout`] if still loading after `timeout`
    pub async fn settled(&self, timeout: Duration) -> Result<Session, SessionStoreError> {
        self.wait_until(timeout, |session| !session.loading).await
    }

    async fn wait_until(
        &self,
        timeout: Duration,
        condition: impl FnMut(&Session) -> bool,
    ) -> Result<Session, SessionStoreError> {
        let mut receiver = self.state.subscribe();
        let result = match tokio::time::timeout(timeout, receiver.wait_for(condition)).await {
            Ok(Ok(session)) => Ok(session.clone()),
            Ok(Err(_)) => Err(SessionStoreError::Closed),
            Err(_) => Err(SessionStoreError::Timeout(timeout)),
        };
        result
    }
}

// =============================================================================
// Auth operations
// =============================================================================

impl SessionStore {
    /// Register a new account.
    ///
    /// When the provider signs the new user in straight away this waits for
    /// the resulting profile bootstrap.
    ///
    /// # Errors
    ///
    /// Returns the provider's error if the registration is rejected
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> Result<SignUpResult, SessionStoreError> {
        let result = self.auth.sign_up(email, password, metadata).await?;
        if result.session.is_some() {
            if let Err(err) = self.settled_for(&result.user.id, self.settle_timeout).await {
                debug!("Session not settled after sign-up: {err}");
            }
        }
        Ok(result)
    }

    /// Sign in and wait for the session to settle for the new identity
    ///
    /// # Errors
    ///
    /// Returns the provider's error when the credentials are rejected (a
    /// "Login Failed" notification has been queued), or a timeout if the
    /// profile bootstrap is still running after the settle timeout
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, SessionStoreError> {
        match self.auth.sign_in(email, password).await {
            Ok(auth_session) => {
                self.settled_for(&auth_session.user.id, self.settle_timeout)
                    .await
            }
            Err(err) => {
                self.notifier.push(Notification::error(
                    "Login Failed",
                    friendly_message(&err.to_string()),
                ));
                Err(err.into())
            }
        }
    }

    /// Sign out and wait for the projection to clear
    ///
    /// # Errors
    ///
    /// Returns the provider's error if the session could not be revoked (a
    /// "Failed to sign out" notification has been queued)
    pub async fn sign_out(&self) -> Result<Session, SessionStoreError> {
        if let Err(err) = self.auth.sign_out().await {
            self.notifier
                .push(Notification::error("Error", "Failed to sign out"));
            return Err(err.into());
        }
        self.signed_out(self.settle_timeout).await
    }
}

// =============================================================================
// Profile operations
// =============================================================================

impl SessionStore {
    /// Update the signed-in user's profile and merge the stored row
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::NotSignedIn`] without an identity, or the
    /// store's error if the update is rejected
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile, SessionStoreError> {
        let Some(identity) = self.snapshot().identity else {
            return Err(SessionStoreError::NotSignedIn);
        };

        let stored = self.profiles.update_profile(&identity.id, update).await?;

        self.state.send_if_modified(|session| {
            let same_identity = session
                .identity
                .as_ref()
                .is_some_and(|current| current.id == identity.id);
            if !same_identity {
                return false;
            }
            session.profile = Some(stored.clone());
            true
        });
        Ok(stored)
    }

    /// Re-run the profile bootstrap for the current identity and publish the
    /// result if no newer event arrived meanwhile
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::NotSignedIn`] without an identity, or the
    /// bootstrap failure
    pub async fn refresh_profile(&self) -> Result<(Profile, BootstrapOutcome), SessionStoreError> {
        let current = self.snapshot();
        let Some(identity) = current.identity else {
            return Err(SessionStoreError::NotSignedIn);
        };

        let (profile, outcome) =
            ProfileBootstrap::ensure_with_outcome(self.profiles.as_ref(), &identity).await?;
        self.state.send_if_modified(|session| {
            if session.generation != current.generation {
                return false;
            }
            session.profile = Some(profile.clone());
            session.loading = false;
            true
        });
        Ok((profile, outcome))
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}
