//! Profile bootstrap: fetch-or-create the profile of a freshly established
//! identity.
//!
//! The profile store enforces one row per identity. Two bootstraps racing for
//! the same identity therefore end with one successful insert and one
//! uniqueness violation; the losing side re-reads the winner's row.

use crate::backend::ProfileStore;
use crate::models::{BackendError, Identity, NewProfile, Profile};
use crate::notifications::Notification;
use crate::utils::logging::LoggingHelper;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BootstrapError {
    #[error("failed to fetch profile: {0}")]
    Fetch(BackendError),
    #[error("failed to create profile: {0}")]
    Create(BackendError),
    /// The uniqueness violation said a row exists but it could not be read back
    #[error("profile exists but could not be loaded: {0}")]
    Reconcile(String),
}

impl BootstrapError {
    /// Notification shown to the user when a bootstrap fails
    #[must_use]
    pub fn notification(&self) -> Notification {
        match self {
            BootstrapError::Fetch(err) => Notification::error(
                "Profile Error",
                format!("Failed to fetch user profile: {err}"),
            ),
            BootstrapError::Create(err) => Notification::error(
                "Profile Creation Failed",
                format!("Could not create profile: {err}"),
            ),
            BootstrapError::Reconcile(_) => Notification::error(
                "Profile Error",
                "Could not load your profile. Please contact support.",
            ),
        }
    }
}

/// How the profile came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Existing,
    Created,
    /// Lost the creation race and adopted the concurrent insert
    Reconciled,
}

pub struct ProfileBootstrap;

impl ProfileBootstrap {
    /// Ensure a profile exists for `identity`, returning it
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError`] when the fetch or the insert fails for any
    /// reason other than "no rows" and "uniqueness violation", or when the
    /// reconciling re-fetch does not produce the row
    pub async fn ensure(
        profiles: &dyn ProfileStore,
        identity: &Identity,
    ) -> Result<Profile, BootstrapError> {
        Self::ensure_with_outcome(profiles, identity)
            .await
            .map(|(profile, _)| profile)
    }

    /// Like [`Self::ensure`], also reporting which path produced the profile
    ///
    /// # Errors
    ///
    /// See [`Self::ensure`]
    pub async fn ensure_with_outcome(
        profiles: &dyn ProfileStore,
        identity: &Identity,
    ) -> Result<(Profile, BootstrapOutcome), BootstrapError> {
        if let Some(profile) = profiles
            .fetch_profile(&identity.id)
            .await
            .map_err(BootstrapError::Fetch)?
        {
            LoggingHelper::log_bootstrap_step(&identity.id, "existing profile found");
            return Ok((profile, BootstrapOutcome::Existing));
        }

        LoggingHelper::log_bootstrap_step(&identity.id, "no profile, creating");
        let new_profile = NewProfile::from_identity(identity);
        match profiles.insert_profile(&new_profile).await {
            Ok(profile) => {
                LoggingHelper::log_bootstrap_step(&identity.id, "profile created");
                Ok((profile, BootstrapOutcome::Created))
            }
            Err(err) if err.is_unique_violation() => {
                LoggingHelper::log_bootstrap_step(
                    &identity.id,
                    "profile created concurrently, re-fetching",
                );
                match profiles.fetch_profile(&identity.id).await {
                    Ok(Some(profile)) => Ok((profile, BootstrapOutcome::Reconciled)),
                    Ok(None) => Err(BootstrapError::Reconcile(
                        "row reported as duplicate is not readable".to_string(),
                    )),
                    Err(err) => Err(BootstrapError::Reconcile(err.to_string())),
                }
            }
            Err(err) => Err(BootstrapError::Create(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProfileUpdate, Role, UserMetadata};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted profile store: each call pops the next canned answer
    #[derive(Default)]
    struct ScriptedStore {
        fetches: Mutex<Vec<Result<Option<Profile>, BackendError>>>,
        inserts: Mutex<Vec<Result<Profile, BackendError>>>,
        insert_calls: Mutex<usize>,
    }

    impl ScriptedStore {
        fn new(
            fetches: Vec<Result<Option<Profile>, BackendError>>,
            inserts: Vec<Result<Profile, BackendError>>,
        ) -> Self {
            Self {
                fetches: Mutex::new(fetches.into_iter().rev().collect()),
                inserts: Mutex::new(inserts.into_iter().rev().collect()),
                insert_calls: Mutex::new(0),
            }
        }

        fn insert_calls(&self) -> usize {
            *self.insert_calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ProfileStore for ScriptedStore {
        async fn fetch_profile(&self, _user_id: &str) -> Result<Option<Profile>, BackendError> {
            self.fetches.lock().unwrap().pop().expect("unexpected fetch")
        }

        async fn insert_profile(&self, _profile: &NewProfile) -> Result<Profile, BackendError> {
            *self.insert_calls.lock().unwrap() += 1;
            self.inserts.lock().unwrap().pop().expect("unexpected insert")
        }

        async fn update_profile(
            &self,
            _user_id: &str,
            _update: &ProfileUpdate,
        ) -> Result<Profile, BackendError> {
            unreachable!("bootstrap never updates")
        }

        async fn check_connection(&self) -> Result<(), BackendError> {
            Ok(())
        }
    }

    fn identity() -> Identity {
        Identity {
            id: "u2".to_string(),
            email: "jane@example.com".to_string(),
            metadata: UserMetadata {
                full_name: Some("Jane Smith".to_string()),
                role: Some("admin".to_string()),
                ..UserMetadata::default()
            },
        }
    }

    fn profile() -> Profile {
        Profile {
            id: "p1".to_string(),
            user_id: "u2".to_string(),
            full_name: "Jane Smith".to_string(),
            email: "jane@example.com".to_string(),
            enrollment_no: None,
            semester: None,
            branch: None,
            course: None,
            role: Role::Admin,
        }
    }

    fn duplicate() -> BackendError {
        BackendError::api(409, Some("23505"), "duplicate key value")
    }

    #[tokio::test]
    async fn test_existing_profile_is_returned_without_write() {
        let store = ScriptedStore::new(vec![Ok(Some(profile()))], vec![]);
        let (found, outcome) = ProfileBootstrap::ensure_with_outcome(&store, &identity())
            .await
            .unwrap();
        assert_eq!(found, profile());
        assert_eq!(outcome, BootstrapOutcome::Existing);
        assert_eq!(store.insert_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_profile_is_created() {
        let store = ScriptedStore::new(vec![Ok(None)], vec![Ok(profile())]);
        let (_, outcome) = ProfileBootstrap::ensure_with_outcome(&store, &identity())
            .await
            .unwrap();
        assert_eq!(outcome, BootstrapOutcome::Created);
        assert_eq!(store.insert_calls(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_insert_reconciles_with_refetch() {
        let store = ScriptedStore::new(vec![Ok(None), Ok(Some(profile()))], vec![Err(duplicate())]);
        let (found, outcome) = ProfileBootstrap::ensure_with_outcome(&store, &identity())
            .await
            .unwrap();
        assert_eq!(found, profile());
        assert_eq!(outcome, BootstrapOutcome::Reconciled);
    }

    #[tokio::test]
    async fn test_failed_reconcile_reports_support_message() {
        let store = ScriptedStore::new(vec![Ok(None), Ok(None)], vec![Err(duplicate())]);
        let err = ProfileBootstrap::ensure(&store, &identity()).await.unwrap_err();
        assert!(matches!(err, BootstrapError::Reconcile(_)));
        assert_eq!(
            err.notification().description,
            "Could not load your profile. Please contact support."
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_is_not_treated_as_missing() {
        let store = ScriptedStore::new(
            vec![Err(BackendError::api(401, Some("PGRST301"), "JWT expired"))],
            vec![],
        );
        let err = ProfileBootstrap::ensure(&store, &identity()).await.unwrap_err();
        assert_eq!(store.insert_calls(), 0);
        let notification = err.notification();
        assert_eq!(notification.title, "Profile Error");
        assert_eq!(
            notification.description,
            "Failed to fetch user profile: JWT expired"
        );
    }

    #[tokio::test]
    async fn test_create_failure_notification() {
        let store = ScriptedStore::new(
            vec![Ok(None)],
            vec![Err(BackendError::api(403, Some("42501"), "permission denied"))],
        );
        let err = ProfileBootstrap::ensure(&store, &identity()).await.unwrap_err();
        let notification = err.notification();
        assert_eq!(notification.title, "Profile Creation Failed");
        assert_eq!(
            notification.description,
            "Could not create profile: permission denied"
        );
    }
}
