//! In-memory backend for tests
//!
//! [`InMemoryBackend`] implements every backend seam against process-local
//! tables. It enforces the same constraints as the hosted data store (one
//! profile per identity, one attendance record per session and student) and
//! reports violations with the same codes, so the code under test takes the
//! same branches it would in production.
//!
//! Hooks let a test shape the timing of profile reads: a one-shot rendezvous
//! holds concurrent reads until all of them have seen the table, and per-user
//! delays stretch a single bootstrap past later events.

use crate::backend::{AttendanceStore, AuthProvider, ProfileStore};
use crate::models::errors::{NO_ROWS_CODE, UNIQUE_VIOLATION_CODE};
use crate::models::{
    AttendanceRecord, AuthEvent, AuthSession, AuthStateChange, BackendError, Identity,
    NewAttendance, NewProfile, NewQrSession, Profile, ProfileUpdate, QrSession, SignUpResult,
    UserMetadata,
};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, Barrier};

const EVENT_CAPACITY: usize = 16;

/// Backend call a failure can be injected into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SignUp,
    SignIn,
    SignOut,
    GetSession,
    FetchProfile,
    InsertProfile,
    UpdateProfile,
    CheckConnection,
    InsertQrSession,
    FindQrSession,
    InsertAttendance,
}

struct RegisteredUser {
    identity: Identity,
    password: String,
}

#[derive(Default)]
struct Tables {
    next_id: u64,
    users: HashMap<String, RegisteredUser>,
    current: Option<AuthSession>,
    profiles: Vec<Profile>,
    qr_sessions: Vec<QrSession>,
    attendance: Vec<AttendanceRecord>,
}

impl Tables {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

/// Concurrent profile reads held until `remaining` of them arrived
struct Rendezvous {
    barrier: Arc<Barrier>,
    remaining: usize,
}

pub struct InMemoryBackend {
    tables: Mutex<Tables>,
    events: broadcast::Sender<AuthStateChange>,
    failures: Mutex<HashMap<Operation, BackendError>>,
    rendezvous: Mutex<Option<Rendezvous>>,
    fetch_delays: Mutex<HashMap<String, Duration>>,
    confirm_sign_ups: bool,
    profile_inserts: AtomicUsize,
    profile_writes: AtomicUsize,
    attendance_inserts: AtomicUsize,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unique_violation(constraint: &str) -> BackendError {
    BackendError::api(
        409,
        Some(UNIQUE_VIOLATION_CODE),
        format!("duplicate key value violates unique constraint \"{constraint}\""),
    )
}

fn no_rows() -> BackendError {
    BackendError::api(
        406,
        Some(NO_ROWS_CODE),
        "JSON object requested, multiple (or no) rows returned",
    )
}

// =============================================================================
// Setup and inspection
// =============================================================================

impl InMemoryBackend {
    /// Backend whose sign-ups sign the new user in straight away
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            tables: Mutex::new(Tables::default()),
            events,
            failures: Mutex::new(HashMap::new()),
            rendezvous: Mutex::new(None),
            fetch_delays: Mutex::new(HashMap::new()),
            confirm_sign_ups: true,
            profile_inserts: AtomicUsize::new(0),
            profile_writes: AtomicUsize::new(0),
            attendance_inserts: AtomicUsize::new(0),
        }
    }

    /// Backend whose sign-ups wait for email confirmation (no session issued)
    #[must_use]
    pub fn requiring_confirmation() -> Self {
        Self {
            confirm_sign_ups: false,
            ..Self::new()
        }
    }

    /// Register an account without signing it in
    pub fn register_user(&self, email: &str, password: &str, metadata: UserMetadata) -> Identity {
        let mut tables = lock(&self.tables);
        let identity = Identity {
            id: tables.next_id("user"),
            email: email.to_string(),
            metadata,
        };
        tables.users.insert(
            email.to_string(),
            RegisteredUser {
                identity: identity.clone(),
                password: password.to_string(),
            },
        );
        identity
    }

    /// Seed a profile row directly
    pub fn seed_profile(&self, new_profile: &NewProfile) -> Profile {
        let mut tables = lock(&self.tables);
        let profile = Self::profile_row(&mut tables, new_profile);
        tables.profiles.push(profile.clone());
        profile
    }

    /// Seed a QR session row directly, bypassing any validation
    pub fn seed_qr_session(&self, new_session: &NewQrSession) -> QrSession {
        let mut tables = lock(&self.tables);
        let session = Self::qr_row(&mut tables, new_session);
        tables.qr_sessions.push(session.clone());
        session
    }

    /// Make `identity` the current session and publish `event`
    pub fn emit(&self, event: AuthEvent, identity: Option<&Identity>) {
        let session = identity.map(Self::session_for);
        lock(&self.tables).current.clone_from(&session);
        // No receivers is fine; the store may not have subscribed yet
        let _ = self.events.send(AuthStateChange::new(event, session));
    }

    /// Fail the next call of `operation` with `error`
    pub fn fail_next(&self, operation: Operation, error: BackendError) {
        lock(&self.failures).insert(operation, error);
    }

    /// Hold the next `participants` profile reads until all of them have read
    pub fn rendezvous_profile_fetches(&self, participants: usize) {
        *lock(&self.rendezvous) = Some(Rendezvous {
            barrier: Arc::new(Barrier::new(participants)),
            remaining: participants,
        });
    }

    /// Delay every profile read for `user_id`
    pub fn delay_profile_fetch(&self, user_id: &str, delay: Duration) {
        lock(&self.fetch_delays).insert(user_id.to_string(), delay);
    }

    #[must_use]
    pub fn profiles(&self) -> Vec<Profile> {
        lock(&self.tables).profiles.clone()
    }

    #[must_use]
    pub fn profiles_for(&self, user_id: &str) -> Vec<Profile> {
        lock(&self.tables)
            .profiles
            .iter()
            .filter(|profile| profile.user_id == user_id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn attendance(&self) -> Vec<AttendanceRecord> {
        lock(&self.tables).attendance.clone()
    }

    #[must_use]
    pub fn qr_sessions(&self) -> Vec<QrSession> {
        lock(&self.tables).qr_sessions.clone()
    }

    /// Profile inserts attempted, including rejected ones
    #[must_use]
    pub fn profile_insert_attempts(&self) -> usize {
        self.profile_inserts.load(Ordering::SeqCst)
    }

    /// Inserts and updates that changed the `profiles` table
    #[must_use]
    pub fn profile_writes(&self) -> usize {
        self.profile_writes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn attendance_insert_attempts(&self) -> usize {
        self.attendance_inserts.load(Ordering::SeqCst)
    }

    fn session_for(identity: &Identity) -> AuthSession {
        AuthSession {
            access_token: format!("access-{}", identity.id),
            refresh_token: Some(format!("refresh-{}", identity.id)),
            expires_at: Some(Utc::now() + ChronoDuration::hours(1)),
            user: identity.clone(),
        }
    }

    fn injected(&self, operation: Operation) -> Result<(), BackendError> {
        lock(&self.failures).remove(&operation).map_or(Ok(()), Err)
    }

    fn profile_row(tables: &mut Tables, new_profile: &NewProfile) -> Profile {
        Profile {
            id: tables.next_id("profile"),
            user_id: new_profile.user_id.clone(),
            full_name: new_profile.full_name.clone(),
            email: new_profile.email.clone(),
            enrollment_no: new_profile.enrollment_no.clone(),
            semester: new_profile.semester.clone(),
            branch: new_profile.branch.clone(),
            course: new_profile.course.clone(),
            role: new_profile.role,
        }
    }

    fn qr_row(tables: &mut Tables, new_session: &NewQrSession) -> QrSession {
        QrSession {
            id: tables.next_id("qr"),
            admin_id: new_session.admin_id.clone(),
            session_name: new_session.session_name.clone(),
            qr_data: new_session.qr_data.clone(),
            is_active: new_session.is_active,
            expires_at: Some(new_session.expires_at),
            created_at: Some(Utc::now()),
        }
    }

    async fn hold_profile_fetch(&self, user_id: &str) {
        let delay = lock(&self.fetch_delays).get(user_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let barrier = {
            let mut rendezvous = lock(&self.rendezvous);
            let barrier = rendezvous.as_mut().map(|gate| {
                gate.remaining -= 1;
                Arc::clone(&gate.barrier)
            });
            if rendezvous.as_ref().is_some_and(|gate| gate.remaining == 0) {
                *rendezvous = None;
            }
            barrier
        };
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
    }
}

// =============================================================================
// Auth provider
// =============================================================================

#[async_trait]
impl AuthProvider for InMemoryBackend {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> Result<SignUpResult, BackendError> {
        self.injected(Operation::SignUp)?;
        if lock(&self.tables).users.contains_key(email) {
            return Err(BackendError::api(
                422,
                Some("user_already_exists"),
                "User already registered",
            ));
        }

        let identity = self.register_user(email, password, metadata.clone());
        let session = self.confirm_sign_ups.then(|| Self::session_for(&identity));
        if session.is_some() {
            self.emit(AuthEvent::SignedIn, Some(&identity));
        }
        Ok(SignUpResult {
            user: identity,
            session,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        self.injected(Operation::SignIn)?;
        let identity = lock(&self.tables)
            .users
            .get(email)
            .filter(|user| user.password == password)
            .map(|user| user.identity.clone())
            .ok_or_else(|| {
                BackendError::api(400, Some("invalid_credentials"), "Invalid login credentials")
            })?;

        self.emit(AuthEvent::SignedIn, Some(&identity));
        Ok(Self::session_for(&identity))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.injected(Operation::SignOut)?;
        self.emit(AuthEvent::SignedOut, None);
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<AuthSession>, BackendError> {
        self.injected(Operation::GetSession)?;
        Ok(lock(&self.tables).current.clone())
    }

    async fn refresh_session(&self) -> Result<AuthSession, BackendError> {
        let identity = lock(&self.tables)
            .current
            .as_ref()
            .map(|session| session.user.clone())
            .ok_or(BackendError::NotSignedIn)?;
        self.emit(AuthEvent::TokenRefreshed, Some(&identity));
        Ok(Self::session_for(&identity))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange> {
        self.events.subscribe()
    }
}

// =============================================================================
// Profiles
// =============================================================================

#[async_trait]
impl ProfileStore for InMemoryBackend {
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>, BackendError> {
        self.injected(Operation::FetchProfile)?;
        let found = lock(&self.tables)
            .profiles
            .iter()
            .find(|profile| profile.user_id == user_id)
            .cloned();
        self.hold_profile_fetch(user_id).await;
        Ok(found)
    }

    async fn insert_profile(&self, new_profile: &NewProfile) -> Result<Profile, BackendError> {
        self.profile_inserts.fetch_add(1, Ordering::SeqCst);
        self.injected(Operation::InsertProfile)?;

        let mut tables = lock(&self.tables);
        if tables
            .profiles
            .iter()
            .any(|profile| profile.user_id == new_profile.user_id)
        {
            return Err(unique_violation("profiles_user_id_key"));
        }
        let profile = Self::profile_row(&mut tables, new_profile);
        tables.profiles.push(profile.clone());
        self.profile_writes.fetch_add(1, Ordering::SeqCst);
        Ok(profile)
    }

    async fn update_profile(
        &self,
        user_id: &str,
        update: &ProfileUpdate,
    ) -> Result<Profile, BackendError> {
        self.injected(Operation::UpdateProfile)?;
        let mut tables = lock(&self.tables);
        let profile = tables
            .profiles
            .iter_mut()
            .find(|profile| profile.user_id == user_id)
            .ok_or_else(no_rows)?;
        profile.apply(update);
        self.profile_writes.fetch_add(1, Ordering::SeqCst);
        Ok(profile.clone())
    }

    async fn check_connection(&self) -> Result<(), BackendError> {
        self.injected(Operation::CheckConnection)
    }
}

// =============================================================================
// QR sessions and attendance
// =============================================================================

#[async_trait]
impl AttendanceStore for InMemoryBackend {
    async fn insert_qr_session(&self, new_session: &NewQrSession) -> Result<QrSession, BackendError> {
        self.injected(Operation::InsertQrSession)?;
        let mut tables = lock(&self.tables);
        let session = Self::qr_row(&mut tables, new_session);
        tables.qr_sessions.push(session.clone());
        Ok(session)
    }

    async fn find_active_qr_session(
        &self,
        token: &str,
    ) -> Result<Option<QrSession>, BackendError> {
        self.injected(Operation::FindQrSession)?;
        Ok(lock(&self.tables)
            .qr_sessions
            .iter()
            .find(|session| session.qr_data == token && session.is_active)
            .cloned())
    }

    async fn list_qr_sessions(&self, admin_id: &str) -> Result<Vec<QrSession>, BackendError> {
        Ok(lock(&self.tables)
            .qr_sessions
            .iter()
            .rev()
            .filter(|session| session.admin_id == admin_id)
            .cloned()
            .collect())
    }

    async fn find_attendance(
        &self,
        qr_code_id: &str,
        student_id: &str,
    ) -> Result<Option<AttendanceRecord>, BackendError> {
        Ok(lock(&self.tables)
            .attendance
            .iter()
            .find(|record| record.qr_code_id == qr_code_id && record.student_id == student_id)
            .cloned())
    }

    async fn insert_attendance(
        &self,
        new_record: &NewAttendance,
    ) -> Result<AttendanceRecord, BackendError> {
        self.attendance_inserts.fetch_add(1, Ordering::SeqCst);
        self.injected(Operation::InsertAttendance)?;

        let mut tables = lock(&self.tables);
        if tables.attendance.iter().any(|record| {
            record.qr_code_id == new_record.qr_code_id && record.student_id == new_record.student_id
        }) {
            return Err(unique_violation(
                "attendance_records_qr_code_id_student_id_key",
            ));
        }
        let record = AttendanceRecord {
            id: tables.next_id("attendance"),
            qr_code_id: new_record.qr_code_id.clone(),
            student_id: new_record.student_id.clone(),
            student_name: new_record.student_name.clone(),
            enrollment_no: new_record.enrollment_no.clone(),
            semester: new_record.semester.clone(),
            branch: new_record.branch.clone(),
            course: new_record.course.clone(),
            status: new_record.status,
            created_at: Some(Utc::now()),
        };
        tables.attendance.push(record.clone());
        Ok(record)
    }

    async fn list_session_attendance(
        &self,
        qr_code_id: &str,
    ) -> Result<Vec<AttendanceRecord>, BackendError> {
        Ok(lock(&self.tables)
            .attendance
            .iter()
            .rev()
            .filter(|record| record.qr_code_id == qr_code_id)
            .cloned()
            .collect())
    }

    async fn list_student_attendance(
        &self,
        student_id: &str,
    ) -> Result<Vec<AttendanceRecord>, BackendError> {
        Ok(lock(&self.tables)
            .attendance
            .iter()
            .rev()
            .filter(|record| record.student_id == student_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_profile_for_identity_is_a_unique_violation() {
        let backend = InMemoryBackend::new();
        let identity = backend.register_user("ann@example.com", "secret1", UserMetadata::default());
        let new_profile = NewProfile::from_identity(&identity);

        backend.insert_profile(&new_profile).await.unwrap();
        let err = backend.insert_profile(&new_profile).await.unwrap_err();

        assert!(err.is_unique_violation());
        assert_eq!(backend.profiles_for(&identity.id).len(), 1);
        assert_eq!(backend.profile_insert_attempts(), 2);
    }

    #[tokio::test]
    async fn test_injected_failure_applies_once() {
        let backend = InMemoryBackend::new();
        backend.fail_next(
            Operation::CheckConnection,
            BackendError::Transport("connection refused".to_string()),
        );

        assert!(backend.check_connection().await.is_err());
        assert!(backend.check_connection().await.is_ok());
    }

    #[tokio::test]
    async fn test_sign_in_publishes_event() {
        let backend = InMemoryBackend::new();
        backend.register_user("ann@example.com", "secret1", UserMetadata::default());
        let mut events = backend.subscribe();

        backend.sign_in("ann@example.com", "secret1").await.unwrap();
        let change = events.recv().await.unwrap();
        assert_eq!(change.event, AuthEvent::SignedIn);
        assert_eq!(change.identity().unwrap().email, "ann@example.com");

        let err = backend.sign_in("ann@example.com", "wrong").await.unwrap_err();
        assert_eq!(err.code(), Some("invalid_credentials"));
    }
}
