use super::qr::{self, QrError};
use crate::backend::AttendanceStore;
use crate::models::{
    AttendanceRecord, BackendError, Identity, NewAttendance, NewQrSession, Profile, QrSession,
};
use crate::notifications::Notification;
use crate::settings::QrSettings;
use crate::utils::logging::LoggingHelper;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("Please enter a session name")]
    EmptySessionName,
    #[error("Please log in to scan QR codes")]
    NotSignedIn,
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Qr(#[from] QrError),
}

impl AttendanceError {
    /// Notification for a failed QR generation
    #[must_use]
    pub fn generation_notification(&self) -> Notification {
        match self {
            AttendanceError::EmptySessionName | AttendanceError::NotSignedIn => {
                Notification::error("Error", self.to_string())
            }
            _ => Notification::error("Error", "Failed to generate QR code"),
        }
    }

    /// Notification for a failed scan
    #[must_use]
    pub fn scan_notification(&self) -> Notification {
        match self {
            AttendanceError::NotSignedIn => Notification::error("Error", self.to_string()),
            _ => Notification::error("Error", "Failed to mark attendance"),
        }
    }
}

/// A freshly issued session with its image
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedQr {
    pub session: QrSession,
    /// `data:` URL of the SVG image
    pub image_data_url: String,
    pub download_name: String,
}

/// Result of a scan that reached the data store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkOutcome {
    Marked {
        record: AttendanceRecord,
        session_name: String,
    },
    /// The scanned code is not an attendance token
    InvalidCode,
    /// No active, unexpired session carries the token
    NotFoundOrExpired,
    AlreadyMarked,
}

impl MarkOutcome {
    #[must_use]
    pub fn notification(&self) -> Notification {
        match self {
            MarkOutcome::Marked { session_name, .. } => Notification::info(
                "Success",
                format!("Attendance marked successfully for {session_name}!"),
            ),
            MarkOutcome::InvalidCode => {
                Notification::error("Invalid QR Code", "This QR code is not for attendance")
            }
            MarkOutcome::NotFoundOrExpired => {
                Notification::error("Invalid QR Code", "QR code not found or expired")
            }
            MarkOutcome::AlreadyMarked => Notification::error(
                "Already Marked",
                "Your attendance is already recorded for this session",
            ),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            MarkOutcome::Marked { .. } => "marked",
            MarkOutcome::InvalidCode => "invalid code",
            MarkOutcome::NotFoundOrExpired => "not found or expired",
            MarkOutcome::AlreadyMarked => "already marked",
        }
    }
}

/// An admin's session together with how many students scanned it
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    #[serde(flatten)]
    pub session: QrSession,
    pub scan_count: usize,
}

pub struct AttendanceService {
    store: Arc<dyn AttendanceStore>,
    settings: QrSettings,
}

impl AttendanceService {
    #[must_use]
    pub fn new(store: Arc<dyn AttendanceStore>, settings: QrSettings) -> Self {
        Self { store, settings }
    }

    /// Issue a new attendance session for `admin` and render its QR image
    ///
    /// # Errors
    ///
    /// [`AttendanceError::EmptySessionName`] for a blank name (nothing is
    /// sent to the store), otherwise the store or encoder failure
    pub async fn create_session(
        &self,
        admin: &Identity,
        session_name: &str,
    ) -> Result<GeneratedQr, AttendanceError> {
        let session_name = session_name.trim();
        if session_name.is_empty() {
            return Err(AttendanceError::EmptySessionName);
        }

        let now = Utc::now();
        let expires_at = i64::try_from(self.settings.session_ttl_hours)
            .ok()
            .and_then(Duration::try_hours)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let new_session = NewQrSession {
            admin_id: admin.id.clone(),
            session_name: session_name.to_string(),
            qr_data: qr::generate_token(now),
            is_active: true,
            expires_at,
        };

        let session = self.store.insert_qr_session(&new_session).await?;
        let svg = qr::render_svg(
            &session.qr_data,
            self.settings.image_size,
            self.settings.quiet_zone,
        )?;
        LoggingHelper::log_qr_session_created(&session.id, &session.session_name, &admin.id);

        Ok(GeneratedQr {
            image_data_url: qr::svg_data_url(&svg),
            download_name: qr::download_filename(&session.session_name),
            session,
        })
    }

    /// Record `student`'s attendance for the session behind `scanned`
    ///
    /// The duplicate check reads before inserting; a concurrent scan that
    /// slips between the two is caught by the store's uniqueness constraint
    /// and reported the same way.
    ///
    /// # Errors
    ///
    /// Returns the store failure for anything other than the outcomes in
    /// [`MarkOutcome`]
    pub async fn mark_attendance(
        &self,
        student: &Identity,
        profile: &Profile,
        scanned: &str,
    ) -> Result<MarkOutcome, AttendanceError> {
        let outcome = self.mark(student, profile, scanned.trim()).await?;
        LoggingHelper::log_attendance_scan(&student.id, outcome.label());
        Ok(outcome)
    }

    async fn mark(
        &self,
        student: &Identity,
        profile: &Profile,
        token: &str,
    ) -> Result<MarkOutcome, AttendanceError> {
        if !qr::is_attendance_token(token) {
            return Ok(MarkOutcome::InvalidCode);
        }

        let session = match self.store.find_active_qr_session(token).await {
            Ok(Some(session)) if session.accepts_scans_at(Utc::now()) => session,
            Ok(_) => return Ok(MarkOutcome::NotFoundOrExpired),
            Err(err) => {
                debug!("QR session lookup failed: {err}");
                return Ok(MarkOutcome::NotFoundOrExpired);
            }
        };

        if self
            .store
            .find_attendance(&session.id, &student.id)
            .await?
            .is_some()
        {
            return Ok(MarkOutcome::AlreadyMarked);
        }

        let new_record = NewAttendance::present(&session, student, profile);
        match self.store.insert_attendance(&new_record).await {
            Ok(record) => Ok(MarkOutcome::Marked {
                record,
                session_name: session.session_name,
            }),
            Err(err) if err.is_unique_violation() => Ok(MarkOutcome::AlreadyMarked),
            Err(err) => Err(err.into()),
        }
    }

    /// The admin's sessions, newest first, with scan counts
    ///
    /// # Errors
    ///
    /// Returns the store failure
    pub async fn sessions_for_admin(
        &self,
        admin_id: &str,
    ) -> Result<Vec<SessionSummary>, AttendanceError> {
        let sessions = self.store.list_qr_sessions(admin_id).await?;
        let mut summaries = Vec::with_capacity(sessions.len());
        for session in sessions {
            let scan_count = self.store.list_session_attendance(&session.id).await?.len();
            summaries.push(SessionSummary {
                session,
                scan_count,
            });
        }
        Ok(summaries)
    }

    /// Attendance for one session
    ///
    /// # Errors
    ///
    /// Returns the store failure
    pub async fn records_for_session(
        &self,
        qr_code_id: &str,
    ) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        Ok(self.store.list_session_attendance(qr_code_id).await?)
    }

    /// A student's attendance history, newest first
    ///
    /// # Errors
    ///
    /// Returns the store failure
    pub async fn history_for_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        Ok(self.store.list_student_attendance(student_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_notifications() {
        let marked = MarkOutcome::Marked {
            record: AttendanceRecord {
                id: "r1".to_string(),
                qr_code_id: "q1".to_string(),
                student_id: "s1".to_string(),
                student_name: "John Doe".to_string(),
                enrollment_no: String::new(),
                semester: String::new(),
                branch: String::new(),
                course: String::new(),
                status: crate::models::AttendanceStatus::Present,
                created_at: None,
            },
            session_name: "Morning Lecture".to_string(),
        };
        assert_eq!(
            marked.notification().description,
            "Attendance marked successfully for Morning Lecture!"
        );
        assert_eq!(MarkOutcome::AlreadyMarked.notification().title, "Already Marked");
        assert_eq!(
            MarkOutcome::InvalidCode.notification().description,
            "This QR code is not for attendance"
        );
        assert_eq!(
            MarkOutcome::NotFoundOrExpired.notification().description,
            "QR code not found or expired"
        );
    }

    #[test]
    fn test_generation_notifications() {
        assert_eq!(
            AttendanceError::EmptySessionName
                .generation_notification()
                .description,
            "Please enter a session name"
        );
        let backend = AttendanceError::Backend(BackendError::Transport("down".to_string()));
        assert_eq!(
            backend.generation_notification().description,
            "Failed to generate QR code"
        );
    }
}
