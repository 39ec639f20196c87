use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::{Identity, Profile};

/// Admin-issued attendance session (`qr_codes` relation)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrSession {
    pub id: String,
    pub admin_id: String,
    pub session_name: String,
    pub qr_data: String,
    pub is_active: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl QrSession {
    /// Whether students can still mark attendance against this session
    #[must_use]
    pub fn accepts_scans_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewQrSession {
    pub admin_id: String,
    pub session_name: String,
    pub qr_data: String,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AttendanceStatus {
    #[default]
    Present,
    Late,
    Absent,
}

/// One student's attendance against one QR session (`attendance_records`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub qr_code_id: String,
    pub student_id: String,
    pub student_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub enrollment_no: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub semester: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub branch: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub course: String,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Insert payload; student fields are denormalised from the profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewAttendance {
    pub qr_code_id: String,
    pub student_id: String,
    pub student_name: String,
    pub enrollment_no: String,
    pub semester: String,
    pub branch: String,
    pub course: String,
    pub status: AttendanceStatus,
}

impl NewAttendance {
    #[must_use]
    pub fn present(session: &QrSession, student: &Identity, profile: &Profile) -> Self {
        Self {
            qr_code_id: session.id.clone(),
            student_id: student.id.clone(),
            student_name: profile.full_name.clone(),
            enrollment_no: profile.enrollment_no.clone().unwrap_or_default(),
            semester: profile.semester.clone().unwrap_or_default(),
            branch: profile.branch.clone().unwrap_or_default(),
            course: profile.course.clone().unwrap_or_default(),
            status: AttendanceStatus::Present,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(is_active: bool, expires_at: Option<DateTime<Utc>>) -> QrSession {
        QrSession {
            id: "qr-1".to_string(),
            admin_id: "admin-1".to_string(),
            session_name: "Morning Lecture - CS101".to_string(),
            qr_data: "ATTENDQR_1_abc".to_string(),
            is_active,
            expires_at,
            created_at: None,
        }
    }

    #[test]
    fn test_accepts_scans_checks_active_flag_and_expiry() {
        let now = Utc::now();
        assert!(session(true, Some(now + Duration::hours(1))).accepts_scans_at(now));
        assert!(session(true, None).accepts_scans_at(now));
        assert!(!session(false, Some(now + Duration::hours(1))).accepts_scans_at(now));
        assert!(!session(true, Some(now - Duration::seconds(1))).accepts_scans_at(now));
    }

    #[test]
    fn test_status_uses_display_names() {
        let json = serde_json::to_string(&AttendanceStatus::Present).unwrap();
        assert_eq!(json, "\"Present\"");
    }

    #[test]
    fn test_record_parses_backend_row() {
        let row = serde_json::json!({
            "id": "rec-1",
            "qr_code_id": "qr-1",
            "student_id": "student-1",
            "student_name": "John Doe",
            "enrollment_no": "EN2024001",
            "semester": "6",
            "branch": "Computer",
            "course": null,
            "status": "Present",
            "created_at": "2024-01-15T09:30:00.123456+00:00"
        });
        let record: AttendanceRecord = serde_json::from_value(row).unwrap();
        assert_eq!(record.status, AttendanceStatus::Present);
        assert!(record.created_at.is_some());
        assert_eq!(record.course, "");
    }
}
