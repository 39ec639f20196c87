// Centralized logging for the session lifecycle and route decisions
use crate::models::AuthEvent;
use log::{debug, info};

pub struct LoggingHelper;

impl LoggingHelper {
    /// Log an auth event as the Session Store receives it
    pub fn log_auth_event(event: AuthEvent, identity_id: Option<&str>) {
        match identity_id {
            Some(id) => info!("🔐 Auth event {event} for user {id}"),
            None => info!("🔐 Auth event {event} (no user)"),
        }
    }

    /// Log one step of the profile bootstrap
    pub fn log_bootstrap_step(identity_id: &str, step: &str) {
        debug!("👤 Profile bootstrap for {identity_id}: {step}");
    }

    /// Log the outcome of a route guard evaluation
    pub fn log_guard_decision(path: &str, decision: &str) {
        debug!("🛡️  Guard on {path}: {decision}");
    }

    /// Log a generated attendance session
    pub fn log_qr_session_created(session_id: &str, session_name: &str, admin_id: &str) {
        info!("📷 QR session {session_id} '{session_name}' created by {admin_id}");
    }

    /// Log a scan result
    pub fn log_attendance_scan(student_id: &str, outcome: &str) {
        info!("✅ Attendance scan by {student_id}: {outcome}");
    }

    /// Log the configured backend at startup
    pub fn log_backend_configured(url: &str, has_anon_key: bool) {
        if has_anon_key {
            info!("🔧 Hosted backend configured at {url}");
        } else {
            info!("⚠️  Hosted backend at {url} has no anon key configured - requests will be rejected");
        }
    }
}
