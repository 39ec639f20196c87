// Data API (`/rest/v1`) half of the hosted backend
use super::rest::{HostedBackend, SINGLE_OBJECT};
use super::{AttendanceStore, ProfileStore};
use crate::models::{
    AttendanceRecord, BackendError, NewAttendance, NewProfile, NewQrSession, Profile,
    ProfileUpdate, QrSession,
};
use async_trait::async_trait;
use reqwest::header;
use serde::de::DeserializeOwned;
use serde::Serialize;

const PROFILES: &str = "profiles";
const QR_CODES: &str = "qr_codes";
const ATTENDANCE_RECORDS: &str = "attendance_records";

const NEWEST_FIRST: (&str, &str) = ("order", "created_at.desc");

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

impl HostedBackend {
    /// Select exactly one row; "no rows" becomes `Ok(None)`
    async fn select_single<T: DeserializeOwned>(
        &self,
        relation: &str,
        filters: &[(&str, String)],
    ) -> Result<Option<T>, BackendError> {
        let request = self
            .client
            .get(self.table(relation)?)
            .query(&[("select", "*")])
            .query(filters)
            .header(header::ACCEPT, SINGLE_OBJECT);

        match self.send_json::<T>(request).await {
            Ok(row) => Ok(Some(row)),
            Err(err) if err.is_no_rows() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn select_many<T: DeserializeOwned>(
        &self,
        relation: &str,
        filters: &[(&str, String)],
    ) -> Result<Vec<T>, BackendError> {
        let request = self
            .client
            .get(self.table(relation)?)
            .query(&[("select", "*"), NEWEST_FIRST])
            .query(filters);
        self.send_json(request).await
    }

    /// Insert one row and return it as stored
    async fn insert_returning<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        relation: &str,
        row: &B,
    ) -> Result<T, BackendError> {
        let request = self
            .client
            .post(self.table(relation)?)
            .header("Prefer", "return=representation")
            .header(header::ACCEPT, SINGLE_OBJECT)
            .json(row);
        self.send_json(request).await
    }
}

#[async_trait]
impl ProfileStore for HostedBackend {
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>, BackendError> {
        self.select_single(PROFILES, &[("user_id", eq(user_id))])
            .await
    }

    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile, BackendError> {
        self.insert_returning(PROFILES, profile).await
    }

    async fn update_profile(
        &self,
        user_id: &str,
        update: &ProfileUpdate,
    ) -> Result<Profile, BackendError> {
        let request = self
            .client
            .patch(self.table(PROFILES)?)
            .query(&[("user_id", eq(user_id))])
            .header("Prefer", "return=representation")
            .header(header::ACCEPT, SINGLE_OBJECT)
            .json(update);
        self.send_json(request).await
    }

    async fn check_connection(&self) -> Result<(), BackendError> {
        let request = self
            .client
            .get(self.table(PROFILES)?)
            .query(&[("select", "count"), ("limit", "1")]);
        self.send_empty(request).await
    }
}

#[async_trait]
impl AttendanceStore for HostedBackend {
    async fn insert_qr_session(&self, session: &NewQrSession) -> Result<QrSession, BackendError> {
        self.insert_returning(QR_CODES, session).await
    }

    async fn find_active_qr_session(
        &self,
        token: &str,
    ) -> Result<Option<QrSession>, BackendError> {
        self.select_single(
            QR_CODES,
            &[("qr_data", eq(token)), ("is_active", eq("true"))],
        )
        .await
    }

    async fn list_qr_sessions(&self, admin_id: &str) -> Result<Vec<QrSession>, BackendError> {
        self.select_many(QR_CODES, &[("admin_id", eq(admin_id))])
            .await
    }

    async fn find_attendance(
        &self,
        qr_code_id: &str,
        student_id: &str,
    ) -> Result<Option<AttendanceRecord>, BackendError> {
        self.select_single(
            ATTENDANCE_RECORDS,
            &[
                ("qr_code_id", eq(qr_code_id)),
                ("student_id", eq(student_id)),
            ],
        )
        .await
    }

    async fn insert_attendance(
        &self,
        record: &NewAttendance,
    ) -> Result<AttendanceRecord, BackendError> {
        self.insert_returning(ATTENDANCE_RECORDS, record).await
    }

    async fn list_session_attendance(
        &self,
        qr_code_id: &str,
    ) -> Result<Vec<AttendanceRecord>, BackendError> {
        self.select_many(ATTENDANCE_RECORDS, &[("qr_code_id", eq(qr_code_id))])
            .await
    }

    async fn list_student_attendance(
        &self,
        student_id: &str,
    ) -> Result<Vec<AttendanceRecord>, BackendError> {
        self.select_many(ATTENDANCE_RECORDS, &[("student_id", eq(student_id))])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;
    use url::Url;

    #[test]
    fn test_filter_encoding() {
        let backend = HostedBackend::new(
            Client::new(),
            Url::parse("https://project.example.co").unwrap(),
            "anon-key".to_string(),
        );
        let request = backend
            .client
            .get(backend.table(QR_CODES).unwrap())
            .query(&[("select", "*")])
            .query(&[("qr_data", eq("ATTENDQR_1_abc")), ("is_active", eq("true"))])
            .build()
            .unwrap();
        assert_eq!(
            request.url().query(),
            Some("select=*&qr_data=eq.ATTENDQR_1_abc&is_active=eq.true")
        );
    }
}
