use serde::{Deserialize, Serialize};

use super::{Identity, Role};

/// Application-owned record keyed by identity (`profiles` relation)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub user_id: String,
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub enrollment_no: Option<String>,
    #[serde(default)]
    pub semester: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub course: Option<String>,
    pub role: Role,
}

impl Profile {
    /// Merge an update into this profile, leaving untouched fields as they are
    pub fn apply(&mut self, update: &ProfileUpdate) {
        if let Some(full_name) = &update.full_name {
            self.full_name.clone_from(full_name);
        }
        if let Some(enrollment_no) = &update.enrollment_no {
            self.enrollment_no = Some(enrollment_no.clone());
        }
        if let Some(semester) = &update.semester {
            self.semester = Some(semester.clone());
        }
        if let Some(branch) = &update.branch {
            self.branch = Some(branch.clone());
        }
        if let Some(course) = &update.course {
            self.course = Some(course.clone());
        }
    }
}

/// Insert payload for a profile seeded from identity metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProfile {
    pub user_id: String,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub enrollment_no: Option<String>,
    pub semester: Option<String>,
    pub branch: Option<String>,
    pub course: Option<String>,
}

impl NewProfile {
    /// Build the first profile for an identity.
    ///
    /// Full name falls back to the local part of the email, then `"User"`.
    /// Role defaults to student. Blank enrollment fields are stored as null.
    #[must_use]
    pub fn from_identity(identity: &Identity) -> Self {
        let metadata = &identity.metadata;
        let full_name = non_blank(metadata.full_name.as_deref())
            .or_else(|| identity.email_local_part().map(ToString::to_string))
            .unwrap_or_else(|| "User".to_string());

        Self {
            user_id: identity.id.clone(),
            full_name,
            email: identity.email.clone(),
            role: Role::from_metadata(metadata.role.as_deref()),
            enrollment_no: non_blank(metadata.enrollment_no.as_deref()),
            semester: non_blank(metadata.semester.as_deref()),
            branch: non_blank(metadata.branch.as_deref()),
            course: non_blank(metadata.course.as_deref()),
        }
    }
}

/// Partial update of a profile; `None` fields are left out of the request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semester: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,
}

impl ProfileUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.enrollment_no.is_none()
            && self.semester.is_none()
            && self.branch.is_none()
            && self.course.is_none()
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserMetadata;

    fn identity(email: &str, metadata: UserMetadata) -> Identity {
        Identity {
            id: "user-1".to_string(),
            email: email.to_string(),
            metadata,
        }
    }

    #[test]
    fn test_new_profile_uses_metadata() {
        let metadata = UserMetadata {
            full_name: Some("Jane Smith".to_string()),
            role: Some("admin".to_string()),
            enrollment_no: Some("EN2024002".to_string()),
            semester: Some("6".to_string()),
            branch: Some("IT".to_string()),
            course: Some("B.E".to_string()),
        };
        let profile = NewProfile::from_identity(&identity("jane@example.com", metadata));

        assert_eq!(profile.user_id, "user-1");
        assert_eq!(profile.full_name, "Jane Smith");
        assert_eq!(profile.role, Role::Admin);
        assert_eq!(profile.enrollment_no.as_deref(), Some("EN2024002"));
        assert_eq!(profile.course.as_deref(), Some("B.E"));
    }

    #[test]
    fn test_new_profile_fallbacks() {
        let metadata = UserMetadata {
            full_name: Some("   ".to_string()),
            enrollment_no: Some(String::new()),
            ..UserMetadata::default()
        };
        let profile = NewProfile::from_identity(&identity("john@example.com", metadata));

        assert_eq!(profile.full_name, "john");
        assert_eq!(profile.role, Role::Student);
        assert_eq!(profile.enrollment_no, None);

        let anonymous = NewProfile::from_identity(&identity("", UserMetadata::default()));
        assert_eq!(anonymous.full_name, "User");
    }

    #[test]
    fn test_apply_update_keeps_untouched_fields() {
        let mut profile = Profile {
            id: "p1".to_string(),
            user_id: "user-1".to_string(),
            full_name: "John Doe".to_string(),
            email: "john@example.com".to_string(),
            enrollment_no: Some("EN2024001".to_string()),
            semester: None,
            branch: Some("Computer".to_string()),
            course: None,
            role: Role::Student,
        };
        let update = ProfileUpdate {
            semester: Some("6".to_string()),
            ..ProfileUpdate::default()
        };

        profile.apply(&update);

        assert_eq!(profile.semester.as_deref(), Some("6"));
        assert_eq!(profile.branch.as_deref(), Some("Computer"));
        assert_eq!(profile.full_name, "John Doe");
    }

    #[test]
    fn test_update_skips_empty_fields_when_serialized() {
        let update = ProfileUpdate {
            branch: Some("IT".to_string()),
            ..ProfileUpdate::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({ "branch": "IT" }));
        assert!(ProfileUpdate::default().is_empty());
    }
}
