//! Registration and login form validation
//!
//! Forms are validated before any request reaches the auth provider.

use crate::models::{Role, UserMetadata};
use crate::notifications::Notification;
use serde::Deserialize;
use thiserror::Error;

pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("Passwords don't match!")]
    PasswordMismatch,
    #[error("Password must be at least {MIN_PASSWORD_LENGTH} characters long")]
    WeakPassword,
}

impl ValidationError {
    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            ValidationError::MissingField(_) => "Missing Field",
            ValidationError::PasswordMismatch => "Password Mismatch",
            ValidationError::WeakPassword => "Weak Password",
        }
    }

    #[must_use]
    pub fn notification(&self) -> Notification {
        Notification::error(self.title(), self.to_string())
    }
}

fn require(value: &str, label: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(label))
    } else {
        Ok(())
    }
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegistrationForm {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub role: Role,
    pub enrollment_no: String,
    pub semester: String,
    pub branch: String,
    pub course: String,
}

impl RegistrationForm {
    /// Check the form in the order a user meets the problems: required fields
    /// first, then the password rules
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.full_name, "Full name")?;
        require(&self.email, "Email")?;
        require(&self.password, "Password")?;
        require(&self.confirm_password, "Confirm password")?;
        if self.role == Role::Student {
            require(&self.enrollment_no, "Enrollment number")?;
        }

        if self.password != self.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ValidationError::WeakPassword);
        }
        Ok(())
    }

    /// Email as sent to the auth provider
    #[must_use]
    pub fn email(&self) -> &str {
        self.email.trim()
    }

    /// Sign-up metadata; enrollment details are only sent for students
    #[must_use]
    pub fn metadata(&self) -> UserMetadata {
        let student = self.role == Role::Student;
        let enrollment = |value: &str| if student { optional(value) } else { None };
        UserMetadata {
            full_name: optional(&self.full_name),
            role: Some(self.role.as_str().to_string()),
            enrollment_no: enrollment(&self.enrollment_no),
            semester: enrollment(&self.semester),
            branch: enrollment(&self.branch),
            course: enrollment(&self.course),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl LoginForm {
    /// Email as sent to the auth provider
    #[must_use]
    pub fn email(&self) -> &str {
        self.email.trim()
    }

    /// # Errors
    ///
    /// Returns [`ValidationError::MissingField`] for an empty email or password
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.email, "Email")?;
        if self.password.is_empty() {
            return Err(ValidationError::MissingField("Password"));
        }
        Ok(())
    }
}
