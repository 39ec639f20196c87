//! Validation Module
//!
//! - [`forms`] - registration and login form checks
//! - [`friendly_message`] - provider error text cleanup for notifications

pub mod forms;

pub use forms::{LoginForm, RegistrationForm, ValidationError, MIN_PASSWORD_LENGTH};

use serde_json::Value;

/// Unwrap a provider error message that is itself a JSON document carrying a
/// `message` field; anything else is returned unchanged.
#[must_use]
pub fn friendly_message(raw: &str) -> String {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => match map.get("message") {
            Some(Value::String(message)) if !message.is_empty() => message.clone(),
            _ => raw.to_string(),
        },
        _ => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_message_is_unwrapped() {
        let raw = r#"{"code":"weak_password","message":"Password should be at least 6 characters."}"#;
        assert_eq!(
            friendly_message(raw),
            "Password should be at least 6 characters."
        );
    }

    #[test]
    fn test_plain_message_is_unchanged() {
        assert_eq!(friendly_message("User already registered"), "User already registered");
        assert_eq!(friendly_message(r#"{"error":"x"}"#), r#"{"error":"x"}"#);
        assert_eq!(friendly_message("42"), "42");
    }
}
