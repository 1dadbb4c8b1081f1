//! Fail-closed input validation for everything that crosses the wire.
//!
//! Every public entry point that takes caller-supplied identifiers or
//! metadata runs through these checks before any network call is made, so a
//! malformed request never reaches the service.

use crate::api::models::{SessionMetadata, UserProfile};
use crate::error::{StreamError, StreamResult};

pub const MAX_ID_LENGTH: usize = 64;
pub const MAX_TYPE_LENGTH: usize = 64;
pub const MAX_TAG_COUNT: usize = 16;
pub const MAX_TAG_LENGTH: usize = 64;
pub const MAX_EMAIL_LENGTH: usize = 254;
pub const MAX_NAME_LENGTH: usize = 128;

fn is_valid_id_chars(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn validate_identifier(field: &'static str, value: &str) -> StreamResult<()> {
    if value.is_empty() {
        return Err(StreamError::Validation(format!("{field} must not be empty")));
    }
    if value.len() > MAX_ID_LENGTH {
        return Err(StreamError::Validation(format!(
            "{field} exceeds {MAX_ID_LENGTH} characters"
        )));
    }
    if !is_valid_id_chars(value) {
        return Err(StreamError::Validation(format!(
            "{field} contains characters outside [A-Za-z0-9_-]"
        )));
    }
    Ok(())
}

pub fn validate_session_metadata(metadata: &SessionMetadata) -> StreamResult<()> {
    validate_identifier("user_id", &metadata.user_id)?;
    if metadata.session_type.len() > MAX_TYPE_LENGTH {
        return Err(StreamError::Validation(format!(
            "session_type exceeds {MAX_TYPE_LENGTH} characters"
        )));
    }
    if metadata.session_tags.len() > MAX_TAG_COUNT {
        return Err(StreamError::Validation(format!(
            "too many session tags (max {MAX_TAG_COUNT})"
        )));
    }
    for tag in &metadata.session_tags {
        if tag.is_empty() || tag.len() > MAX_TAG_LENGTH {
            return Err(StreamError::Validation(format!(
                "session tag must be 1-{MAX_TAG_LENGTH} characters"
            )));
        }
    }
    Ok(())
}

pub fn validate_user_profile(profile: &UserProfile) -> StreamResult<()> {
    if profile.email.is_empty() || profile.email.len() > MAX_EMAIL_LENGTH {
        return Err(StreamError::Validation(format!(
            "email must be 1-{MAX_EMAIL_LENGTH} characters"
        )));
    }
    if !profile.email.contains('@') {
        return Err(StreamError::Validation(
            "email is missing an @ separator".to_string(),
        ));
    }
    for (field, value) in [
        ("first_name", &profile.first_name),
        ("last_name", &profile.last_name),
        ("group", &profile.group),
    ] {
        if let Some(value) = value {
            if value.len() > MAX_NAME_LENGTH {
                return Err(StreamError::Validation(format!(
                    "{field} exceeds {MAX_NAME_LENGTH} characters"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::SessionMode;
    use chrono::Utc;

    fn metadata(user_id: &str) -> SessionMetadata {
        SessionMetadata {
            user_id: user_id.to_string(),
            session_date: Utc::now(),
            session_type: "resting".to_string(),
            session_tags: vec!["eyes-closed".to_string()],
            mode: SessionMode::SimpleRealtime,
        }
    }

    #[test]
    fn test_accepts_well_formed_metadata() {
        assert!(validate_session_metadata(&metadata("user-123")).is_ok());
    }

    #[test]
    fn test_rejects_empty_user_id() {
        let err = validate_session_metadata(&metadata("")).unwrap_err();
        assert!(matches!(err, StreamError::Validation(_)));
    }

    #[test]
    fn test_rejects_user_id_with_path_characters() {
        assert!(validate_session_metadata(&metadata("../../etc")).is_err());
        assert!(validate_session_metadata(&metadata("user id")).is_err());
    }

    #[test]
    fn test_rejects_oversized_user_id() {
        let long = "a".repeat(MAX_ID_LENGTH + 1);
        assert!(validate_identifier("user_id", &long).is_err());
    }

    #[test]
    fn test_rejects_too_many_tags() {
        let mut m = metadata("user-123");
        m.session_tags = (0..MAX_TAG_COUNT + 1).map(|i| format!("t{i}")).collect();
        assert!(validate_session_metadata(&m).is_err());
    }

    #[test]
    fn test_rejects_email_without_separator() {
        let profile = UserProfile {
            email: "not-an-email".to_string(),
            first_name: None,
            last_name: None,
            group: None,
            age: None,
        };
        assert!(validate_user_profile(&profile).is_err());
    }
}
