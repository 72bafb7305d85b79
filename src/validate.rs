//! Input validation
//!
//! Pure functions checking username and message-text well-formedness.
//! Lengths are counted in Unicode code points, never bytes, so emoji and
//! accented characters count as one each.

use thiserror::Error;

/// Minimum username length in code points
pub const USERNAME_MIN_LEN: usize = 3;
/// Maximum username length in code points
pub const USERNAME_MAX_LEN: usize = 20;
/// Maximum message text length in code points
pub const MESSAGE_MAX_LEN: usize = 300;

/// Validation failures, with client-facing messages
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Username cannot be empty")]
    EmptyUsername,

    #[error("Username must be between 3 and 20 characters")]
    UsernameLengthOutOfRange,

    #[error("Username can only contain letters, numbers, and underscores")]
    IllegalUsernameCharacters,

    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("Message too long (max 300 characters)")]
    MessageTooLong,
}

/// Validate a username.
///
/// Rules: non-empty after trimming, 3-20 code points, only ASCII letters,
/// digits and underscores.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let username = username.trim();

    if username.is_empty() {
        return Err(ValidationError::EmptyUsername);
    }

    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(ValidationError::UsernameLengthOutOfRange);
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ValidationError::IllegalUsernameCharacters);
    }

    Ok(())
}

/// Validate message text.
///
/// Rules: non-empty after trimming, at most 300 code points.
pub fn validate_message_text(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::EmptyMessage);
    }

    if text.chars().count() > MESSAGE_MAX_LEN {
        return Err(ValidationError::MessageTooLong);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_valid() {
        assert!(validate_username("Jan").is_ok());
        assert!(validate_username("anna_nowak_42").is_ok());
        assert!(validate_username(&"a".repeat(20)).is_ok());
    }

    #[test]
    fn test_username_empty() {
        assert_eq!(validate_username(""), Err(ValidationError::EmptyUsername));
        assert_eq!(
            validate_username("   "),
            Err(ValidationError::EmptyUsername)
        );
    }

    #[test]
    fn test_username_length_bounds() {
        assert_eq!(
            validate_username("ab"),
            Err(ValidationError::UsernameLengthOutOfRange)
        );
        assert_eq!(
            validate_username(&"a".repeat(21)),
            Err(ValidationError::UsernameLengthOutOfRange)
        );
    }

    #[test]
    fn test_username_illegal_characters() {
        assert_eq!(
            validate_username("jan kowalski"),
            Err(ValidationError::IllegalUsernameCharacters)
        );
        assert_eq!(
            validate_username("jan-k"),
            Err(ValidationError::IllegalUsernameCharacters)
        );
        // Non-ASCII letters are rejected even though they count as one
        // code point each
        assert_eq!(
            validate_username("żółw"),
            Err(ValidationError::IllegalUsernameCharacters)
        );
    }

    #[test]
    fn test_message_valid() {
        assert!(validate_message_text("Cześć wszystkim!").is_ok());
        assert!(validate_message_text(&"x".repeat(300)).is_ok());
    }

    #[test]
    fn test_message_empty() {
        assert_eq!(
            validate_message_text(""),
            Err(ValidationError::EmptyMessage)
        );
        assert_eq!(
            validate_message_text(" \t\n"),
            Err(ValidationError::EmptyMessage)
        );
    }

    #[test]
    fn test_message_length_counts_code_points() {
        // 300 emoji are 1200 bytes but exactly 300 code points
        let ok = "🎉".repeat(300);
        assert!(ok.len() > MESSAGE_MAX_LEN);
        assert!(validate_message_text(&ok).is_ok());

        let too_long = "🎉".repeat(301);
        assert_eq!(
            validate_message_text(&too_long),
            Err(ValidationError::MessageTooLong)
        );
    }

    #[test]
    fn test_message_boundary_ascii() {
        assert_eq!(
            validate_message_text(&"x".repeat(301)),
            Err(ValidationError::MessageTooLong)
        );
    }
}
