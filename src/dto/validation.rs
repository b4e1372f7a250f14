//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest accepted player identifier.
pub const MAX_PLAYER_ID_LEN: usize = 64;

/// Validates an externally supplied player identifier: 1 to 64 characters, no whitespace or
/// control characters.
///
/// # Examples
///
/// ```ignore
/// validate_player_id("user-42")   // Ok
/// validate_player_id("")          // Err - empty
/// validate_player_id("user 42")   // Err - whitespace
/// ```
pub fn validate_player_id(id: &str) -> Result<(), ValidationError> {
    let length = id.chars().count();
    if length == 0 || length > MAX_PLAYER_ID_LEN {
        let mut err = ValidationError::new("player_id_length");
        err.message = Some(
            format!("Player ID must be 1 to {MAX_PLAYER_ID_LEN} characters (got {length})").into(),
        );
        return Err(err);
    }

    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        let mut err = ValidationError::new("player_id_format");
        err.message = Some("Player ID must not contain whitespace or control characters".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a human-facing name: not blank once trimmed, no control characters.
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("name_blank");
        err.message = Some("Name must not be blank".into());
        return Err(err);
    }

    if name.chars().any(char::is_control) {
        let mut err = ValidationError::new("name_format");
        err.message = Some("Name must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_player_id_valid() {
        assert!(validate_player_id("user-42").is_ok());
        assert!(validate_player_id("bot-5f2c").is_ok());
        assert!(validate_player_id(&"a".repeat(MAX_PLAYER_ID_LEN)).is_ok());
    }

    #[test]
    fn test_validate_player_id_invalid() {
        assert!(validate_player_id("").is_err());
        assert!(validate_player_id(&"a".repeat(MAX_PLAYER_ID_LEN + 1)).is_err());
        assert!(validate_player_id("user 42").is_err());
        assert!(validate_player_id("user\n42").is_err());
    }

    #[test]
    fn test_validate_display_name() {
        assert!(validate_display_name("Friday night").is_ok());
        assert!(validate_display_name("   ").is_err());
        assert!(validate_display_name("bad\u{7}").is_err());
    }
}
