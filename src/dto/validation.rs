//! Validation helpers for DTOs.

use validator::ValidationError;

/// Validates that a player ID is 1 to 64 characters of `[A-Za-z0-9_-]`.
///
/// # Examples
///
/// ```ignore
/// validate_player_id("user_42")   // Ok
/// validate_player_id("")          // Err - empty
/// validate_player_id("user 42")   // Err - space
/// ```
pub fn validate_player_id(id: &str) -> Result<(), ValidationError> {
    validate_identifier("player_id", "Player ID", id)
}

/// Same rules as [`validate_player_id`], applied to room identifiers in URLs.
pub fn validate_match_id(id: &str) -> Result<(), ValidationError> {
    validate_identifier("match_id", "Match ID", id)
}

fn validate_identifier(
    code: &'static str,
    label: &str,
    id: &str,
) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > 64 {
        let mut err = ValidationError::new(code);
        err.message = Some(
            format!(
                "{label} must be between 1 and 64 characters (got {})",
                id.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        let mut err = ValidationError::new(code);
        err.message = Some(format!("{label} must contain only letters, digits, '_' or '-'").into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_player_id_valid() {
        assert!(validate_player_id("user_42").is_ok());
        assert!(validate_player_id("0b6c1f4e-2d").is_ok());
        assert!(validate_player_id("A").is_ok());
    }

    #[test]
    fn test_validate_player_id_invalid_length() {
        assert!(validate_player_id("").is_err());
        assert!(validate_player_id(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_player_id_invalid_format() {
        assert!(validate_player_id("user 42").is_err()); // space
        assert!(validate_player_id("user@42").is_err()); // symbol
        assert!(validate_player_id("größe").is_err()); // non-ascii
    }

    #[test]
    fn match_ids_from_the_queue_are_valid() {
        assert!(validate_match_id("match_3f2a9c1e").is_ok());
        let err = validate_match_id("../etc").unwrap_err();
        assert_eq!(err.code, "match_id");
    }
}
