use sha2::{Digest, Sha256};

use crate::errors::{AppError, AppResult};

pub const MAX_USER_NAME_LEN: usize = 100;

/// User names are free-form text: anything non-blank up to
/// [`MAX_USER_NAME_LEN`] characters.
pub fn validate_user_name(user: &str) -> AppResult<()> {
    if user.trim().is_empty() {
        return Err(AppError::InvalidUser {
            user: user.to_string(),
            message: "user name cannot be empty".into(),
        });
    }

    let len = user.chars().count();
    if len > MAX_USER_NAME_LEN {
        return Err(AppError::InvalidUser {
            user: user.to_string(),
            message: format!("user name exceeds {MAX_USER_NAME_LEN} characters (found {len})"),
        });
    }

    Ok(())
}

/// File stem under which a user's records are kept: hex SHA-256 of the name.
///
/// Fixed length and filesystem-safe for any name; records carry the clear
/// name and stores compare it on read.
pub fn storage_key(user: &str) -> String {
    hex::encode(Sha256::digest(user.as_bytes()))
}

/// Maps an absent or blank request field to `MissingField`.
pub fn require_field<'a>(value: Option<&'a str>, field: &'static str) -> AppResult<&'a str> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(AppError::MissingField { field }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_free_form_names() {
        for name in ["alice", "bob_2-x", "john.doe", "bob@example.com", "ñame", "a b"] {
            assert!(validate_user_name(name).is_ok(), "{name} should be accepted");
        }
        assert!(validate_user_name(&"é".repeat(MAX_USER_NAME_LEN)).is_ok());
    }

    #[test]
    fn rejects_blank_and_overlong_names() {
        for name in ["", "   "] {
            assert!(matches!(
                validate_user_name(name),
                Err(AppError::InvalidUser { .. })
            ));
        }
        assert!(validate_user_name(&"a".repeat(MAX_USER_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn storage_keys_are_fixed_length_hex() {
        let key = storage_key("../etc/passwd");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|ch| ch.is_ascii_hexdigit()));
        assert_eq!(key, storage_key("../etc/passwd"));
        assert_ne!(storage_key("alice"), storage_key("Alice"));
        assert_eq!(storage_key(&"é".repeat(MAX_USER_NAME_LEN)).len(), 64);
    }

    #[test]
    fn blank_fields_are_missing() {
        assert!(matches!(
            require_field(Some("  "), "username"),
            Err(AppError::MissingField { field: "username" })
        ));
        assert!(matches!(
            require_field(None, "image"),
            Err(AppError::MissingField { field: "image" })
        ));
        assert_eq!(require_field(Some("alice"), "username").unwrap(), "alice");
    }
}
