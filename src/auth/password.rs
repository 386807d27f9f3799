//! Password hashing (Argon2id, PHC string format).

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use uuid::Uuid;

use super::AuthError;

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    // 16 random bytes from a v4 uuid
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| AuthError::PasswordHash(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::PasswordHash(e.to_string()))
}

/// `Ok(())` when `password` matches `hashed_password`
pub fn check_password(password: &str, hashed_password: &str) -> Result<(), AuthError> {
    let parsed =
        PasswordHash::new(hashed_password).map_err(|e| AuthError::PasswordHash(e.to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|e| match e {
            argon2::password_hash::Error::Password => AuthError::PasswordMismatch,
            other => AuthError::PasswordHash(other.to_string()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_check() {
        let hashed = hash_password("secret1").unwrap();
        assert!(hashed.starts_with("$argon2id$"));
        assert!(check_password("secret1", &hashed).is_ok());
        assert_eq!(
            check_password("secret2", &hashed),
            Err(AuthError::PasswordMismatch)
        );
    }

    #[test]
    fn test_hashes_are_salted() {
        assert_ne!(hash_password("secret1").unwrap(), hash_password("secret1").unwrap());
    }

    #[test]
    fn test_malformed_hash_is_error() {
        assert!(matches!(
            check_password("secret1", "not-a-phc-string"),
            Err(AuthError::PasswordHash(_))
        ));
    }
}
