//! Password hashing.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use super::AuthError;

/// Hash a password using Argon2id.
///
/// A fresh random salt is generated per call, so hashing the same
/// plaintext twice never yields the same digest. The returned string is in
/// PHC format and embeds the salt and work-factor parameters.
///
/// # Errors
///
/// Returns error if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Config(format!("Password hashing failed: {e}")))
}

/// Verify a password against a stored PHC-format hash.
///
/// Comparison is constant-time within the argon2 crate. A malformed digest
/// is treated as a verification failure, not an error.
#[must_use]
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse battery 1").unwrap();
        assert!(hash.starts_with("$argon2id$"));

        assert!(verify_password("correct horse battery 1", &hash));
        assert!(!verify_password("wrong password 2", &hash));
    }

    #[test]
    fn test_same_password_different_digests() {
        let hash1 = hash_password("Password1").unwrap();
        let hash2 = hash_password("Password1").unwrap();

        assert_ne!(hash1, hash2);
        assert!(verify_password("Password1", &hash1));
        assert!(verify_password("Password1", &hash2));
    }

    #[test]
    fn test_malformed_digest_is_failure_not_error() {
        assert!(!verify_password("anything", "not-a-valid-hash"));
        assert!(!verify_password("anything", ""));
        assert!(!verify_password("anything", "$argon2id$truncated"));
    }

    #[test]
    fn test_unicode_password() {
        let hash = hash_password("pässwörd-123").unwrap();
        assert!(verify_password("pässwörd-123", &hash));
    }
}
