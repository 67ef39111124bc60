//! JWT session-token management.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use rolodex_core::UserId;

use super::AuthError;
use super::users::Role;

/// JWT claims.
///
/// The roles claim is a snapshot taken at issuance. It is advisory only:
/// authorization decisions re-resolve roles from the live user record, so
/// a role change after issuance is not masked by an old token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: String,
    /// Roles held at issuance.
    pub roles: Vec<Role>,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
}

/// JWT manager for creating and validating session tokens.
///
/// The signing key and validity window are fixed at construction and never
/// mutated afterwards; the manager is shared process-wide.
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validity: Duration,
}

impl JwtManager {
    /// Create a new JWT manager with a secret key.
    ///
    /// The secret should be at least 32 bytes for security.
    #[must_use]
    pub fn new(secret: &[u8], validity: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validity,
        }
    }

    /// Create a JWT manager from a hex-encoded secret.
    ///
    /// # Errors
    ///
    /// Returns error if hex decoding fails.
    pub fn from_hex_secret(hex_secret: &str, validity: Duration) -> Result<Self, AuthError> {
        let secret = hex::decode(hex_secret)
            .map_err(|e| AuthError::Config(format!("Invalid hex secret: {e}")))?;
        Ok(Self::new(&secret, validity))
    }

    /// Generate a random 256-bit secret key.
    #[must_use]
    pub fn generate_secret() -> [u8; 32] {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes
    }

    /// Generate a random secret as hex string.
    #[must_use]
    pub fn generate_hex_secret() -> String {
        hex::encode(Self::generate_secret())
    }

    /// Issue a session token for a user.
    ///
    /// The token is valid from `now` until `now + validity`. Callers pass
    /// the current instant explicitly; the manager holds no clock.
    ///
    /// # Errors
    ///
    /// Returns error if token encoding fails.
    pub fn issue(
        &self,
        user_id: &UserId,
        roles: &[Role],
        now: DateTime<Utc>,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        let expires_at = now
            + chrono::Duration::from_std(self.validity)
                .map_err(|e| AuthError::Config(format!("Invalid token validity: {e}")))?;

        let claims = Claims {
            sub: user_id.to_string(),
            roles: roles.to_vec(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Token(format!("Encoding failed: {e}")))?;

        Ok((token, expires_at))
    }

    /// Verify a token against the signing key and the supplied instant.
    ///
    /// Signature mismatch, structural corruption, and expiry all surface as
    /// `AuthError::Unauthorized`; this function never panics on malformed
    /// input. A token is expired from the exact expiry instant onwards.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthorized` if the token is invalid or expired.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        // Expiry is checked manually against the caller's `now` below, so
        // the library's own clock must stay out of the decision.
        let mut validation = Validation::default();
        validation.validate_exp = false;

        let token_data: TokenData<Claims> = decode(token, &self.decoding_key, &validation)
            .map_err(|e| AuthError::Unauthorized(format!("Invalid token: {e}")))?;

        if now.timestamp() >= token_data.claims.exp {
            return Err(AuthError::Unauthorized("Token expired".to_string()));
        }

        Ok(token_data.claims)
    }

    /// Extract token from Authorization header.
    ///
    /// Expects format: "Bearer <token>"
    #[must_use]
    pub fn extract_from_header(header: &str) -> Option<&str> {
        header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
    }
}

impl std::fmt::Debug for JwtManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtManager")
            .field("validity", &self.validity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const VALIDITY: Duration = Duration::from_secs(24 * 3600);

    fn create_manager() -> JwtManager {
        let secret = JwtManager::generate_secret();
        JwtManager::new(&secret, VALIDITY)
    }

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_generate_secret() {
        let secret1 = JwtManager::generate_secret();
        let secret2 = JwtManager::generate_secret();
        assert_ne!(secret1, secret2);
        assert_eq!(secret1.len(), 32);
    }

    #[test]
    fn test_issue_and_verify_round_trip() {
        let manager = create_manager();
        let (token, expires_at) = manager
            .issue(&UserId::new("user_123"), &[Role::User], t0())
            .unwrap();

        assert!(!token.is_empty());
        assert_eq!(expires_at, t0() + chrono::Duration::hours(24));

        let claims = manager.verify(&token, t0()).unwrap();
        assert_eq!(claims.sub, "user_123");
        assert_eq!(claims.roles, vec![Role::User]);
        assert_eq!(claims.iat, t0().timestamp());
    }

    #[test]
    fn test_verify_within_window() {
        let manager = create_manager();
        let (token, _) = manager
            .issue(&UserId::new("user_123"), &[Role::User], t0())
            .unwrap();

        let just_before_expiry = t0() + chrono::Duration::hours(24) - chrono::Duration::seconds(1);
        assert!(manager.verify(&token, just_before_expiry).is_ok());
    }

    #[test]
    fn test_verify_fails_at_exact_expiry_instant() {
        let manager = create_manager();
        let (token, expires_at) = manager
            .issue(&UserId::new("user_123"), &[Role::User], t0())
            .unwrap();

        let result = manager.verify(&token, expires_at);
        assert!(matches!(result, Err(AuthError::Unauthorized(_))));
    }

    #[test]
    fn test_verify_fails_after_expiry() {
        let manager = create_manager();
        let (token, _) = manager
            .issue(&UserId::new("user_123"), &[Role::User], t0())
            .unwrap();

        let day_later = t0() + chrono::Duration::hours(25);
        assert!(manager.verify(&token, day_later).is_err());
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let manager = create_manager();
        assert!(manager.verify("invalid.token.here", t0()).is_err());
        assert!(manager.verify("", t0()).is_err());
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let manager = create_manager();
        let other = create_manager();

        let (token, _) = manager
            .issue(&UserId::new("user_123"), &[Role::User], t0())
            .unwrap();
        assert!(other.verify(&token, t0()).is_err());
    }

    #[test]
    fn test_verify_rejects_tampered_token() {
        let manager = create_manager();
        let (token, _) = manager
            .issue(&UserId::new("user_123"), &[Role::User], t0())
            .unwrap();

        let mut tampered = token.clone();
        tampered.replace_range(0..1, if token.starts_with('A') { "B" } else { "A" });
        assert!(manager.verify(&tampered, t0()).is_err());
    }

    #[test]
    fn test_roles_snapshot_in_claims() {
        let manager = create_manager();
        let (token, _) = manager
            .issue(&UserId::new("admin_1"), &[Role::User, Role::Admin], t0())
            .unwrap();

        let claims = manager.verify(&token, t0()).unwrap();
        assert_eq!(claims.roles, vec![Role::User, Role::Admin]);
    }

    #[test]
    fn test_hex_secret() {
        let hex_secret = JwtManager::generate_hex_secret();
        assert_eq!(hex_secret.len(), 64); // 32 bytes = 64 hex chars

        let manager = JwtManager::from_hex_secret(&hex_secret, VALIDITY).unwrap();
        let (token, _) = manager
            .issue(&UserId::new("user_123"), &[Role::User], t0())
            .unwrap();
        assert!(manager.verify(&token, t0()).is_ok());
    }
}
