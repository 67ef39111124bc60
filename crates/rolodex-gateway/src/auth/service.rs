//! Signup and signin orchestration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rolodex_core::types::UserId;
use rolodex_core::validation::{self, ValidationError, limits};

use super::AuthError;
use super::middleware::AuthState;
use super::password::{hash_password, verify_password};
use super::users::{PublicUser, Role, User, uuid_v4};

/// Parsed signup request body.
///
/// Profile fields are optional at signup and default to empty.
#[derive(Debug, Clone, Deserialize)]
pub struct SignupDraft {
    /// Email address (will be normalized).
    pub email: String,
    /// Nickname.
    pub nickname: String,
    /// Plaintext password; hashed before anything is persisted.
    pub password: String,
    /// First name.
    #[serde(default)]
    pub first_name: String,
    /// Last name.
    #[serde(default)]
    pub last_name: String,
    /// Phone number.
    #[serde(default)]
    pub phone_number: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Position or job title.
    #[serde(default)]
    pub position: String,
}

/// Issued session token.
#[derive(Debug, Clone, Serialize)]
pub struct SessionToken {
    /// Encoded JWT.
    pub token: String,
    /// When the token stops being accepted.
    pub expires_at: DateTime<Utc>,
}

impl AuthState {
    /// Register a new account.
    ///
    /// Existence is pre-checked by email first, then nickname, so a draft
    /// colliding on both reports the email conflict. The pre-check is a
    /// fast path only; the store's atomic uniqueness claim remains the
    /// final arbiter under concurrent signups and a lost race surfaces as
    /// `AuthError::Conflict`.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateEmail`/`DuplicateNickname` on a failed pre-check,
    /// `Conflict` on a lost storage race, or `Validation` for malformed
    /// input.
    pub fn signup(&self, draft: SignupDraft) -> Result<PublicUser, AuthError> {
        let email = validation::validate_email(&draft.email)?;
        let nickname = validation::validate_nickname(&draft.nickname)?;
        if draft.password.is_empty() {
            return Err(ValidationError::Empty("password").into());
        }

        let first_name =
            validation::validate_text("first_name", &draft.first_name, limits::MAX_FIELD_LENGTH)?;
        let last_name =
            validation::validate_text("last_name", &draft.last_name, limits::MAX_FIELD_LENGTH)?;
        let phone_number = validation::validate_text(
            "phone_number",
            &draft.phone_number,
            limits::MAX_FIELD_LENGTH,
        )?;
        let description =
            validation::validate_text("description", &draft.description, limits::MAX_TEXT_LENGTH)?;
        let position =
            validation::validate_text("position", &draft.position, limits::MAX_FIELD_LENGTH)?;

        if self.users.find_by_email(&email)?.is_some() {
            return Err(AuthError::DuplicateEmail);
        }

        if self.users.find_by_nickname(&nickname)?.is_some() {
            return Err(AuthError::DuplicateNickname);
        }

        let password_hash = hash_password(&draft.password)?;

        let now = Utc::now();
        let user = User {
            id: UserId::new(format!("user_{}", uuid_v4())),
            email,
            nickname,
            password_hash,
            roles: vec![Role::User],
            first_name,
            last_name,
            phone_number,
            description,
            position,
            created_at: now,
            updated_at: now,
        };

        self.users.create(&user)?;

        tracing::info!(user_id = %user.id, "Account created");

        Ok(user.to_public())
    }

    /// Authenticate credentials and issue a session token.
    ///
    /// Unknown email and wrong password fail with the same
    /// `AuthError::InvalidCredentials`; the response carries no signal
    /// about which one happened.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredentials` on any credential mismatch.
    pub fn signin(
        &self,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionToken, AuthError> {
        let email = validation::normalize_email(email);

        let Some(user) = self.users.find_by_email(&email)? else {
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(password, &user.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        let (token, expires_at) = self.jwt.issue(&user.id, &user.roles, now)?;

        tracing::debug!(user_id = %user.id, "Session token issued");

        Ok(SessionToken { token, expires_at })
    }
}
