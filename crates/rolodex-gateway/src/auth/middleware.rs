//! Per-request authentication guard.
//!
//! Every protected dispatch goes through [`AuthState::authenticate`]: the
//! bearer token is verified, then the subject is re-resolved from the user
//! store. The resulting [`Identity`] is the only trusted identity source
//! for the rest of the request; role claims inside the token are never
//! used for authorization decisions.

use std::path::Path;

use chrono::{DateTime, Utc};

use rolodex_core::UserId;

use super::AuthError;
use super::config::AuthConfig;
use super::jwt::JwtManager;
use super::users::{Role, UserStore};

/// Identity resolved from a verified token and the live user record.
#[derive(Debug, Clone)]
pub struct Identity {
    /// The authenticated user's ID.
    pub id: UserId,
    /// Roles currently held, read from the store at request time.
    pub roles: Vec<Role>,
}

impl Identity {
    /// Check whether the identity holds a given role.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Check if the identity is an admin.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }
}

/// Shared authentication state.
pub struct AuthState {
    /// Auth configuration.
    pub config: AuthConfig,
    /// JWT manager.
    pub jwt: JwtManager,
    /// User store.
    pub users: UserStore,
}

impl AuthState {
    /// Create a new auth state.
    #[must_use]
    pub fn new(config: AuthConfig, jwt: JwtManager, users: UserStore) -> Self {
        Self { config, jwt, users }
    }

    /// Initialize auth state, auto-generating a JWT secret if needed.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be opened or the secret is invalid.
    pub fn initialize(mut config: AuthConfig, data_dir: &Path) -> Result<Self, AuthError> {
        let users = UserStore::open(data_dir)?;

        let jwt_secret = match &config.jwt_secret {
            Some(secret) => secret.clone(),
            None => {
                let secret = JwtManager::generate_hex_secret();
                config.jwt_secret = Some(secret.clone());
                tracing::info!("Generated new JWT secret");
                secret
            }
        };

        let jwt = JwtManager::from_hex_secret(&jwt_secret, config.token_expiry())?;

        Ok(Self::new(config, jwt, users))
    }

    /// Resolve a bearer token into a live identity.
    ///
    /// A missing token, a token that fails verification at `now`, and a
    /// token whose subject no longer exists all reject identically with
    /// `AuthError::Unauthorized`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthorized` on any of the rejections above, or
    /// `AuthError::Storage` if the user lookup fails.
    pub fn authenticate(
        &self,
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Identity, AuthError> {
        let token =
            token.ok_or_else(|| AuthError::Unauthorized("Authentication required".to_string()))?;

        let claims = self.jwt.verify(token, now)?;

        let user = self
            .users
            .find_by_id(&UserId::new(claims.sub.clone()))?
            .ok_or_else(|| AuthError::Unauthorized("Unknown subject".to_string()))?;

        Ok(Identity {
            id: user.id,
            roles: user.roles,
        })
    }

    /// Enforce the declared required-role set for a method.
    ///
    /// Methods absent from the role-requirements table pass with any
    /// authenticated identity; listed methods require a non-empty
    /// intersection between the declared set and the caller's roles.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Forbidden` if the intersection is empty.
    pub fn authorize_method(&self, method: &str, identity: &Identity) -> Result<(), AuthError> {
        let Some(required) = self.config.required_roles(method) else {
            return Ok(());
        };

        if required.iter().any(|role| identity.has_role(*role)) {
            Ok(())
        } else {
            Err(AuthError::Forbidden(format!(
                "{method} requires one of: {}",
                required
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            )))
        }
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("config", &self.config)
            .field("user_count", &self.users.count())
            .finish_non_exhaustive()
    }
}
