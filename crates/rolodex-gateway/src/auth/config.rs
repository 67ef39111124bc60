//! Authentication configuration.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::users::Role;

/// Default session-token validity in hours.
const DEFAULT_TOKEN_EXPIRY_HOURS: u64 = 24;

/// Authentication configuration.
///
/// Built once at startup and never mutated afterwards; the guard reads the
/// public-method list and the role-requirements table on every dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// JWT secret (hex-encoded). Auto-generated if not set.
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Session-token validity in hours.
    #[serde(default = "default_token_expiry")]
    pub token_expiry_hours: u64,

    /// Methods that don't require authentication.
    #[serde(default = "default_public_methods")]
    pub public_methods: Vec<String>,

    /// Roles required per method, beyond being authenticated.
    ///
    /// A method absent from this table only requires a valid identity. A
    /// listed method additionally requires the caller's resolved role set
    /// to intersect the declared one.
    #[serde(default = "default_role_requirements")]
    pub role_requirements: HashMap<String, Vec<Role>>,
}

fn default_token_expiry() -> u64 {
    DEFAULT_TOKEN_EXPIRY_HOURS
}

fn default_public_methods() -> Vec<String> {
    vec![
        "auth.signup".to_string(),
        "auth.login".to_string(),
        "system.health".to_string(),
    ]
}

fn default_role_requirements() -> HashMap<String, Vec<Role>> {
    HashMap::from([
        ("users.list".to_string(), vec![Role::Admin]),
        ("users.delete".to_string(), vec![Role::Admin]),
    ])
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_expiry_hours: default_token_expiry(),
            public_methods: default_public_methods(),
            role_requirements: default_role_requirements(),
        }
    }
}

impl AuthConfig {
    /// Create a new auth config builder.
    #[must_use]
    pub fn builder() -> AuthConfigBuilder {
        AuthConfigBuilder::default()
    }

    /// Get token validity as Duration.
    #[must_use]
    pub fn token_expiry(&self) -> Duration {
        Duration::from_secs(self.token_expiry_hours * 3600)
    }

    /// Check if a method is public (doesn't require auth).
    #[must_use]
    pub fn is_public_method(&self, method: &str) -> bool {
        self.public_methods.iter().any(|m| m == method)
    }

    /// Get the declared required-role set for a method, if any.
    #[must_use]
    pub fn required_roles(&self, method: &str) -> Option<&[Role]> {
        self.role_requirements.get(method).map(Vec::as_slice)
    }

    /// Load config from environment variables (overrides).
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(secret) = std::env::var("ROLODEX_JWT_SECRET") {
            self.jwt_secret = Some(secret);
        }

        if let Some(hours) = std::env::var("ROLODEX_TOKEN_EXPIRY_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.token_expiry_hours = hours;
        }

        self
    }
}

/// Builder for `AuthConfig`.
#[derive(Debug, Default)]
pub struct AuthConfigBuilder {
    config: AuthConfig,
}

impl AuthConfigBuilder {
    /// Set the JWT secret.
    #[must_use]
    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.jwt_secret = Some(secret.into());
        self
    }

    /// Set session-token validity in hours.
    #[must_use]
    pub fn token_expiry_hours(mut self, hours: u64) -> Self {
        self.config.token_expiry_hours = hours;
        self
    }

    /// Add a public method (doesn't require auth).
    #[must_use]
    pub fn public_method(mut self, method: impl Into<String>) -> Self {
        self.config.public_methods.push(method.into());
        self
    }

    /// Declare the required-role set for a method.
    #[must_use]
    pub fn require_roles(mut self, method: impl Into<String>, roles: Vec<Role>) -> Self {
        self.config.role_requirements.insert(method.into(), roles);
        self
    }

    /// Build the config.
    #[must_use]
    pub fn build(self) -> AuthConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AuthConfig::default();
        assert!(config.jwt_secret.is_none());
        assert_eq!(config.token_expiry_hours, 24);
        assert_eq!(config.token_expiry(), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn test_public_methods() {
        let config = AuthConfig::default();
        assert!(config.is_public_method("auth.signup"));
        assert!(config.is_public_method("auth.login"));
        assert!(config.is_public_method("system.health"));
        assert!(!config.is_public_method("companies.create"));
    }

    #[test]
    fn test_role_requirements_table() {
        let config = AuthConfig::default();
        assert_eq!(config.required_roles("users.list"), Some(&[Role::Admin][..]));
        assert_eq!(config.required_roles("users.delete"), Some(&[Role::Admin][..]));
        assert!(config.required_roles("companies.get").is_none());
    }

    #[test]
    fn test_builder() {
        let config = AuthConfig::builder()
            .token_expiry_hours(12)
            .public_method("system.version")
            .require_roles("companies.audit", vec![Role::Admin])
            .build();

        assert_eq!(config.token_expiry_hours, 12);
        assert!(config.is_public_method("system.version"));
        assert_eq!(
            config.required_roles("companies.audit"),
            Some(&[Role::Admin][..])
        );
    }
}
