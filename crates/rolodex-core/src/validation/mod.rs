//! Input validation and sanitization.
//!
//! Defense-in-depth: validate all external inputs before processing.

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Validation error types.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Input exceeds maximum allowed length.
    #[error("{field} exceeds maximum length ({max} bytes, got {actual})")]
    TooLong {
        /// Which input failed.
        field: &'static str,
        /// Maximum allowed length.
        max: usize,
        /// Actual input length.
        actual: usize,
    },

    /// Input is empty after trimming.
    #[error("{0} must not be empty")]
    Empty(&'static str),

    /// Email address is structurally invalid.
    #[error("Invalid email address")]
    InvalidEmail,

    /// Disallowed characters in input.
    #[error("Disallowed characters in {0}")]
    DisallowedChars(&'static str),
}

/// Size limits per input type.
pub mod limits {
    /// Maximum email address length.
    pub const MAX_EMAIL_LENGTH: usize = 255;

    /// Maximum nickname length.
    pub const MAX_NICKNAME_LENGTH: usize = 50;

    /// Maximum length for short profile fields (names, position, phone).
    pub const MAX_FIELD_LENGTH: usize = 255;

    /// Maximum length for free-text fields (descriptions).
    pub const MAX_TEXT_LENGTH: usize = 4096;
}

/// Normalize an email address: trim, lowercase, NFKC.
///
/// Normalization happens before any uniqueness check or lookup so that
/// `A@x.com` and `a@x.com` resolve to the same account.
#[must_use]
pub fn normalize_email(input: &str) -> String {
    input.trim().to_lowercase().nfkc().collect()
}

/// Validate an email address and return its normalized form.
///
/// Structural check only (single `@`, non-empty local part, dotted domain);
/// deliverability is not this layer's concern.
///
/// # Errors
///
/// Returns `ValidationError::InvalidEmail` on malformed input or
/// `ValidationError::TooLong` past the length limit.
pub fn validate_email(input: &str) -> Result<String, ValidationError> {
    let email = normalize_email(input);

    if email.len() > limits::MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong {
            field: "email",
            max: limits::MAX_EMAIL_LENGTH,
            actual: email.len(),
        });
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::InvalidEmail);
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ValidationError::InvalidEmail);
    }

    // Domain must have at least one label separator and no edge dots.
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(ValidationError::InvalidEmail);
    }

    if email.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(ValidationError::DisallowedChars("email"));
    }

    Ok(email)
}

/// Validate a nickname and return its trimmed, normalized form.
///
/// # Errors
///
/// Returns error if empty, too long, or containing control characters.
pub fn validate_nickname(input: &str) -> Result<String, ValidationError> {
    let nickname: String = input.trim().nfkc().collect();

    if nickname.is_empty() {
        return Err(ValidationError::Empty("nickname"));
    }

    if nickname.len() > limits::MAX_NICKNAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: "nickname",
            max: limits::MAX_NICKNAME_LENGTH,
            actual: nickname.len(),
        });
    }

    if nickname.chars().any(char::is_control) {
        return Err(ValidationError::DisallowedChars("nickname"));
    }

    Ok(nickname)
}

/// Validate and sanitize a free-text field.
///
/// Performs:
/// 1. Length check (prevent memory exhaustion)
/// 2. Strip null bytes and control chars (except newlines/tabs)
/// 3. Unicode normalization (NFKC - prevent homograph attacks)
///
/// # Errors
///
/// Returns `ValidationError::TooLong` if input exceeds `max_len`.
pub fn validate_text(
    field: &'static str,
    input: &str,
    max_len: usize,
) -> Result<String, ValidationError> {
    if input.len() > max_len {
        return Err(ValidationError::TooLong {
            field,
            max: max_len,
            actual: input.len(),
        });
    }

    let sanitized: String = input
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t' || *c == '\r')
        .collect();

    let normalized: String = sanitized.nfkc().collect();

    Ok(normalized)
}
