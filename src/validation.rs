//! Input validation for invocations and credential slots.

use crate::{CredentialRecord, Result, RotationError};

/// Maximum allowed length for secret identifiers and version tokens.
const MAX_IDENTIFIER_LENGTH: usize = 2048;

/// Validates a secret identifier or version token from an invocation.
///
/// Rejects:
/// - Empty or whitespace-only values
/// - Excessive length (>2048 characters)
/// - Null bytes and other control characters
///
/// # Errors
///
/// Returns [`RotationError::InvalidSecret`] naming `field` if validation fails.
///
/// # Example
///
/// ```
/// use dbrotor::validation::validate_identifier;
///
/// assert!(validate_identifier("SecretId", "arn:aws:secretsmanager:us-east-1:123:secret:db-AbCd").is_ok());
/// assert!(validate_identifier("ClientRequestToken", "").is_err());
/// assert!(validate_identifier("SecretId", "db\nsecret").is_err());
/// ```
pub fn validate_identifier(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RotationError::InvalidSecret(format!("{} cannot be empty", field)));
    }

    if value.len() > MAX_IDENTIFIER_LENGTH {
        return Err(RotationError::InvalidSecret(format!(
            "{} exceeds maximum length of {} characters",
            field, MAX_IDENTIFIER_LENGTH
        )));
    }

    if value.chars().any(char::is_control) {
        return Err(RotationError::InvalidSecret(format!(
            "{} contains control characters",
            field
        )));
    }

    Ok(())
}

/// Ensures `other` names the same account as `pending`.
///
/// `slot` names the compared credential ("current" or "previous") in the
/// error, so a mismatch can be traced to the secret version at fault.
///
/// # Errors
///
/// Returns [`RotationError::TargetMismatch`] on a differing username or host.
pub fn ensure_same_target(
    pending: &CredentialRecord,
    other: &CredentialRecord,
    slot: &'static str,
) -> Result<()> {
    if pending.username != other.username {
        return Err(RotationError::TargetMismatch {
            field: "username",
            slot,
            pending: pending.username.clone(),
            other: other.username.clone(),
        });
    }

    if pending.host != other.host {
        return Err(RotationError::TargetMismatch {
            field: "host",
            slot,
            pending: pending.host.clone(),
            other: other.host.clone(),
        });
    }

    Ok(())
}
