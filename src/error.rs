//! Error types for rotation operations.

use thiserror::Error;

/// Result type alias using [`RotationError`].
pub type Result<T> = std::result::Result<T, RotationError>;

/// Coarse classification of a [`RotationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The referenced secret, stage or version does not exist.
    NotFound,
    /// The secret or invocation is not fit for rotation. Always fatal.
    Validation,
    /// No database session could be opened with any available credential.
    Connectivity,
    /// Vault transport, database statement, or other unexpected failure.
    Internal,
}

/// Errors that can occur while rotating a secret.
///
/// All errors implement `std::error::Error` and can be chained with `source()`.
/// None of the messages ever include a password value.
#[derive(Debug, Error)]
pub enum RotationError {
    /// Secret, stage or version was not found in the vault.
    #[error("secret not found: {0}")]
    NotFound(String),

    /// Rotation is switched off for the secret.
    #[error("secret {secret_id} is not enabled for rotation")]
    RotationDisabled {
        /// Secret identifier
        secret_id: String,
    },

    /// The version token carries no staging label at all.
    #[error("secret version {token} has no stage for rotation of secret {secret_id}")]
    UnknownVersion {
        /// Secret identifier
        secret_id: String,
        /// Version token
        token: String,
    },

    /// The version token is not staged as pending.
    #[error("secret version {token} not set as AWSPENDING for rotation of secret {secret_id}")]
    NotPending {
        /// Secret identifier
        secret_id: String,
        /// Version token
        token: String,
    },

    /// Step name is not one of the four rotation steps.
    #[error("invalid step parameter {step} for secret {secret_id}")]
    InvalidStep {
        /// Secret identifier
        secret_id: String,
        /// Step as received
        step: String,
    },

    /// A secret payload is malformed or targets the wrong engine.
    #[error("invalid secret payload: {0}")]
    InvalidSecret(String),

    /// Two credential slots disagree on the account being rotated.
    #[error("attempting to modify {field} {pending} other than {slot} {field} {other}")]
    TargetMismatch {
        /// `username` or `host`
        field: &'static str,
        /// Slot the pending value was compared against
        slot: &'static str,
        /// Value in the pending payload
        pending: String,
        /// Value in the compared payload
        other: String,
    },

    /// Neither pending, current nor previous credentials could log in.
    #[error("unable to log into database with previous, current, or pending secret of secret {0}")]
    NoUsableCredential(String),

    /// The pending credential could not log in during the test step.
    #[error("unable to log into database with pending secret of secret {0}")]
    PendingLoginFailed(String),

    /// A statement, commit or close failed on an open session.
    #[error("database error: {0}")]
    Database(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Vault operation failed with context.
    #[error("{operation} {secret_id}: {source}")]
    Vault {
        /// Vault operation (describe, get, put, stage, password)
        operation: String,
        /// Secret identifier
        secret_id: String,
        /// Underlying error
        #[source]
        source: Box<RotationError>,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error (catch-all).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RotationError {
    /// Wraps an underlying vault error with the operation and secret it concerned.
    ///
    /// # Example
    ///
    /// ```
    /// use dbrotor::RotationError;
    ///
    /// let err = RotationError::NotFound("AWSPENDING".to_string());
    /// let wrapped = RotationError::vault_op("get", "db-secret", err);
    ///
    /// assert_eq!(wrapped.to_string(), "get db-secret: secret not found: AWSPENDING");
    /// assert!(wrapped.is_not_found());
    /// ```
    pub fn vault_op(
        operation: impl Into<String>,
        secret_id: impl Into<String>,
        err: RotationError,
    ) -> Self {
        Self::Vault {
            operation: operation.into(),
            secret_id: secret_id.into(),
            source: Box::new(err),
        }
    }

    /// Returns true if this error, or the error it wraps, is a not-found condition.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Vault { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::RotationDisabled { .. }
            | Self::UnknownVersion { .. }
            | Self::NotPending { .. }
            | Self::InvalidStep { .. }
            | Self::InvalidSecret(_)
            | Self::TargetMismatch { .. }
            | Self::Config(_)
            | Self::Json(_) => ErrorKind::Validation,
            Self::NoUsableCredential(_) | Self::PendingLoginFailed(_) => ErrorKind::Connectivity,
            Self::Vault { source, .. } => source.kind(),
            Self::Database(_) | Self::Other(_) => ErrorKind::Internal,
        }
    }
}
