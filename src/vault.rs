//! Vault client trait.
//!
//! This module defines the [`SecretsVault`] trait, the only way the rotation
//! steps talk to the secrets service. Staging-label moves performed through it
//! are the sole serialization point between concurrent rotation attempts.

use crate::{PasswordPolicy, Result, SecretMetadata, Stage};
use async_trait::async_trait;

/// Secrets service holding versioned credential payloads and staging labels.
///
/// All implementations must be `Send + Sync` so a client can be shared across
/// async tasks.
///
/// # Implementations
///
/// - **SDK-based**: AWS Secrets Manager (`aws` feature)
/// - **Testing**: Mock vault with error injection (`mock` feature)
#[async_trait]
pub trait SecretsVault: Send + Sync {
    /// Returns the vault name (e.g., "awssecrets", "mock").
    fn name(&self) -> &str;

    /// Fetches rotation metadata and the version-to-label map.
    ///
    /// # Errors
    ///
    /// - [`RotationError::NotFound`](crate::RotationError::NotFound):
    ///   Secret does not exist
    async fn describe_secret(&self, secret_id: &str) -> Result<SecretMetadata>;

    /// Fetches the payload of the version labeled `stage`.
    ///
    /// When `token` is given, the version must also be that exact token.
    ///
    /// # Errors
    ///
    /// - [`RotationError::NotFound`](crate::RotationError::NotFound):
    ///   No version matches `(secret_id, stage[, token])`
    async fn get_secret_value(
        &self,
        secret_id: &str,
        stage: Stage,
        token: Option<&str>,
    ) -> Result<String>;

    /// Stores `secret_string` as version `token` carrying `stages`.
    async fn put_secret_value(
        &self,
        secret_id: &str,
        token: &str,
        secret_string: &str,
        stages: &[Stage],
    ) -> Result<()>;

    /// Moves `stage` onto `move_to` and/or removes it from `remove_from`.
    ///
    /// The move is atomic on the vault side.
    async fn update_secret_version_stage(
        &self,
        secret_id: &str,
        stage: Stage,
        move_to: Option<&str>,
        remove_from: Option<&str>,
    ) -> Result<()>;

    /// Generates a random password according to `policy`.
    async fn get_random_password(&self, policy: &PasswordPolicy) -> Result<String>;
}
