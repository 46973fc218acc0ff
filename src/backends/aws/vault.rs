//! AWS Secrets Manager vault implementation.

use crate::{
    PasswordPolicy, Result, RotationConfig, RotationError, SecretMetadata, SecretsVault, Stage,
};
use async_trait::async_trait;
use aws_sdk_secretsmanager::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_secretsmanager::Client;
use tracing::debug;

/// AWS Secrets Manager vault.
pub struct AwsVault {
    client: Client,
}

impl AwsVault {
    /// Builds a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RotationError::Config`] if no endpoint is configured.
    pub async fn connect(config: &RotationConfig) -> Result<Self> {
        let endpoint = config.require_endpoint()?;

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .endpoint_url(endpoint)
            .load()
            .await;

        debug!(endpoint = %endpoint, region = %config.region, "AWS Secrets Manager client configured");

        Ok(Self::from_client(Client::new(&sdk_config)))
    }

    /// Wraps an already configured SDK client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn sdk_error<E, R>(err: SdkError<E, R>, what: impl Into<String>) -> RotationError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    if err.code() == Some("ResourceNotFoundException") {
        RotationError::NotFound(what.into())
    } else {
        RotationError::Other(anyhow::anyhow!("AWS error: {}", DisplayErrorContext(&err)))
    }
}

fn to_chrono(d: &aws_sdk_secretsmanager::primitives::DateTime) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::from_timestamp(d.secs(), d.subsec_nanos())
}

#[async_trait]
impl SecretsVault for AwsVault {
    fn name(&self) -> &str {
        "awssecrets"
    }

    async fn describe_secret(&self, secret_id: &str) -> Result<SecretMetadata> {
        let response = self
            .client
            .describe_secret()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|e| RotationError::vault_op("describe", secret_id, sdk_error(e, secret_id)))?;

        let versions = response
            .version_ids_to_stages()
            .map(|m| m.iter().map(|(token, labels)| (token.clone(), labels.clone())).collect::<Vec<_>>())
            .unwrap_or_default();

        let mut metadata = SecretMetadata::from_raw(response.rotation_enabled(), versions);
        metadata.last_rotated = response.last_rotated_date().and_then(to_chrono);
        Ok(metadata)
    }

    async fn get_secret_value(
        &self,
        secret_id: &str,
        stage: Stage,
        token: Option<&str>,
    ) -> Result<String> {
        let response = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .version_stage(stage.as_str())
            .set_version_id(token.map(str::to_string))
            .send()
            .await
            .map_err(|e| {
                RotationError::vault_op("get", secret_id, sdk_error(e, format!("{} {}", secret_id, stage)))
            })?;

        response
            .secret_string()
            .map(str::to_string)
            .ok_or_else(|| RotationError::InvalidSecret(format!("{} {} has no string value", secret_id, stage)))
    }

    async fn put_secret_value(
        &self,
        secret_id: &str,
        token: &str,
        secret_string: &str,
        stages: &[Stage],
    ) -> Result<()> {
        self.client
            .put_secret_value()
            .secret_id(secret_id)
            .client_request_token(token)
            .secret_string(secret_string)
            .set_version_stages(Some(stages.iter().map(|s| s.as_str().to_string()).collect()))
            .send()
            .await
            .map_err(|e| RotationError::vault_op("put", secret_id, sdk_error(e, secret_id)))?;

        Ok(())
    }

    async fn update_secret_version_stage(
        &self,
        secret_id: &str,
        stage: Stage,
        move_to: Option<&str>,
        remove_from: Option<&str>,
    ) -> Result<()> {
        self.client
            .update_secret_version_stage()
            .secret_id(secret_id)
            .version_stage(stage.as_str())
            .set_move_to_version_id(move_to.map(str::to_string))
            .set_remove_from_version_id(remove_from.map(str::to_string))
            .send()
            .await
            .map_err(|e| RotationError::vault_op("stage", secret_id, sdk_error(e, secret_id)))?;

        Ok(())
    }

    async fn get_random_password(&self, policy: &PasswordPolicy) -> Result<String> {
        let response = self
            .client
            .get_random_password()
            .exclude_characters(&policy.exclude_characters)
            .password_length(i64::from(policy.length))
            .exclude_numbers(policy.exclude_numbers)
            .exclude_punctuation(policy.exclude_punctuation)
            .exclude_uppercase(policy.exclude_uppercase)
            .exclude_lowercase(policy.exclude_lowercase)
            .require_each_included_type(policy.require_each_included_type)
            .send()
            .await
            .map_err(|e| RotationError::vault_op("password", "-", sdk_error(e, "random password")))?;

        response
            .random_password()
            .map(str::to_string)
            .ok_or_else(|| RotationError::Other(anyhow::anyhow!("vault returned no random password")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_chrono() {
        let d = aws_sdk_secretsmanager::primitives::DateTime::from_secs(1_700_000_000);
        let converted = to_chrono(&d).unwrap();
        assert_eq!(converted.timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn test_connect_requires_endpoint() {
        let result = AwsVault::connect(&RotationConfig::default()).await;
        assert!(matches!(result, Err(RotationError::Config(_))));
    }
}
