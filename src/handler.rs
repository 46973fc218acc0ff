//! Invocation payloads and the step dispatcher.

use crate::validation::validate_identifier;
use crate::{Result, RotationError, Rotator, Stage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{error, info, info_span, Instrument};

/// One rotation callback from the secrets service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationEvent {
    /// Secret ARN or name.
    #[serde(rename = "SecretId")]
    pub secret_id: String,

    /// Version token being rotated.
    #[serde(rename = "ClientRequestToken")]
    pub token: String,

    /// Step name as sent by the service, e.g. `createSecret`.
    #[serde(rename = "Step")]
    pub step: String,
}

impl RotationEvent {
    /// Creates an event.
    pub fn new(secret_id: impl Into<String>, token: impl Into<String>, step: Step) -> Self {
        Self {
            secret_id: secret_id.into(),
            token: token.into(),
            step: step.to_string(),
        }
    }
}

/// Rotation steps, in the order the service invokes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Generate the pending payload.
    Create,
    /// Apply the pending password to the database.
    Set,
    /// Verify the pending credential.
    Test,
    /// Promote pending to current.
    Finish,
}

impl Step {
    /// Wire name of the step.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "createSecret",
            Self::Set => "setSecret",
            Self::Test => "testSecret",
            Self::Finish => "finishSecret",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "createSecret" => Ok(Self::Create),
            "setSecret" => Ok(Self::Set),
            "testSecret" => Ok(Self::Test),
            "finishSecret" => Ok(Self::Finish),
            _ => Err(()),
        }
    }
}

/// What a successful invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The version was already current; nothing ran.
    AlreadyCurrent,
    /// The step ran to completion.
    Completed(Step),
}

impl Rotator {
    /// Validates an invocation against the secret's staging state and runs
    /// the requested step.
    ///
    /// # Errors
    ///
    /// - [`RotationError::InvalidSecret`]: empty or malformed identifiers
    /// - [`RotationError::RotationDisabled`]: rotation is switched off
    /// - [`RotationError::UnknownVersion`]: the token carries no label
    /// - [`RotationError::NotPending`]: the token is not awaiting rotation
    /// - [`RotationError::InvalidStep`]: unrecognized step name
    /// - any error from the step itself
    ///
    /// # Example
    ///
    /// ```
    /// use dbrotor::backends::mock::MockVault;
    /// use dbrotor::drivers::mock::MockDriver;
    /// use dbrotor::{EngineKind, Outcome, RotationConfig, RotationEvent, Rotator, Stage, Step};
    /// use std::sync::Arc;
    ///
    /// #[tokio::main]
    /// async fn main() -> dbrotor::Result<()> {
    ///     let vault = Arc::new(MockVault::new());
    ///     let payload = r#"{"engine":"mariadb","host":"db1","username":"app","password":"pw"}"#;
    ///     vault.seed_version("db", "v1", payload, &[Stage::Current]).await;
    ///
    ///     let rotator = Rotator::new(
    ///         vault,
    ///         Arc::new(MockDriver::new()),
    ///         EngineKind::MariaDb.engine(),
    ///         RotationConfig::default(),
    ///     );
    ///
    ///     let outcome = rotator.handle(&RotationEvent::new("db", "v1", Step::Set)).await?;
    ///     assert_eq!(outcome, Outcome::AlreadyCurrent);
    ///     Ok(())
    /// }
    /// ```
    pub async fn handle(&self, event: &RotationEvent) -> Result<Outcome> {
        let span = info_span!(
            "rotation",
            secret_id = %event.secret_id,
            token = %event.token,
            step = %event.step,
            engine = %self.engine().kind(),
        );
        async {
            let result = self.dispatch(event).await;
            if let Err(e) = &result {
                error!(error = %e, kind = ?e.kind(), "Rotation step failed");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, event: &RotationEvent) -> Result<Outcome> {
        let secret_id = event.secret_id.as_str();
        let token = event.token.as_str();

        validate_identifier("SecretId", secret_id)?;
        validate_identifier("ClientRequestToken", token)?;

        let metadata = self.vault().describe_secret(secret_id).await?;

        if metadata.rotation_disabled() {
            return Err(RotationError::RotationDisabled {
                secret_id: secret_id.to_string(),
            });
        }

        let stages = metadata
            .stages_of(token)
            .filter(|stages| !stages.is_empty())
            .ok_or_else(|| RotationError::UnknownVersion {
                secret_id: secret_id.to_string(),
                token: token.to_string(),
            })?;

        if stages.contains(&Stage::Current) {
            info!("Secret version already set as AWSCURRENT");
            return Ok(Outcome::AlreadyCurrent);
        }

        if !stages.contains(&Stage::Pending) {
            return Err(RotationError::NotPending {
                secret_id: secret_id.to_string(),
                token: token.to_string(),
            });
        }

        let step: Step = event.step.parse().map_err(|_| RotationError::InvalidStep {
            secret_id: secret_id.to_string(),
            step: event.step.clone(),
        })?;

        match step {
            Step::Create => self.create_secret(secret_id, token).await?,
            Step::Set => self.set_secret(secret_id, token).await?,
            Step::Test => self.test_secret(secret_id, token).await?,
            Step::Finish => self.finish_secret(secret_id, token).await?,
        }

        Ok(Outcome::Completed(step))
    }
}
