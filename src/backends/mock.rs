//! Mock vault for testing.
//!
//! This vault keeps secrets, versions and staging labels in memory and follows
//! the label-move rules of a real secrets service, with error injection for
//! simulating failures.

use crate::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const NUMBERS: &str = "0123456789";
const PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

#[derive(Debug, Clone, Default)]
struct MockVersion {
    value: Option<String>,
    stages: BTreeSet<Stage>,
}

#[derive(Debug, Clone, Default)]
struct MockSecret {
    rotation_enabled: Option<bool>,
    versions: HashMap<String, MockVersion>,
    last_rotated: Option<DateTime<Utc>>,
}

/// In-memory vault for testing.
///
/// # Example
///
/// ```
/// use dbrotor::backends::mock::MockVault;
/// use dbrotor::{SecretsVault, Stage};
///
/// #[tokio::main]
/// async fn main() -> dbrotor::Result<()> {
///     let vault = MockVault::new();
///     vault.seed_version("db", "v1", r#"{"password":"old"}"#, &[Stage::Current]).await;
///
///     let token = vault.begin_rotation("db").await;
///     let meta = vault.describe_secret("db").await?;
///     assert!(meta.has_stage(&token, Stage::Pending));
///
///     Ok(())
/// }
/// ```
pub struct MockVault {
    secrets: Arc<RwLock<HashMap<String, MockSecret>>>,
    password_requests: AtomicUsize,

    /// Error to return from `describe_secret()`
    pub describe_error: Option<RotationError>,
    /// Error to return from `get_secret_value()`
    pub get_error: Option<RotationError>,
    /// Error to return from `put_secret_value()`
    pub put_error: Option<RotationError>,
    /// Error to return from `update_secret_version_stage()`
    pub stage_error: Option<RotationError>,
}

impl MockVault {
    /// Creates an empty vault.
    pub fn new() -> Self {
        Self {
            secrets: Arc::new(RwLock::new(HashMap::new())),
            password_requests: AtomicUsize::new(0),
            describe_error: None,
            get_error: None,
            put_error: None,
            stage_error: None,
        }
    }

    /// Stores a version with the given payload and labels.
    ///
    /// Labels are taken away from any other version that holds them.
    pub async fn seed_version(
        &self,
        secret_id: &str,
        token: &str,
        payload: impl Into<String>,
        stages: &[Stage],
    ) {
        let mut secrets = self.secrets.write().await;
        let secret = secrets.entry(secret_id.to_string()).or_default();
        for stage in stages {
            for version in secret.versions.values_mut() {
                version.stages.remove(stage);
            }
        }
        let version = secret.versions.entry(token.to_string()).or_default();
        version.value = Some(payload.into());
        version.stages.extend(stages.iter().copied());
    }

    /// Starts a rotation the way the service does: a fresh version token is
    /// labeled pending before any payload exists for it.
    pub async fn begin_rotation(&self, secret_id: &str) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        self.label_only(secret_id, &token, Stage::Pending).await;
        token
    }

    /// Attaches `stage` to `token` without a payload, creating the version if needed.
    pub async fn label_only(&self, secret_id: &str, token: &str, stage: Stage) {
        let mut secrets = self.secrets.write().await;
        let secret = secrets.entry(secret_id.to_string()).or_default();
        for version in secret.versions.values_mut() {
            version.stages.remove(&stage);
        }
        secret
            .versions
            .entry(token.to_string())
            .or_default()
            .stages
            .insert(stage);
    }

    /// Sets the rotation-enabled flag reported by `describe_secret()`.
    pub async fn set_rotation_enabled(&self, secret_id: &str, enabled: Option<bool>) {
        let mut secrets = self.secrets.write().await;
        secrets.entry(secret_id.to_string()).or_default().rotation_enabled = enabled;
    }

    /// Payload stored under `token`, if any.
    pub async fn payload(&self, secret_id: &str, token: &str) -> Option<String> {
        let secrets = self.secrets.read().await;
        secrets
            .get(secret_id)
            .and_then(|s| s.versions.get(token))
            .and_then(|v| v.value.clone())
    }

    /// Labels currently on `token`.
    pub async fn stages(&self, secret_id: &str, token: &str) -> BTreeSet<Stage> {
        let secrets = self.secrets.read().await;
        secrets
            .get(secret_id)
            .and_then(|s| s.versions.get(token))
            .map(|v| v.stages.clone())
            .unwrap_or_default()
    }

    /// Number of versions holding `stage`.
    pub async fn count_with(&self, secret_id: &str, stage: Stage) -> usize {
        let secrets = self.secrets.read().await;
        secrets
            .get(secret_id)
            .map(|s| s.versions.values().filter(|v| v.stages.contains(&stage)).count())
            .unwrap_or(0)
    }

    /// How many passwords have been generated.
    pub fn password_requests(&self) -> usize {
        self.password_requests.load(Ordering::SeqCst)
    }
}

impl Default for MockVault {
    fn default() -> Self {
        Self::new()
    }
}

fn injected(err: &Option<RotationError>) -> Result<()> {
    match err {
        Some(err) => Err(RotationError::Other(anyhow::anyhow!("{}", err))),
        None => Ok(()),
    }
}

#[async_trait]
impl SecretsVault for MockVault {
    fn name(&self) -> &str {
        "mock"
    }

    async fn describe_secret(&self, secret_id: &str) -> Result<SecretMetadata> {
        injected(&self.describe_error)?;

        let secrets = self.secrets.read().await;
        let secret = secrets
            .get(secret_id)
            .ok_or_else(|| RotationError::NotFound(secret_id.to_string()))?;

        Ok(SecretMetadata {
            rotation_enabled: secret.rotation_enabled,
            version_stages: secret
                .versions
                .iter()
                .filter(|(_, v)| !v.stages.is_empty())
                .map(|(token, v)| (token.clone(), v.stages.clone()))
                .collect(),
            last_rotated: secret.last_rotated,
        })
    }

    async fn get_secret_value(
        &self,
        secret_id: &str,
        stage: Stage,
        token: Option<&str>,
    ) -> Result<String> {
        injected(&self.get_error)?;

        let secrets = self.secrets.read().await;
        let not_found = || RotationError::NotFound(format!("{} {}", secret_id, stage));
        let secret = secrets.get(secret_id).ok_or_else(not_found)?;

        secret
            .versions
            .iter()
            .filter(|(t, _)| token.map_or(true, |want| want == t.as_str()))
            .find(|(_, v)| v.stages.contains(&stage))
            .and_then(|(_, v)| v.value.clone())
            .ok_or_else(not_found)
    }

    async fn put_secret_value(
        &self,
        secret_id: &str,
        token: &str,
        secret_string: &str,
        stages: &[Stage],
    ) -> Result<()> {
        injected(&self.put_error)?;

        let mut secrets = self.secrets.write().await;
        let secret = secrets
            .get_mut(secret_id)
            .ok_or_else(|| RotationError::NotFound(secret_id.to_string()))?;

        if let Some(existing) = secret.versions.get(token).and_then(|v| v.value.as_deref()) {
            if existing != secret_string {
                return Err(RotationError::Other(anyhow::anyhow!(
                    "version {} already exists with different content",
                    token
                )));
            }
        }

        for stage in stages {
            for version in secret.versions.values_mut() {
                version.stages.remove(stage);
            }
        }
        let version = secret.versions.entry(token.to_string()).or_default();
        version.value = Some(secret_string.to_string());
        version.stages.extend(stages.iter().copied());
        Ok(())
    }

    async fn update_secret_version_stage(
        &self,
        secret_id: &str,
        stage: Stage,
        move_to: Option<&str>,
        remove_from: Option<&str>,
    ) -> Result<()> {
        injected(&self.stage_error)?;

        let mut secrets = self.secrets.write().await;
        let secret = secrets
            .get_mut(secret_id)
            .ok_or_else(|| RotationError::NotFound(secret_id.to_string()))?;

        let holder = secret
            .versions
            .iter()
            .find(|(_, v)| v.stages.contains(&stage))
            .map(|(t, _)| t.clone());

        if let Some(from) = remove_from {
            if holder.as_deref() != Some(from) {
                return Err(RotationError::Other(anyhow::anyhow!(
                    "version {} does not hold {}",
                    from,
                    stage
                )));
            }
        }

        if let Some(to) = move_to {
            if !secret.versions.contains_key(to) {
                return Err(RotationError::NotFound(format!("{} version {}", secret_id, to)));
            }
            if let Some(ref held) = holder {
                if remove_from.is_none() && held != to {
                    return Err(RotationError::Other(anyhow::anyhow!(
                        "{} is attached to {}; specify it to move the label",
                        stage,
                        held
                    )));
                }
            }
        }

        if let Some(from) = remove_from {
            if let Some(v) = secret.versions.get_mut(from) {
                v.stages.remove(&stage);
            }
        }

        if let Some(to) = move_to {
            if let Some(v) = secret.versions.get_mut(to) {
                v.stages.insert(stage);
            }

            // The service relabels the outgoing current version as previous.
            if stage == Stage::Current {
                if let Some(old) = holder.filter(|h| h != to) {
                    secret.last_rotated = Some(Utc::now());
                    for version in secret.versions.values_mut() {
                        version.stages.remove(&Stage::Previous);
                    }
                    if let Some(v) = secret.versions.get_mut(&old) {
                        v.stages.insert(Stage::Previous);
                    }
                }
            }
        }

        Ok(())
    }

    async fn get_random_password(&self, policy: &PasswordPolicy) -> Result<String> {
        self.password_requests.fetch_add(1, Ordering::SeqCst);

        let classes: Vec<Vec<char>> = [
            (LOWERCASE, policy.exclude_lowercase),
            (UPPERCASE, policy.exclude_uppercase),
            (NUMBERS, policy.exclude_numbers),
            (PUNCTUATION, policy.exclude_punctuation),
        ]
        .into_iter()
        .filter(|(_, excluded)| !excluded)
        .map(|(chars, _)| {
            chars
                .chars()
                .filter(|c| !policy.exclude_characters.contains(*c))
                .collect::<Vec<char>>()
        })
        .filter(|chars| !chars.is_empty())
        .collect();

        let length = policy.length as usize;
        if classes.is_empty() || (policy.require_each_included_type && length < classes.len()) {
            return Err(RotationError::Config(
                "password policy leaves no characters to generate from".to_string(),
            ));
        }

        let mut rng = rand::thread_rng();
        let mut password: Vec<char> = Vec::with_capacity(length);
        if policy.require_each_included_type {
            for class in &classes {
                password.push(class[rng.gen_range(0..class.len())]);
            }
        }
        let pool: Vec<char> = classes.concat();
        while password.len() < length {
            password.push(pool[rng.gen_range(0..pool.len())]);
        }
        password.shuffle(&mut rng);

        Ok(password.into_iter().collect())
    }
}
