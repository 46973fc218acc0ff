//! The four rotation steps.
//!
//! A [`Rotator`] carries everything one invocation needs: the vault client,
//! the database driver, the engine capabilities, the permission probe and the
//! configuration. It holds no state between invocations; every step reads the
//! credential slots fresh from the vault.

use crate::connection_string;
use crate::database::{DatabaseDriver, DbSession, Statement};
use crate::probe::{PermissionProbe, SqlProbe};
use crate::resolver::ConnectionResolver;
use crate::validation::ensure_same_target;
use crate::{CredentialRecord, Engine, ErrorKind, Result, RotationConfig, RotationError, SecretsVault, Stage};
use std::sync::Arc;
use tracing::{info, warn};

/// Runs rotation steps for one database engine.
pub struct Rotator {
    vault: Arc<dyn SecretsVault>,
    driver: Arc<dyn DatabaseDriver>,
    engine: Arc<dyn Engine>,
    probe: Arc<dyn PermissionProbe>,
    config: RotationConfig,
}

impl Rotator {
    /// Creates a rotator using the default `SELECT NOW()` probe.
    pub fn new(
        vault: Arc<dyn SecretsVault>,
        driver: Arc<dyn DatabaseDriver>,
        engine: Arc<dyn Engine>,
        config: RotationConfig,
    ) -> Self {
        Self {
            vault,
            driver,
            engine,
            probe: Arc::new(SqlProbe::default()),
            config,
        }
    }

    /// Replaces the permission probe run by the test step.
    pub fn with_probe(mut self, probe: Arc<dyn PermissionProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Engine this rotator drives.
    pub fn engine(&self) -> &dyn Engine {
        &*self.engine
    }

    pub(crate) fn vault(&self) -> &dyn SecretsVault {
        &*self.vault
    }

    fn resolver(&self) -> ConnectionResolver<'_> {
        ConnectionResolver::new(&*self.driver, &*self.engine, self.config.connect_timeout)
    }

    async fn fetch(&self, secret_id: &str, stage: Stage, token: Option<&str>) -> Result<CredentialRecord> {
        let json = self.vault.get_secret_value(secret_id, stage, token).await?;
        CredentialRecord::parse(&json, self.engine.supported_tags()).map_err(|e| match e {
            RotationError::InvalidSecret(reason) => {
                RotationError::InvalidSecret(format!("{} version of secret {}: {}", stage, secret_id, reason))
            }
            other => other,
        })
    }

    /// The previous slot, or `None` if it is missing or unusable.
    async fn fetch_previous(&self, secret_id: &str) -> Result<Option<CredentialRecord>> {
        match self.fetch(secret_id, Stage::Previous, None).await {
            Ok(record) => Ok(Some(record)),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::Validation) => {
                warn!(secret_id = %secret_id, error = %e, "No usable AWSPREVIOUS secret");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Makes sure a pending payload exists for `token`.
    ///
    /// The current payload is the template: a fresh password from the vault
    /// replaces its password and, when it carries a connection string, that
    /// string is rendered again. An existing pending payload is left alone.
    ///
    /// # Errors
    ///
    /// Fails if the current payload is missing or invalid, or on any vault
    /// error other than the pending payload being absent.
    pub async fn create_secret(&self, secret_id: &str, token: &str) -> Result<()> {
        let current = self.fetch(secret_id, Stage::Current, None).await?;

        match self.fetch(secret_id, Stage::Pending, Some(token)).await {
            Ok(_) => {
                info!(secret_id = %secret_id, token = %token, "createSecret: Successfully retrieved secret");
                return Ok(());
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let password = self.vault.get_random_password(&self.config.password).await?;
        let mut pending = current.with_password(password.as_str());
        if current.connection_string.is_some() {
            pending.connection_string = Some(connection_string::format(
                current.connection_string_type.as_deref(),
                &current,
                &password,
            ));
        }

        self.vault
            .put_secret_value(secret_id, token, &pending.to_json()?, &[Stage::Pending])
            .await?;

        info!(secret_id = %secret_id, token = %token, "createSecret: Successfully put secret");
        Ok(())
    }

    /// Makes the live database password match the pending payload.
    ///
    /// Logs in with the pending credential first; success means the password
    /// is already set. Otherwise logs in with the current credential, or the
    /// previous one, and issues the engine's password statement.
    ///
    /// # Errors
    ///
    /// - [`RotationError::TargetMismatch`]: pending names another account than
    ///   current or previous
    /// - [`RotationError::NoUsableCredential`]: no slot could log in
    /// - [`RotationError::Database`]: the password statement or commit failed
    pub async fn set_secret(&self, secret_id: &str, token: &str) -> Result<()> {
        let pending = self.fetch(secret_id, Stage::Pending, Some(token)).await?;
        let current = self.fetch(secret_id, Stage::Current, None).await?;
        let previous = self.fetch_previous(secret_id).await?;
        let engine_name = self.engine.kind().display_name();

        ensure_same_target(&pending, &current, "current")?;

        let resolver = self.resolver();
        if let Some(mut session) = resolver.resolve(&pending).await? {
            close_quietly(&mut *session).await;
            info!(
                secret_id = %secret_id,
                token = %token,
                "setSecret: AWSPENDING secret is already set as password in {} DB",
                engine_name
            );
            return Ok(());
        }

        let mut session = resolver.resolve(&current).await?;
        if session.is_none() {
            if let Some(mut previous) = previous {
                ensure_same_target(&pending, &previous, "previous")?;
                self.engine.inherit_transport(&mut previous, &current);
                session = resolver.resolve(&previous).await?;
            }
        }

        let mut session = session.ok_or_else(|| RotationError::NoUsableCredential(secret_id.to_string()))?;
        let statement = self.engine.password_statement(&pending.username, &pending.password);
        let outcome = run_and_commit(&mut *session, &statement).await;
        close_quietly(&mut *session).await;
        outcome?;

        info!(
            secret_id = %secret_id,
            username = %pending.username,
            "setSecret: Successfully set password for user in {} DB",
            engine_name
        );
        Ok(())
    }

    /// Confirms the pending credential can log in and pass the permission probe.
    ///
    /// # Errors
    ///
    /// - [`RotationError::PendingLoginFailed`]: the pending credential cannot log in
    /// - any error raised by the probe or the commit
    pub async fn test_secret(&self, secret_id: &str, token: &str) -> Result<()> {
        let pending = self.fetch(secret_id, Stage::Pending, Some(token)).await?;

        let mut session = self
            .resolver()
            .resolve(&pending)
            .await?
            .ok_or_else(|| RotationError::PendingLoginFailed(secret_id.to_string()))?;

        let outcome = probe_and_commit(&*self.probe, &mut *session).await;
        close_quietly(&mut *session).await;
        outcome?;

        info!(
            secret_id = %secret_id,
            token = %token,
            "testSecret: Successfully signed into {} DB with AWSPENDING secret",
            self.engine.kind().display_name()
        );
        Ok(())
    }

    /// Moves the current label onto `token` and clears its pending label.
    ///
    /// Does nothing if `token` is already current.
    pub async fn finish_secret(&self, secret_id: &str, token: &str) -> Result<()> {
        let metadata = self.vault.describe_secret(secret_id).await?;
        let current_version = metadata.version_with(Stage::Current);

        if metadata.has_stage(token, Stage::Current) {
            info!(
                secret_id = %secret_id,
                token = %token,
                "finishSecret: Version already marked as AWSCURRENT"
            );
            return Ok(());
        }

        self.vault
            .update_secret_version_stage(secret_id, Stage::Current, Some(token), current_version)
            .await?;
        self.vault
            .update_secret_version_stage(secret_id, Stage::Pending, None, Some(token))
            .await?;

        info!(
            secret_id = %secret_id,
            token = %token,
            replaced = ?current_version,
            last_rotated = ?metadata.last_rotated,
            "finishSecret: Successfully set AWSCURRENT stage to version"
        );
        Ok(())
    }
}

async fn run_and_commit(session: &mut dyn DbSession, statement: &Statement) -> Result<()> {
    session.execute(statement).await?;
    session.commit().await
}

async fn probe_and_commit(probe: &dyn PermissionProbe, session: &mut dyn DbSession) -> Result<()> {
    probe.check(session).await?;
    session.commit().await
}

async fn close_quietly(session: &mut dyn DbSession) {
    if let Err(e) = session.close().await {
        warn!(error = %e, "Failed to close database session");
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::backends::mock::MockVault;
    use crate::database::Transport;
    use crate::drivers::mock::MockDriver;
    use crate::{EngineKind, PasswordPolicy};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    const SECRET: &str = "prod/appdb";

    fn payload(password: &str, extra: Value) -> String {
        let mut base = json!({
            "engine": "mariadb",
            "host": "db1",
            "username": "app",
            "password": password,
            "dbname": "appdb",
        });
        if let (Some(b), Some(e)) = (base.as_object_mut(), extra.as_object()) {
            b.extend(e.clone());
        }
        base.to_string()
    }

    fn rotator(vault: &Arc<MockVault>, driver: &MockDriver, kind: EngineKind) -> Rotator {
        Rotator::new(
            vault.clone(),
            Arc::new(driver.clone()),
            kind.engine(),
            RotationConfig::default(),
        )
    }

    async fn stored(vault: &MockVault, token: &str) -> CredentialRecord {
        let json = vault.payload(SECRET, token).await.unwrap();
        serde_json::from_str(&json).unwrap()
    }

    #[tokio::test]
    async fn test_create_generates_pending_from_current() {
        let vault = Arc::new(MockVault::new());
        vault
            .seed_version(SECRET, "v1", payload("old", json!({"proxy": "p1"})), &[Stage::Current])
            .await;
        let token = vault.begin_rotation(SECRET).await;
        let r = rotator(&vault, &MockDriver::new(), EngineKind::MariaDb);

        r.create_secret(SECRET, &token).await.unwrap();

        let pending = stored(&vault, &token).await;
        let current = stored(&vault, "v1").await;
        assert_ne!(pending.password, "old");
        assert_eq!(pending.password.len(), 32);
        assert_eq!(pending.with_password("old"), current);
        assert_eq!(pending.extra["proxy"], "p1");
        assert!(vault.stages(SECRET, &token).await.contains(&Stage::Pending));
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let vault = Arc::new(MockVault::new());
        vault.seed_version(SECRET, "v1", payload("old", json!({})), &[Stage::Current]).await;
        let token = vault.begin_rotation(SECRET).await;
        let r = rotator(&vault, &MockDriver::new(), EngineKind::MariaDb);

        r.create_secret(SECRET, &token).await.unwrap();
        let first = vault.payload(SECRET, &token).await;
        r.create_secret(SECRET, &token).await.unwrap();

        assert_eq!(vault.payload(SECRET, &token).await, first);
        assert_eq!(vault.password_requests(), 1);
    }

    #[tokio::test]
    async fn test_create_regenerates_connection_string() {
        let vault = Arc::new(MockVault::new());
        let template = json!({
            "engine": "postgres",
            "host": "h",
            "username": "u",
            "password": "old",
            "dbname": "d",
            "connection_string_type": "gopq",
            "connection_string": "postgres://u:old@h:5432/d?sslmode=prefer&schema=public",
        });
        vault.seed_version(SECRET, "v1", template.to_string(), &[Stage::Current]).await;
        let token = vault.begin_rotation(SECRET).await;
        let policy = PasswordPolicy {
            exclude_punctuation: true,
            ..PasswordPolicy::default()
        };
        let r = Rotator::new(
            vault.clone(),
            Arc::new(MockDriver::new()),
            EngineKind::Postgres.engine(),
            RotationConfig::default().with_password_policy(policy),
        );

        r.create_secret(SECRET, &token).await.unwrap();

        let pending = stored(&vault, &token).await;
        let expected = format!(
            "postgres://u:{}@h:5432/d?sslmode=prefer&schema=public",
            pending.password
        );
        assert_eq!(pending.connection_string.as_deref(), Some(expected.as_str()));
    }

    #[tokio::test]
    async fn test_create_requires_valid_current() {
        let vault = Arc::new(MockVault::new());
        vault
            .seed_version(SECRET, "v1", r#"{"engine":"postgres","host":"h","username":"u","password":"p"}"#, &[Stage::Current])
            .await;
        let token = vault.begin_rotation(SECRET).await;
        let r = rotator(&vault, &MockDriver::new(), EngineKind::MariaDb);

        let err = r.create_secret(SECRET, &token).await.unwrap_err();
        assert!(matches!(err, RotationError::InvalidSecret(_)));
        assert!(err.to_string().contains("AWSCURRENT version of secret prod/appdb"), "{}", err);
        assert_eq!(vault.password_requests(), 0);
    }

    #[tokio::test]
    async fn test_create_propagates_vault_failures() {
        let mut vault = MockVault::new();
        vault.put_error = Some(RotationError::Other(anyhow::anyhow!("throttled")));
        vault.seed_version(SECRET, "v1", payload("old", json!({})), &[Stage::Current]).await;
        let token = vault.begin_rotation(SECRET).await;
        let vault = Arc::new(vault);
        let r = rotator(&vault, &MockDriver::new(), EngineKind::MariaDb);

        assert!(r.create_secret(SECRET, &token).await.is_err());
    }

    #[tokio::test]
    async fn test_set_changes_password_with_current() {
        let vault = Arc::new(MockVault::new());
        let driver = MockDriver::new();
        driver.set_password("app", "old").await;
        vault.seed_version(SECRET, "v1", payload("old", json!({})), &[Stage::Current]).await;
        vault.seed_version(SECRET, "v2", payload("new", json!({})), &[Stage::Pending]).await;
        let r = rotator(&vault, &driver, EngineKind::MariaDb);

        r.set_secret(SECRET, "v2").await.unwrap();

        assert_eq!(driver.password_of("app").await.as_deref(), Some("new"));
        assert_eq!(driver.executed().await, vec!["SET PASSWORD = PASSWORD(?)".to_string()]);
        assert_eq!(driver.commits().await, 1);
        assert_eq!(driver.open_sessions().await, 0);
    }

    #[tokio::test]
    async fn test_set_skips_when_pending_already_live() {
        let vault = Arc::new(MockVault::new());
        let driver = MockDriver::new();
        driver.set_password("app", "new").await;
        vault.seed_version(SECRET, "v1", payload("old", json!({})), &[Stage::Current]).await;
        vault.seed_version(SECRET, "v2", payload("new", json!({})), &[Stage::Pending]).await;
        let r = rotator(&vault, &driver, EngineKind::MariaDb);

        r.set_secret(SECRET, "v2").await.unwrap();

        assert!(driver.executed().await.is_empty());
        assert_eq!(driver.open_sessions().await, 0);
    }

    #[tokio::test]
    async fn test_set_rejects_mismatched_target_before_connecting() {
        let vault = Arc::new(MockVault::new());
        let driver = MockDriver::new();
        driver.set_password("app", "old").await;
        vault.seed_version(SECRET, "v1", payload("old", json!({})), &[Stage::Current]).await;
        vault
            .seed_version(SECRET, "v2", payload("new", json!({"host": "db2"})), &[Stage::Pending])
            .await;
        let r = rotator(&vault, &driver, EngineKind::MariaDb);

        let err = r.set_secret(SECRET, "v2").await.unwrap_err();
        assert!(matches!(err, RotationError::TargetMismatch { field: "host", slot: "current", .. }));
        assert!(driver.attempts().await.is_empty());
        assert_eq!(driver.password_of("app").await.as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_set_falls_back_to_previous() {
        let vault = Arc::new(MockVault::new());
        let driver = MockDriver::new();
        driver.set_password("app", "older").await;
        driver.set_tls_supported(false).await;
        vault
            .seed_version(SECRET, "v0", payload("older", json!({"ssl": true})), &[Stage::Previous])
            .await;
        vault
            .seed_version(SECRET, "v1", payload("old", json!({"ssl": false})), &[Stage::Current])
            .await;
        vault.seed_version(SECRET, "v2", payload("new", json!({})), &[Stage::Pending]).await;
        let r = rotator(&vault, &driver, EngineKind::MariaDb);

        r.set_secret(SECRET, "v2").await.unwrap();

        assert_eq!(driver.password_of("app").await.as_deref(), Some("new"));
        // The previous credential logs in with the current slot's transport.
        let last = driver.attempts().await.pop().unwrap();
        assert!(last.succeeded);
        assert_eq!(last.transport, Transport::Plain);
    }

    #[tokio::test]
    async fn test_set_rejects_mismatched_previous() {
        let vault = Arc::new(MockVault::new());
        let driver = MockDriver::new();
        driver.set_password("app", "older").await;
        vault
            .seed_version(SECRET, "v0", payload("older", json!({"username": "admin"})), &[Stage::Previous])
            .await;
        vault.seed_version(SECRET, "v1", payload("old", json!({})), &[Stage::Current]).await;
        vault.seed_version(SECRET, "v2", payload("new", json!({})), &[Stage::Pending]).await;
        let r = rotator(&vault, &driver, EngineKind::MariaDb);

        let err = r.set_secret(SECRET, "v2").await.unwrap_err();
        assert!(matches!(err, RotationError::TargetMismatch { slot: "previous", .. }));
    }

    #[tokio::test]
    async fn test_set_fails_without_usable_credential() {
        let vault = Arc::new(MockVault::new());
        let driver = MockDriver::new();
        driver.set_password("app", "something-else").await;
        vault.seed_version(SECRET, "v1", payload("old", json!({})), &[Stage::Current]).await;
        vault.seed_version(SECRET, "v2", payload("new", json!({})), &[Stage::Pending]).await;
        let r = rotator(&vault, &driver, EngineKind::MariaDb);

        let err = r.set_secret(SECRET, "v2").await.unwrap_err();
        assert!(matches!(err, RotationError::NoUsableCredential(_)));
        assert_eq!(err.kind(), ErrorKind::Connectivity);
    }

    #[tokio::test]
    async fn test_set_closes_session_when_statement_fails() {
        let vault = Arc::new(MockVault::new());
        let driver = MockDriver::new();
        driver.set_password("app", "old").await;
        driver.fail_statements_containing("SET PASSWORD").await;
        vault.seed_version(SECRET, "v1", payload("old", json!({})), &[Stage::Current]).await;
        vault.seed_version(SECRET, "v2", payload("new", json!({})), &[Stage::Pending]).await;
        let r = rotator(&vault, &driver, EngineKind::MariaDb);

        let err = r.set_secret(SECRET, "v2").await.unwrap_err();
        assert!(matches!(err, RotationError::Database(_)));
        assert_eq!(driver.open_sessions().await, 0);
        assert_eq!(driver.commits().await, 0);
    }

    #[tokio::test]
    async fn test_set_uses_postgres_statement() {
        let vault = Arc::new(MockVault::new());
        let driver = MockDriver::new();
        driver.set_password("u", "old").await;
        let pg = |pw: &str| json!({"engine": "postgresql", "host": "h", "username": "u", "password": pw}).to_string();
        vault.seed_version(SECRET, "v1", pg("old"), &[Stage::Current]).await;
        vault.seed_version(SECRET, "v2", pg("n'ew"), &[Stage::Pending]).await;
        let r = rotator(&vault, &driver, EngineKind::Postgres);

        r.set_secret(SECRET, "v2").await.unwrap();

        assert_eq!(driver.password_of("u").await.as_deref(), Some("n'ew"));
        let attempt = &driver.attempts().await[0];
        assert_eq!(attempt.port, 5432);
        assert_eq!(attempt.dbname.as_deref(), Some("postgres"));
    }

    #[tokio::test]
    async fn test_test_secret_runs_probe() {
        let vault = Arc::new(MockVault::new());
        let driver = MockDriver::new();
        driver.set_password("app", "new").await;
        vault.seed_version(SECRET, "v2", payload("new", json!({})), &[Stage::Pending]).await;
        let r = rotator(&vault, &driver, EngineKind::MariaDb);

        r.test_secret(SECRET, "v2").await.unwrap();

        assert_eq!(driver.executed().await, vec!["SELECT NOW()".to_string()]);
        assert_eq!(driver.commits().await, 1);
        assert_eq!(driver.open_sessions().await, 0);
    }

    #[tokio::test]
    async fn test_test_secret_failures() {
        let vault = Arc::new(MockVault::new());
        let driver = MockDriver::new();
        driver.set_password("app", "old").await;
        vault.seed_version(SECRET, "v2", payload("new", json!({})), &[Stage::Pending]).await;
        let r = rotator(&vault, &driver, EngineKind::MariaDb);

        let err = r.test_secret(SECRET, "v2").await.unwrap_err();
        assert!(matches!(err, RotationError::PendingLoginFailed(_)));

        driver.set_password("app", "new").await;
        driver.fail_statements_containing("orders").await;
        let r = r.with_probe(Arc::new(SqlProbe::new(["SELECT 1 FROM orders"])));
        assert!(r.test_secret(SECRET, "v2").await.is_err());
        assert_eq!(driver.open_sessions().await, 0);
    }

    #[tokio::test]
    async fn test_finish_promotes_pending() {
        let vault = Arc::new(MockVault::new());
        vault.seed_version(SECRET, "v1", payload("old", json!({})), &[Stage::Current]).await;
        vault.seed_version(SECRET, "v2", payload("new", json!({})), &[Stage::Pending]).await;
        let r = rotator(&vault, &MockDriver::new(), EngineKind::MariaDb);

        assert_eq!(vault.describe_secret(SECRET).await.unwrap().last_rotated, None);

        r.finish_secret(SECRET, "v2").await.unwrap();
        let rotated_at = vault.describe_secret(SECRET).await.unwrap().last_rotated;
        assert!(rotated_at.is_some());

        r.finish_secret(SECRET, "v2").await.unwrap();
        assert_eq!(vault.describe_secret(SECRET).await.unwrap().last_rotated, rotated_at);

        assert_eq!(vault.stages(SECRET, "v2").await.into_iter().collect::<Vec<_>>(), vec![Stage::Current]);
        assert!(vault.stages(SECRET, "v1").await.contains(&Stage::Previous));
        assert_eq!(vault.count_with(SECRET, Stage::Current).await, 1);
        assert_eq!(vault.count_with(SECRET, Stage::Pending).await, 0);
    }
}
