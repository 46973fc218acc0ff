//! Mock database driver for testing.
//!
//! Simulates a server holding one password per user. Password-change
//! statements issued by the built-in engines take effect on commit, so a full
//! rotation can be exercised without a database.

use crate::database::{ConnectError, ConnectParams, DatabaseDriver, DbSession, SslMode, Statement, Transport};
use crate::{Result, RotationError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// One recorded connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAttempt {
    /// Login name used.
    pub username: String,
    /// Port used.
    pub port: u16,
    /// Database requested.
    pub dbname: Option<String>,
    /// Transport requested.
    pub transport: Transport,
    /// Whether the server accepted the login. A delayed attempt is recorded
    /// before the delay, so a caller may have given up on it.
    pub succeeded: bool,
}

#[derive(Debug, Default)]
struct ServerState {
    passwords: HashMap<String, String>,
    tls_supported: bool,
    hostname_mismatch: bool,
    failing_sql: Option<String>,
    connect_delay: Option<Duration>,
    attempts: Vec<ConnectAttempt>,
    executed: Vec<String>,
    commits: usize,
    opened: usize,
    closed: usize,
}

/// Scripted in-memory database server.
///
/// # Example
///
/// ```
/// use dbrotor::drivers::mock::MockDriver;
///
/// #[tokio::main]
/// async fn main() {
///     let driver = MockDriver::new();
///     driver.set_password("app", "old").await;
///     driver.set_tls_supported(false).await;
///     assert_eq!(driver.password_of("app").await.as_deref(), Some("old"));
/// }
/// ```
#[derive(Clone)]
pub struct MockDriver {
    state: Arc<Mutex<ServerState>>,
}

impl MockDriver {
    /// Creates a server with no users that accepts TLS.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                tls_supported: true,
                ..ServerState::default()
            })),
        }
    }

    /// Creates or updates a user.
    pub async fn set_password(&self, username: &str, password: &str) {
        let mut state = self.state.lock().await;
        state.passwords.insert(username.to_string(), password.to_string());
    }

    /// Live password of `username`.
    pub async fn password_of(&self, username: &str) -> Option<String> {
        self.state.lock().await.passwords.get(username).cloned()
    }

    /// Whether TLS handshakes succeed.
    pub async fn set_tls_supported(&self, supported: bool) {
        self.state.lock().await.tls_supported = supported;
    }

    /// Makes every TLS handshake fail host name verification.
    pub async fn set_hostname_mismatch(&self, mismatch: bool) {
        self.state.lock().await.hostname_mismatch = mismatch;
    }

    /// Holds every connection attempt for `delay` before answering.
    pub async fn set_connect_delay(&self, delay: Option<Duration>) {
        self.state.lock().await.connect_delay = delay;
    }

    /// Makes statements containing `fragment` fail.
    pub async fn fail_statements_containing(&self, fragment: &str) {
        self.state.lock().await.failing_sql = Some(fragment.to_string());
    }

    /// All connection attempts so far.
    pub async fn attempts(&self) -> Vec<ConnectAttempt> {
        self.state.lock().await.attempts.clone()
    }

    /// SQL text of every statement executed so far.
    pub async fn executed(&self) -> Vec<String> {
        self.state.lock().await.executed.clone()
    }

    /// Number of commits.
    pub async fn commits(&self) -> usize {
        self.state.lock().await.commits
    }

    /// Sessions opened and not yet closed.
    pub async fn open_sessions(&self) -> usize {
        let state = self.state.lock().await;
        state.opened - state.closed
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Extracts the new password from a statement built by one of the engines.
fn password_change(statement: &Statement) -> Option<String> {
    if statement.sql.starts_with("SET PASSWORD") {
        return statement.params.first().cloned();
    }
    if statement.sql.starts_with("ALTER ROLE") {
        let marker = "PASSWORD '";
        let start = statement.sql.find(marker)? + marker.len();
        let end = statement.sql.rfind('\'')?;
        return Some(statement.sql[start..end].replace("''", "'"));
    }
    None
}

#[async_trait]
impl DatabaseDriver for MockDriver {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&self, params: &ConnectParams) -> std::result::Result<Box<dyn DbSession>, ConnectError> {
        let mut state = self.state.lock().await;

        let wants_tls = match params.transport {
            Transport::Plain => Some(false),
            Transport::Tls => Some(true),
            Transport::SslMode(SslMode::Disable) => Some(false),
            Transport::SslMode(SslMode::Allow | SslMode::Prefer) => None,
            Transport::SslMode(_) => Some(true),
        };
        let tls_ok = state.tls_supported && !state.hostname_mismatch;

        let outcome = if wants_tls == Some(true) && state.hostname_mismatch {
            Err(ConnectError::new("SSL connection error: certificate verify failed: IP address mismatch"))
        } else if wants_tls == Some(true) && !tls_ok {
            Err(ConnectError::new("SSL connection error: server does not support SSL"))
        } else if state.passwords.get(&params.username) != Some(&params.password) {
            Err(ConnectError::new(format!("Access denied for user '{}'", params.username)))
        } else {
            Ok(())
        };

        state.attempts.push(ConnectAttempt {
            username: params.username.clone(),
            port: params.port,
            dbname: params.dbname.clone(),
            transport: params.transport,
            succeeded: outcome.is_ok(),
        });

        if let Some(delay) = state.connect_delay {
            drop(state);
            tokio::time::sleep(delay).await;
            state = self.state.lock().await;
        }
        outcome?;

        state.opened += 1;
        Ok(Box::new(MockSession {
            state: self.state.clone(),
            username: params.username.clone(),
            staged_password: None,
            closed: false,
        }))
    }
}

struct MockSession {
    state: Arc<Mutex<ServerState>>,
    username: String,
    staged_password: Option<String>,
    closed: bool,
}

#[async_trait]
impl DbSession for MockSession {
    async fn execute(&mut self, statement: &Statement) -> Result<u64> {
        if self.closed {
            return Err(RotationError::Database("session is closed".to_string()));
        }

        let mut state = self.state.lock().await;
        state.executed.push(statement.sql.clone());

        if let Some(fragment) = state.failing_sql.as_deref() {
            if statement.sql.contains(fragment) {
                return Err(RotationError::Database(format!(
                    "permission denied for user {}",
                    self.username
                )));
            }
        }

        if let Some(password) = password_change(statement) {
            self.staged_password = Some(password);
        }
        Ok(0)
    }

    async fn commit(&mut self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.commits += 1;
        if let Some(password) = self.staged_password.take() {
            state.passwords.insert(self.username.clone(), password);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.state.lock().await.closed += 1;
        }
        Ok(())
    }
}
