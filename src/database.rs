//! Database driver and session traits.
//!
//! A [`DbSession`] is an authenticated connection used for exactly one step's
//! statements and then closed. Rotation steps close every session they open,
//! whether or not the statements on it succeeded.

use crate::Result;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// libpq-style SSL mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    /// Never use TLS.
    Disable,
    /// Try plain first, then TLS.
    Allow,
    /// Try TLS first, then plain.
    Prefer,
    /// TLS without certificate verification.
    Require,
    /// TLS, verify the certificate chain.
    VerifyCa,
    /// TLS, verify the chain and the host name.
    VerifyFull,
}

impl FromStr for SslMode {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disable" => Ok(Self::Disable),
            "allow" => Ok(Self::Allow),
            "prefer" => Ok(Self::Prefer),
            "require" => Ok(Self::Require),
            "verify-ca" => Ok(Self::VerifyCa),
            "verify-full" => Ok(Self::VerifyFull),
            _ => Err(()),
        }
    }
}

/// Transport encryption for one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Unencrypted.
    Plain,
    /// TLS with the driver's verification settings.
    Tls,
    /// SSL mode handed to the driver verbatim.
    SslMode(SslMode),
}

impl Transport {
    /// True if this attempt insists on, or starts with, TLS.
    pub fn is_encrypted(&self) -> bool {
        match self {
            Self::Plain => false,
            Self::Tls => true,
            Self::SslMode(mode) => !matches!(mode, SslMode::Disable | SslMode::Allow),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_encrypted() {
            f.write_str("SSL/TLS")
        } else {
            f.write_str("non SSL/TLS")
        }
    }
}

/// Everything a driver needs to open a session.
#[derive(Clone)]
pub struct ConnectParams {
    /// Server host name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Login name.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Database to open, if any.
    pub dbname: Option<String>,
    /// Transport encryption.
    pub transport: Transport,
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &crate::credential::REDACTED)
            .field("dbname", &self.dbname)
            .field("transport", &self.transport)
            .finish()
    }
}

/// A SQL statement with positional string parameters.
///
/// Parameters are never shown by `Debug`; they routinely carry passwords.
#[derive(Clone, PartialEq, Eq)]
pub struct Statement {
    /// SQL text, with driver-native placeholders.
    pub sql: String,
    /// Values bound to the placeholders in order.
    pub params: Vec<String>,
}

impl Statement {
    /// A statement without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Appends a bound parameter.
    pub fn bind(mut self, value: impl Into<String>) -> Self {
        self.params.push(value.into());
        self
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &"<hidden>")
            .field("params", &self.params.len())
            .finish()
    }
}

/// Why a connection attempt failed.
///
/// Connection failures are not fatal on their own; the resolver turns them
/// into "no session".
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ConnectError {
    /// Driver error text.
    pub message: String,
}

impl ConnectError {
    /// Creates an error from any displayable driver error.
    pub fn new(message: impl fmt::Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    /// True if the TLS handshake failed on host name or IP verification.
    pub fn is_hostname_mismatch(&self) -> bool {
        let message = self.message.to_lowercase();
        message.contains("ip address mismatch")
            || message.contains("hostname mismatch")
            || message.contains("notvalidforname")
    }
}

/// An authenticated database connection.
#[async_trait]
pub trait DbSession: Send {
    /// Runs a statement, returning the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns [`RotationError::Database`](crate::RotationError::Database) if
    /// the server rejects the statement.
    async fn execute(&mut self, statement: &Statement) -> Result<u64>;

    /// Commits any open transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Closes the connection. Closing twice is a no-op.
    async fn close(&mut self) -> Result<()>;
}

/// Opens database sessions.
///
/// # Implementations
///
/// - **sqlx-based**: PostgreSQL (`postgres` feature), MariaDB/MySQL (`mysql` feature)
/// - **Testing**: Scripted mock driver (`mock` feature)
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Returns the driver name.
    fn name(&self) -> &str;

    /// Attempts one login.
    async fn connect(&self, params: &ConnectParams) -> std::result::Result<Box<dyn DbSession>, ConnectError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sslmode_parse() {
        assert_eq!("verify-full".parse::<SslMode>(), Ok(SslMode::VerifyFull));
        assert_eq!("PREFER".parse::<SslMode>(), Ok(SslMode::Prefer));
        assert!("sometimes".parse::<SslMode>().is_err());
    }

    #[test]
    fn test_transport_encryption() {
        assert!(Transport::Tls.is_encrypted());
        assert!(!Transport::Plain.is_encrypted());
        assert!(Transport::SslMode(SslMode::Require).is_encrypted());
        assert!(!Transport::SslMode(SslMode::Disable).is_encrypted());
        assert_eq!(Transport::Plain.to_string(), "non SSL/TLS");
    }

    #[test]
    fn test_secrets_hidden_from_debug() {
        let params = ConnectParams {
            host: "db".to_string(),
            port: 5432,
            username: "app".to_string(),
            password: "hunter2".to_string(),
            dbname: None,
            transport: Transport::Tls,
        };
        assert!(!format!("{:?}", params).contains("hunter2"));

        let stmt = Statement::new("SET PASSWORD = PASSWORD(?)").bind("hunter2");
        assert!(!format!("{:?}", stmt).contains("hunter2"));
        assert_eq!(stmt.params.len(), 1);
    }

    #[test]
    fn test_hostname_mismatch_detection() {
        let err = ConnectError::new("(2026, 'SSL connection error: certificate verify failed: IP address mismatch')");
        assert!(err.is_hostname_mismatch());
        assert!(!ConnectError::new("Access denied for user 'app'").is_hostname_mismatch());
    }
}
