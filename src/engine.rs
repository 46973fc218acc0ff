//! Database engine capabilities.
//!
//! The rotation protocol is the same for every engine. What differs is
//! captured here: accepted engine tags, connection defaults, the transport
//! policy derived from a credential, and the password-change statement.

use crate::database::{SslMode, Statement, Transport};
use crate::resolver::{ssl_policy, TransportPolicy};
use crate::{CredentialRecord, Result, RotationError};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Capability record for one database engine.
pub trait Engine: Send + Sync {
    /// Which engine this is.
    fn kind(&self) -> EngineKind;

    /// `engine` tags accepted in a secret payload.
    fn supported_tags(&self) -> &'static [&'static str];

    /// Port used when the credential has none.
    fn default_port(&self) -> u16;

    /// Database opened when the credential names none.
    fn default_dbname(&self) -> Option<&'static str>;

    /// How to encrypt the connection for `record`, and whether to retry in
    /// plain text when the encrypted attempt fails.
    fn transport_policy(&self, record: &CredentialRecord) -> TransportPolicy;

    /// Statement that sets the logged-in user's password.
    fn password_statement(&self, username: &str, password: &str) -> Statement;

    /// Adjusts the previous credential before it is used as a fallback login.
    fn inherit_transport(&self, _previous: &mut CredentialRecord, _current: &CredentialRecord) {}

    /// Whether failed TLS handshakes are checked for host name mismatches.
    fn reports_hostname_mismatch(&self) -> bool {
        false
    }
}

/// Supported engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// PostgreSQL and Aurora PostgreSQL
    Postgres,
    /// MariaDB
    MariaDb,
}

impl EngineKind {
    /// Builds the capability record for this engine.
    pub fn engine(self) -> Arc<dyn Engine> {
        match self {
            Self::Postgres => Arc::new(Postgres),
            Self::MariaDb => Arc::new(MariaDb),
        }
    }

    /// Human-readable engine name for log lines.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Postgres => "PostgreSQL",
            Self::MariaDb => "MariaDB",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => write!(f, "postgres"),
            Self::MariaDb => write!(f, "mariadb"),
        }
    }
}

impl FromStr for EngineKind {
    type Err = RotationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "aurora-postgresql" => Ok(Self::Postgres),
            "mariadb" => Ok(Self::MariaDb),
            other => Err(RotationError::Config(format!(
                "unknown engine: {} (valid options: postgres, mariadb)",
                other
            ))),
        }
    }
}

/// PostgreSQL capabilities.
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Engine for Postgres {
    fn kind(&self) -> EngineKind {
        EngineKind::Postgres
    }

    fn supported_tags(&self) -> &'static [&'static str] {
        &["postgres", "aurora-postgresql", "postgresql"]
    }

    fn default_port(&self) -> u16 {
        5432
    }

    fn default_dbname(&self) -> Option<&'static str> {
        Some("postgres")
    }

    /// An explicit `sslmode` wins and is left to the driver; otherwise the
    /// generic `ssl` policy applies.
    fn transport_policy(&self, record: &CredentialRecord) -> TransportPolicy {
        match record.sslmode.as_deref().map(str::parse::<SslMode>) {
            Some(Ok(mode)) => TransportPolicy {
                transport: Transport::SslMode(mode),
                fall_back: false,
            },
            _ => ssl_policy(record.ssl.as_ref()),
        }
    }

    // ALTER ROLE takes no bind parameters, so both values are quoted inline.
    fn password_statement(&self, username: &str, password: &str) -> Statement {
        Statement::new(format!(
            "ALTER ROLE {} WITH ENCRYPTED PASSWORD {}",
            quote_identifier(username),
            quote_literal(password)
        ))
    }
}

/// MariaDB capabilities.
#[derive(Debug, Clone, Copy, Default)]
pub struct MariaDb;

impl Engine for MariaDb {
    fn kind(&self) -> EngineKind {
        EngineKind::MariaDb
    }

    fn supported_tags(&self) -> &'static [&'static str] {
        &["mariadb"]
    }

    fn default_port(&self) -> u16 {
        3306
    }

    fn default_dbname(&self) -> Option<&'static str> {
        None
    }

    fn transport_policy(&self, record: &CredentialRecord) -> TransportPolicy {
        ssl_policy(record.ssl.as_ref())
    }

    fn password_statement(&self, _username: &str, password: &str) -> Statement {
        Statement::new("SET PASSWORD = PASSWORD(?)").bind(password)
    }

    /// The previous credential's own `ssl` value may be stale; the current
    /// credential's setting is used instead, or none at all.
    fn inherit_transport(&self, previous: &mut CredentialRecord, current: &CredentialRecord) {
        previous.ssl = current.ssl.clone();
    }

    fn reports_hostname_mismatch(&self) -> bool {
        true
    }
}

fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
