//! MariaDB/MySQL driver built on sqlx.

use crate::database::{ConnectError, ConnectParams, DatabaseDriver, DbSession, SslMode, Statement, Transport};
use crate::{Result, RotationError};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlSslMode};
use sqlx::{Connection, Executor};

/// MariaDB/MySQL driver.
///
/// TLS connections verify the server certificate and host name against
/// `ca_bundle`.
#[derive(Debug, Clone)]
pub struct MySqlDriver {
    ca_bundle: String,
}

impl MySqlDriver {
    /// Creates a driver verifying TLS peers against `ca_bundle`.
    pub fn new(ca_bundle: impl Into<String>) -> Self {
        Self {
            ca_bundle: ca_bundle.into(),
        }
    }
}

fn ssl_mode(transport: Transport) -> MySqlSslMode {
    match transport {
        Transport::Plain => MySqlSslMode::Disabled,
        Transport::Tls => MySqlSslMode::VerifyIdentity,
        Transport::SslMode(mode) => match mode {
            SslMode::Disable => MySqlSslMode::Disabled,
            SslMode::Allow | SslMode::Prefer => MySqlSslMode::Preferred,
            SslMode::Require => MySqlSslMode::Required,
            SslMode::VerifyCa => MySqlSslMode::VerifyCa,
            SslMode::VerifyFull => MySqlSslMode::VerifyIdentity,
        },
    }
}

#[async_trait]
impl DatabaseDriver for MySqlDriver {
    fn name(&self) -> &str {
        "mysql"
    }

    async fn connect(&self, params: &ConnectParams) -> std::result::Result<Box<dyn DbSession>, ConnectError> {
        let mode = ssl_mode(params.transport);
        let verify_peer = matches!(mode, MySqlSslMode::VerifyCa | MySqlSslMode::VerifyIdentity);
        let mut options = MySqlConnectOptions::new()
            .host(&params.host)
            .port(params.port)
            .username(&params.username)
            .password(&params.password)
            .ssl_mode(mode);

        if verify_peer {
            options = options.ssl_ca(&self.ca_bundle);
        }
        if let Some(ref dbname) = params.dbname {
            options = options.database(dbname);
        }

        let conn = MySqlConnection::connect_with(&options)
            .await
            .map_err(ConnectError::new)?;

        Ok(Box::new(MySqlSession {
            conn: Some(conn),
            in_transaction: false,
        }))
    }
}

struct MySqlSession {
    conn: Option<MySqlConnection>,
    in_transaction: bool,
}

fn closed() -> RotationError {
    RotationError::Database("session is closed".to_string())
}

#[async_trait]
impl DbSession for MySqlSession {
    async fn execute(&mut self, statement: &Statement) -> Result<u64> {
        let conn = self.conn.as_mut().ok_or_else(closed)?;

        if !self.in_transaction {
            (&mut *conn)
                .execute("START TRANSACTION")
                .await
                .map_err(|e| RotationError::Database(e.to_string()))?;
            self.in_transaction = true;
        }

        let result = if statement.params.is_empty() {
            (&mut *conn).execute(statement.sql.as_str()).await
        } else {
            let mut query = sqlx::query(&statement.sql);
            for param in &statement.params {
                query = query.bind(param.as_str());
            }
            query.execute(&mut *conn).await
        };

        result
            .map(|r| r.rows_affected())
            .map_err(|e| RotationError::Database(e.to_string()))
    }

    async fn commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        let conn = self.conn.as_mut().ok_or_else(closed)?;
        (&mut *conn)
            .execute("COMMIT")
            .await
            .map_err(|e| RotationError::Database(e.to_string()))?;
        self.in_transaction = false;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        match self.conn.take() {
            Some(conn) => conn
                .close()
                .await
                .map_err(|e| RotationError::Database(e.to_string())),
            None => Ok(()),
        }
    }
}
