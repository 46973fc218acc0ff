//! PostgreSQL driver built on sqlx.

use crate::database::{ConnectError, ConnectParams, DatabaseDriver, DbSession, SslMode, Statement, Transport};
use crate::{Result, RotationError};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::{Connection, Executor};

/// PostgreSQL driver.
#[derive(Debug, Clone, Default)]
pub struct PostgresDriver;

impl PostgresDriver {
    /// Creates the driver.
    pub fn new() -> Self {
        Self
    }
}

fn ssl_mode(transport: Transport) -> PgSslMode {
    match transport {
        Transport::Plain => PgSslMode::Disable,
        Transport::Tls => PgSslMode::Require,
        Transport::SslMode(mode) => match mode {
            SslMode::Disable => PgSslMode::Disable,
            SslMode::Allow => PgSslMode::Allow,
            SslMode::Prefer => PgSslMode::Prefer,
            SslMode::Require => PgSslMode::Require,
            SslMode::VerifyCa => PgSslMode::VerifyCa,
            SslMode::VerifyFull => PgSslMode::VerifyFull,
        },
    }
}

#[async_trait]
impl DatabaseDriver for PostgresDriver {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn connect(&self, params: &ConnectParams) -> std::result::Result<Box<dyn DbSession>, ConnectError> {
        let mut options = PgConnectOptions::new()
            .host(&params.host)
            .port(params.port)
            .username(&params.username)
            .password(&params.password)
            .ssl_mode(ssl_mode(params.transport));

        if let Some(ref dbname) = params.dbname {
            options = options.database(dbname);
        }

        let conn = PgConnection::connect_with(&options)
            .await
            .map_err(ConnectError::new)?;

        Ok(Box::new(PostgresSession {
            conn: Some(conn),
            in_transaction: false,
        }))
    }
}

struct PostgresSession {
    conn: Option<PgConnection>,
    in_transaction: bool,
}

fn closed() -> RotationError {
    RotationError::Database("session is closed".to_string())
}

#[async_trait]
impl DbSession for PostgresSession {
    async fn execute(&mut self, statement: &Statement) -> Result<u64> {
        let conn = self.conn.as_mut().ok_or_else(closed)?;

        if !self.in_transaction {
            (&mut *conn)
                .execute("BEGIN")
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_mode_mapping() {
        assert!(matches!(ssl_mode(Transport::Plain), PgSslMode::Disable));
        assert!(matches!(ssl_mode(Transport::Tls), PgSslMode::Require));
        assert!(matches!(
            ssl_mode(Transport::SslMode(SslMode::VerifyFull)),
            PgSslMode::VerifyFull
        ));
    }
}
