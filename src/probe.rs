//! Permission checks run by the test step.
//!
//! Logging in with the pending credential proves little on its own. A
//! [`PermissionProbe`] runs inside that session to confirm the account can
//! still do the work its applications need.

use crate::database::{DbSession, Statement};
use crate::Result;
use async_trait::async_trait;

/// A check run on a session opened with the pending credential.
#[async_trait]
pub trait PermissionProbe: Send + Sync {
    /// Runs the check.
    ///
    /// # Errors
    ///
    /// Any error fails the test step. The session is closed by the caller.
    async fn check(&self, session: &mut dyn DbSession) -> Result<()>;
}

/// Runs a fixed list of read-only statements.
///
/// The default probe only runs `SELECT NOW()`; deployments should swap in
/// statements that touch the objects their applications use.
#[derive(Debug, Clone)]
pub struct SqlProbe {
    statements: Vec<Statement>,
}

impl SqlProbe {
    /// Creates a probe from raw SQL statements.
    pub fn new<I, S>(statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            statements: statements.into_iter().map(Statement::new).collect(),
        }
    }
}

impl Default for SqlProbe {
    fn default() -> Self {
        Self::new(["SELECT NOW()"])
    }
}

#[async_trait]
impl PermissionProbe for SqlProbe {
    async fn check(&self, session: &mut dyn DbSession) -> Result<()> {
        for statement in &self.statements {
            session.execute(statement).await?;
        }
        Ok(())
    }
}
