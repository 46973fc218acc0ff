//! Connection resolution.
//!
//! Turns a credential record into a database session, or into "no session"
//! when the login fails. Failing to log in is never fatal here; callers decide
//! what an exhausted set of credentials means.

use crate::database::{ConnectParams, DatabaseDriver, DbSession, Transport};
use crate::{CredentialRecord, Engine, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info};

/// Transport to try first, and whether to retry unencrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportPolicy {
    /// Transport for the first attempt.
    pub transport: Transport,
    /// Retry once with [`Transport::Plain`] if the first attempt fails.
    pub fall_back: bool,
}

/// Derives the transport policy from a credential's `ssl` value.
///
/// - absent, or an unrecognized type or value: TLS, falling back to plain
/// - a boolean: exactly that, no fallback
/// - `"true"` / `"false"` in any case: exactly that, no fallback
///
/// ```
/// use dbrotor::resolver::ssl_policy;
/// use dbrotor::database::Transport;
/// use serde_json::json;
///
/// let policy = ssl_policy(Some(&json!("TRUE")));
/// assert_eq!(policy.transport, Transport::Tls);
/// assert!(!policy.fall_back);
/// ```
pub fn ssl_policy(ssl: Option<&Value>) -> TransportPolicy {
    let exact = |tls: bool| TransportPolicy {
        transport: if tls { Transport::Tls } else { Transport::Plain },
        fall_back: false,
    };
    let default = TransportPolicy {
        transport: Transport::Tls,
        fall_back: true,
    };

    match ssl {
        Some(Value::Bool(tls)) => exact(*tls),
        Some(Value::String(s)) => match s.to_lowercase().as_str() {
            "true" => exact(true),
            "false" => exact(false),
            _ => default,
        },
        _ => default,
    }
}

/// Opens sessions for credential records against one engine.
pub struct ConnectionResolver<'a> {
    driver: &'a dyn DatabaseDriver,
    engine: &'a dyn Engine,
    timeout: Duration,
}

impl<'a> ConnectionResolver<'a> {
    /// Creates a resolver bounding every attempt by `timeout`.
    pub fn new(driver: &'a dyn DatabaseDriver, engine: &'a dyn Engine, timeout: Duration) -> Self {
        Self {
            driver,
            engine,
            timeout,
        }
    }

    /// Logs in with `record`.
    ///
    /// Returns `Ok(None)` when every permitted attempt fails to connect or
    /// authenticate.
    ///
    /// # Errors
    ///
    /// Returns [`RotationError::InvalidSecret`](crate::RotationError::InvalidSecret)
    /// if the record's port is malformed.
    pub async fn resolve(&self, record: &CredentialRecord) -> Result<Option<Box<dyn DbSession>>> {
        let port = record.port()?.unwrap_or_else(|| self.engine.default_port());
        let dbname = record
            .dbname
            .clone()
            .or_else(|| self.engine.default_dbname().map(str::to_string));
        let policy = self.engine.transport_policy(record);

        let mut params = ConnectParams {
            host: record.host.clone(),
            port,
            username: record.username.clone(),
            password: record.password.clone(),
            dbname,
            transport: policy.transport,
        };

        if let Some(session) = self.attempt(&params, record).await {
            return Ok(Some(session));
        }
        if !policy.fall_back {
            return Ok(None);
        }

        params.transport = Transport::Plain;
        Ok(self.attempt(&params, record).await)
    }

    async fn attempt(&self, params: &ConnectParams, record: &CredentialRecord) -> Option<Box<dyn DbSession>> {
        let outcome = match tokio::time::timeout(self.timeout, self.driver.connect(params)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(crate::database::ConnectError::new(format!(
                "connection attempt timed out after {:?}",
                self.timeout
            ))),
        };

        match outcome {
            Ok(session) => {
                info!(
                    username = %params.username,
                    host = %params.host,
                    transport = %params.transport,
                    "Successfully established {} connection",
                    params.transport
                );
                Some(session)
            }
            Err(e) => {
                if params.transport.is_encrypted()
                    && self.engine.reports_hostname_mismatch()
                    && e.is_hostname_mismatch()
                {
                    error!(
                        host = %params.host,
                        "Hostname verification failed when establishing SSL/TLS handshake"
                    );
                }
                error!(
                    secret = %record.redacted(),
                    transport = %params.transport,
                    error = %e,
                    "Unable to connect to database"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ssl_absent_or_invalid_falls_back() {
        for ssl in [None, Some(json!("maybe")), Some(json!(1)), Some(json!(null))] {
            let policy = ssl_policy(ssl.as_ref());
            assert_eq!(policy.transport, Transport::Tls, "{:?}", ssl);
            assert!(policy.fall_back, "{:?}", ssl);
        }
    }

    #[test]
    fn test_ssl_exact_values() {
        assert_eq!(
            ssl_policy(Some(&json!(false))),
            TransportPolicy { transport: Transport::Plain, fall_back: false }
        );
        assert_eq!(
            ssl_policy(Some(&json!(true))),
            TransportPolicy { transport: Transport::Tls, fall_back: false }
        );
        assert_eq!(
            ssl_policy(Some(&json!("False"))),
            TransportPolicy { transport: Transport::Plain, fall_back: false }
        );
        assert_eq!(
            ssl_policy(Some(&json!("TRUE"))),
            TransportPolicy { transport: Transport::Tls, fall_back: false }
        );
    }

    #[cfg(feature = "mock")]
    #[tokio::test(start_paused = true)]
    async fn test_hung_server_times_out_then_falls_back() {
        use crate::drivers::mock::MockDriver;
        use crate::EngineKind;
        use tokio::time::Instant;

        let driver = MockDriver::new();
        driver.set_password("app", "pw").await;
        driver.set_connect_delay(Some(Duration::from_secs(60))).await;

        let engine = EngineKind::MariaDb.engine();
        let resolver = ConnectionResolver::new(&driver, &*engine, Duration::from_secs(5));
        let record = CredentialRecord::parse(
            r#"{"engine":"mariadb","host":"db1","username":"app","password":"pw"}"#,
            &["mariadb"],
        )
        .unwrap();

        let started = Instant::now();
        assert!(resolver.resolve(&record).await.unwrap().is_none());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(60), "{:?}", elapsed);

        let transports: Vec<Transport> = driver.attempts().await.into_iter().map(|a| a.transport).collect();
        assert_eq!(transports, vec![Transport::Tls, Transport::Plain]);
        assert_eq!(driver.open_sessions().await, 0);

        driver.set_connect_delay(Some(Duration::from_secs(1))).await;
        let mut session = resolver.resolve(&record).await.unwrap().expect("slow but in time");
        session.close().await.unwrap();
    }
}
