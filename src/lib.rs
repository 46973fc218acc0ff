//! Dbrotor - Single-user database password rotation.
//!
//! Dbrotor implements the four-step rotation callback protocol of a secrets
//! service (`createSecret`, `setSecret`, `testSecret`, `finishSecret`) for
//! database credentials. The rotation logs in as the database user being
//! rotated and changes that user's own password in place.
//!
//! # Features
//!
//! - **Idempotent Steps**: Every step detects "already done" and succeeds
//! - **Credential Fallback**: Logs in with pending, current, then previous
//! - **TLS with Fallback**: Encrypted transport first, plain only when allowed
//! - **Engine Capabilities**: PostgreSQL and MariaDB share one state machine
//! - **Redacted Logging**: Passwords never reach a log line or error message
//! - **Feature Flags**: Optional vault and driver compilation
//!
//! # Quick Start
//!
//! ```no_run
//! # #[cfg(all(feature = "aws", feature = "mysql"))]
//! # async fn run() -> dbrotor::Result<()> {
//! use dbrotor::backends::aws::AwsVault;
//! use dbrotor::drivers::mysql::MySqlDriver;
//! use dbrotor::{EngineKind, RotationConfig, RotationEvent, Rotator};
//! use std::sync::Arc;
//!
//! let config = RotationConfig::from_env()?;
//! let vault = AwsVault::connect(&config).await?;
//! let driver = MySqlDriver::new(config.mariadb_ca_bundle.clone());
//!
//! let rotator = Rotator::new(Arc::new(vault), Arc::new(driver), EngineKind::MariaDb.engine(), config);
//!
//! let event: RotationEvent = serde_json::from_str(
//!     r#"{"SecretId":"prod/appdb","ClientRequestToken":"0b6f1a4e","Step":"createSecret"}"#,
//! )?;
//! rotator.handle(&event).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Supported Engines
//!
//! | Engine | `engine` tags | Driver Feature | Default Port |
//! |--------|---------------|----------------|--------------|
//! | PostgreSQL | `postgres`, `postgresql`, `aurora-postgresql` | `postgres` | 5432 |
//! | MariaDB | `mariadb` | `mysql` | 3306 |
//!
//! # Feature Flags
//!
//! | Feature | Enables |
//! |---------|---------|
//! | `mock` (default) | In-memory vault and database driver for testing |
//! | `aws` | AWS Secrets Manager vault |
//! | `postgres` | sqlx PostgreSQL driver |
//! | `mysql` | sqlx MariaDB/MySQL driver |
//! | `cli` | The `dbrotor` binary |
//!
//! ```toml
//! [dependencies]
//! dbrotor = { version = "0.1", features = ["aws", "postgres"] }
//! ```

pub mod error;
pub mod config;
pub mod stage;
pub mod credential;
pub mod validation;
pub mod vault;
pub mod backends;
pub mod database;
pub mod drivers;
pub mod engine;
pub mod resolver;
pub mod connection_string;
pub mod probe;
pub mod rotation;
pub mod handler;

pub use config::{PasswordPolicy, RotationConfig};
pub use credential::CredentialRecord;
pub use engine::{Engine, EngineKind};
pub use error::{ErrorKind, Result, RotationError};
pub use handler::{Outcome, RotationEvent, Step};
pub use probe::{PermissionProbe, SqlProbe};
pub use rotation::Rotator;
pub use stage::{SecretMetadata, Stage};
pub use vault::SecretsVault;
