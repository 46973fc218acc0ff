//! AWS Secrets Manager vault.
//!
//! This vault integrates with AWS Secrets Manager using the official AWS SDK.
//!
//! # Requirements
//!
//! - AWS credentials configured via:
//!   - Environment variables (`AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`)
//!   - Shared credentials file (`~/.aws/credentials`)
//!   - IAM execution role
//! - `SECRETS_MANAGER_ENDPOINT` pointing at the regional (or VPC) endpoint
//!
//! # Example
//!
//! ```no_run
//! use dbrotor::backends::aws::AwsVault;
//! use dbrotor::{RotationConfig, SecretsVault};
//!
//! #[tokio::main]
//! async fn main() -> dbrotor::Result<()> {
//!     let config = RotationConfig::from_env()?;
//!     let vault = AwsVault::connect(&config).await?;
//!
//!     let meta = vault.describe_secret("prod/db/app").await?;
//!     println!("{} versions", meta.version_stages.len());
//!
//!     Ok(())
//! }
//! ```

mod vault;

pub use vault::AwsVault;
