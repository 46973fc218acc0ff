//! Dbrotor - process entry point.
//!
//! Reads one rotation invocation, runs it against AWS Secrets Manager and the
//! selected database engine, and exits non-zero if the step failed.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use dbrotor::backends::aws::AwsVault;
use dbrotor::database::DatabaseDriver;
use dbrotor::drivers::mysql::MySqlDriver;
use dbrotor::drivers::postgres::PostgresDriver;
use dbrotor::{EngineKind, RotationConfig, RotationEvent, Rotator};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

/// Single-user database password rotation
#[derive(Parser, Debug)]
#[command(name = "dbrotor")]
#[command(version)]
#[command(about = "Runs one step of a single-user database password rotation", long_about = None)]
struct Args {
    /// Database engine (postgres, mariadb)
    #[arg(long, env = "ROTATION_ENGINE")]
    engine: EngineKind,

    /// Invocation payload as JSON; read from stdin when omitted
    #[arg(long)]
    event: Option<String>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

async fn read_event(arg: Option<String>) -> Result<RotationEvent> {
    let raw = match arg {
        Some(raw) => raw,
        None => {
            let mut raw = String::new();
            tokio::io::stdin()
                .read_to_string(&mut raw)
                .await
                .context("Failed to read invocation payload from stdin")?;
            raw
        }
    };
    serde_json::from_str(&raw).context("Invocation payload is not a valid rotation event")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::from(args.log_level).into())
                .from_env_lossy(),
        )
        .init();

    let config = RotationConfig::from_env().context("Invalid rotation configuration")?;
    config.require_endpoint()?;

    let event = read_event(args.event).await?;
    info!(engine = %args.engine, secret_id = %event.secret_id, step = %event.step, "Starting rotation step");

    let vault = AwsVault::connect(&config)
        .await
        .context("Failed to create Secrets Manager client")?;
    let driver: Arc<dyn DatabaseDriver> = match args.engine {
        EngineKind::Postgres => Arc::new(PostgresDriver::new()),
        EngineKind::MariaDb => Arc::new(MySqlDriver::new(config.mariadb_ca_bundle.clone())),
    };

    let rotator = Rotator::new(Arc::new(vault), driver, args.engine.engine(), config);

    // Failures are logged inside the rotation span by the handler.
    let outcome = rotator.handle(&event).await?;
    info!(?outcome, "Rotation step finished");
    Ok(())
}
