//! Mock rotation example.
//!
//! Walks one secret through all four rotation steps against the in-memory
//! vault and database, printing the staging labels after each step.
//!
//! Run with: cargo run --example mock_rotation

use dbrotor::backends::mock::MockVault;
use dbrotor::drivers::mock::MockDriver;
use dbrotor::{EngineKind, RotationConfig, RotationEvent, Rotator, Stage, Step};
use std::sync::Arc;

const SECRET: &str = "prod/appdb";

#[tokio::main]
async fn main() -> dbrotor::Result<()> {
    println!("=== Mock Rotation Example ===\n");

    let vault = Arc::new(MockVault::new());
    let payload = r#"{"engine":"mariadb","host":"db1","username":"app","password":"initial","dbname":"appdb"}"#;
    vault.seed_version(SECRET, "v1", payload, &[Stage::Current]).await;

    let driver = MockDriver::new();
    driver.set_password("app", "initial").await;

    let rotator = Rotator::new(
        vault.clone(),
        Arc::new(driver.clone()),
        EngineKind::MariaDb.engine(),
        RotationConfig::default(),
    );

    // The service labels a fresh version pending before calling createSecret.
    let token = vault.begin_rotation(SECRET).await;
    println!("Rotating {} to version {}", SECRET, token);

    for step in [Step::Create, Step::Set, Step::Test, Step::Finish] {
        let outcome = rotator.handle(&RotationEvent::new(SECRET, &token, step)).await?;
        println!(
            "   ✓ {:<13} {:?}  new: {:?}  old: {:?}",
            step.as_str(),
            outcome,
            vault.stages(SECRET, &token).await,
            vault.stages(SECRET, "v1").await,
        );
    }

    let live = driver.password_of("app").await.unwrap_or_default();
    println!("\nDatabase password changed: {}", live != "initial");
    println!("Connection attempts: {}", driver.attempts().await.len());

    Ok(())
}
