//! AWS Secrets Manager integration tests using LocalStack.
//!
//! These tests require LocalStack to be running on localhost:4566.
//!
//! Run with:
//!   docker run -d -p 4566:4566 localstack/localstack
//!   cargo test --test integration_aws --features aws -- --ignored
//!
//! Or run in CI where LocalStack is configured as a service.

#![cfg(feature = "aws")]

use aws_sdk_secretsmanager::Client;
use dbrotor::backends::aws::AwsVault;
use dbrotor::{PasswordPolicy, RotationConfig, SecretsVault, Stage};

fn localstack_config() -> RotationConfig {
    let endpoint = std::env::var("LOCALSTACK_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4566".to_string());

    RotationConfig::default()
        .with_endpoint(endpoint)
        .with_region("us-east-1")
}

async fn setup_vault() -> (AwsVault, Client) {
    std::env::set_var("AWS_ACCESS_KEY_ID", "test");
    std::env::set_var("AWS_SECRET_ACCESS_KEY", "test");

    let config = localstack_config();
    let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(config.region.clone()))
        .endpoint_url(config.endpoint.clone().unwrap_or_default())
        .load()
        .await;
    let client = Client::new(&sdk_config);

    (AwsVault::from_client(client.clone()), client)
}

async fn create_secret(client: &Client, name: &str, value: &str) -> String {
    let response = client
        .create_secret()
        .name(name)
        .secret_string(value)
        .send()
        .await
        .expect("Failed to create secret");
    response.version_id().unwrap_or_default().to_string()
}

async fn delete_secret(client: &Client, name: &str) {
    client
        .delete_secret()
        .secret_id(name)
        .force_delete_without_recovery(true)
        .send()
        .await
        .ok();
}

#[tokio::test]
#[ignore] // Run only when LocalStack is available
async fn test_aws_describe_and_get_current() {
    let (vault, client) = setup_vault().await;
    let name = "dbrotor-test-describe";
    let v1 = create_secret(&client, name, r#"{"password":"one"}"#).await;

    let metadata = vault.describe_secret(name).await.expect("Failed to describe secret");
    assert!(metadata.has_stage(&v1, Stage::Current));
    assert_eq!(metadata.version_with(Stage::Current), Some(v1.as_str()));

    let value = vault
        .get_secret_value(name, Stage::Current, None)
        .await
        .expect("Failed to get secret");
    assert_eq!(value, r#"{"password":"one"}"#);

    delete_secret(&client, name).await;
}

#[tokio::test]
#[ignore]
async fn test_aws_pending_not_found() {
    let (vault, client) = setup_vault().await;
    let name = "dbrotor-test-pending";
    create_secret(&client, name, "one").await;

    let err = vault
        .get_secret_value(name, Stage::Pending, Some("00000000-0000-0000-0000-000000000000"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = vault.describe_secret("dbrotor-test-nonexistent").await.unwrap_err();
    assert!(err.is_not_found());

    delete_secret(&client, name).await;
}

#[tokio::test]
#[ignore]
async fn test_aws_put_and_promote_pending() {
    let (vault, client) = setup_vault().await;
    let name = "dbrotor-test-promote";
    let v1 = create_secret(&client, name, "one").await;
    let v2 = uuid::Uuid::new_v4().to_string();

    vault
        .put_secret_value(name, &v2, "two", &[Stage::Pending])
        .await
        .expect("Failed to put pending version");
    assert_eq!(
        vault.get_secret_value(name, Stage::Pending, Some(&v2)).await.unwrap(),
        "two"
    );

    vault
        .update_secret_version_stage(name, Stage::Current, Some(&v2), Some(&v1))
        .await
        .expect("Failed to move current stage");
    vault
        .update_secret_version_stage(name, Stage::Pending, None, Some(&v2))
        .await
        .expect("Failed to remove pending stage");

    let metadata = vault.describe_secret(name).await.unwrap();
    assert!(metadata.has_stage(&v2, Stage::Current));
    assert!(!metadata.has_stage(&v2, Stage::Pending));
    assert!(metadata.has_stage(&v1, Stage::Previous));

    delete_secret(&client, name).await;
}

#[tokio::test]
#[ignore]
async fn test_aws_random_password() {
    let (vault, _client) = setup_vault().await;

    let policy = PasswordPolicy {
        length: 24,
        exclude_punctuation: true,
        ..PasswordPolicy::default()
    };
    let password = vault
        .get_random_password(&policy)
        .await
        .expect("Failed to generate password");

    assert_eq!(password.chars().count(), 24);
    assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
}
