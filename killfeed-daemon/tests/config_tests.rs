//! Configuration precedence tests: file < environment < command line.

use std::path::Path;

use serial_test::serial;
use tempfile::TempDir;

use killfeed_core::config::KillfeedConfig;
use killfeed_daemon::cli::{self, DaemonCli};

fn write_config(dir: &Path, content: &str) -> DaemonCli {
    let path = dir.join("killfeed.toml");
    std::fs::write(&path, content).expect("should write config");
    DaemonCli {
        config: path,
        ..DaemonCli::default()
    }
}

const FILE: &str = r#"
[general]
log_level = "warn"
log_format = "json"

[ingest]
sweep_interval_secs = 120

[[sources]]
id = "eu-1"
host = "10.0.0.5"
server_id = "7020"
username = "ftp"
password_env = "KILLFEED_TEST_EU1_PASSWORD"
"#;

#[tokio::test]
#[serial]
async fn test_file_values_are_loaded() {
    // Given: A config file and the secret in the environment
    let dir = TempDir::new().expect("should create temp dir");
    let cli = write_config(dir.path(), FILE);
    // SAFETY: serialized with the other env tests
    unsafe { std::env::set_var("KILLFEED_TEST_EU1_PASSWORD", "hunter2") };

    // When
    let config = cli::load_config(&cli).await;
    unsafe { std::env::remove_var("KILLFEED_TEST_EU1_PASSWORD") };

    // Then
    let config = config.expect("config should load");
    assert_eq!(config.general.log_level, "warn");
    assert_eq!(config.ingest.sweep_interval_secs, 120);
    assert_eq!(config.sources[0].password, "hunter2");
    assert!(
        !format!("{:?}", config.sources[0]).contains("hunter2"),
        "secrets must not appear in Debug output"
    );
}

#[tokio::test]
#[serial]
async fn test_env_overrides_file_and_cli_overrides_env() {
    // Given
    let dir = TempDir::new().expect("should create temp dir");
    let mut cli = write_config(dir.path(), FILE);
    cli.log_level = Some("debug".to_owned());
    unsafe {
        std::env::set_var("KILLFEED_TEST_EU1_PASSWORD", "hunter2");
        std::env::set_var("KILLFEED_GENERAL_LOG_LEVEL", "error");
        std::env::set_var("KILLFEED_INGEST_SWEEP_INTERVAL_SECS", "60");
    }

    // When
    let config = cli::load_config(&cli).await;
    unsafe {
        std::env::remove_var("KILLFEED_TEST_EU1_PASSWORD");
        std::env::remove_var("KILLFEED_GENERAL_LOG_LEVEL");
        std::env::remove_var("KILLFEED_INGEST_SWEEP_INTERVAL_SECS");
    }

    // Then
    let config = config.expect("config should load");
    assert_eq!(config.general.log_level, "debug", "CLI beats environment");
    assert_eq!(config.ingest.sweep_interval_secs, 60, "environment beats file");
}

#[tokio::test]
#[serial]
async fn test_cli_override_is_still_validated() {
    let dir = TempDir::new().expect("should create temp dir");
    let mut cli = write_config(dir.path(), "");
    cli.log_format = Some("xml".to_owned());

    let err = cli::load_config(&cli).await.unwrap_err().to_string();

    assert!(err.contains("config validation failed"), "got: {err}");
}

#[tokio::test]
#[serial]
async fn test_missing_secret_is_reported() {
    let dir = TempDir::new().expect("should create temp dir");
    let cli = write_config(dir.path(), FILE);

    let err = cli::load_config(&cli).await.unwrap_err().to_string();

    assert!(err.contains("failed to resolve secrets"), "got: {err}");
}

#[tokio::test]
#[serial]
async fn test_empty_file_uses_defaults() {
    let dir = TempDir::new().expect("should create temp dir");
    let cli = write_config(dir.path(), "");

    let config = cli::load_config(&cli).await.expect("empty config is valid");

    assert!(config.ingest.enabled);
    assert_eq!(config.ingest.sweep_interval_secs, 300);
    assert!(!config.metrics.enabled);
    assert!(config.sources.is_empty());
}

#[test]
fn test_example_config_parses() {
    let example = std::fs::read_to_string(
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../killfeed.toml.example"),
    )
    .expect("example config should exist");

    let config = KillfeedConfig::parse(&example).expect("example should parse");

    config.validate().expect("example should validate");
    assert!(!config.sources.is_empty());
}
