//! Configuration errors surface before anything starts.

use killfeed_daemon::cli::{self, DaemonCli};

use crate::helpers::env::*;

async fn load_error(env: &TestEnv) -> String {
    cli::load_config(&env.cli())
        .await
        .expect_err("config should be rejected")
        .to_string()
}

#[tokio::test]
async fn missing_config_file() {
    let cli = DaemonCli {
        config: "/nonexistent/killfeed.toml".into(),
        ..DaemonCli::default()
    };

    let err = cli::load_config(&cli).await.unwrap_err().to_string();

    assert!(err.contains("failed to load config"), "got: {err}");
}

#[tokio::test]
async fn invalid_toml() {
    let env = TestEnv::new();
    std::fs::write(env.config_path(), "[ingest\nsweep_interval_secs = ").unwrap();

    assert!(load_error(&env).await.contains("failed to load config"));
}

#[tokio::test]
async fn invalid_value_fails_validation() {
    let env = TestEnv::new();
    std::fs::write(env.config_path(), "[ingest]\nsweep_interval_secs = 0\n").unwrap();

    assert!(load_error(&env).await.contains("config validation failed"));
}

#[tokio::test]
async fn duplicate_source_ids_fail_validation() {
    let env = TestEnv::new();
    env.write_config(&[
        TestSource::new("eu-1", "10.0.0.5"),
        TestSource::new("eu-1", "10.0.0.6"),
    ]);

    let err = load_error(&env).await;

    assert!(err.contains("duplicate source id"), "got: {err}");
}

#[tokio::test]
async fn unresolvable_password_env() {
    let env = TestEnv::new();
    std::fs::write(
        env.config_path(),
        "[[sources]]\nid = \"eu-1\"\nhost = \"10.0.0.5\"\nserver_id = \"7020\"\nusername = \"ftp\"\npassword_env = \"KILLFEED_E2E_SECRET_NEVER_SET\"\n",
    )
    .unwrap();

    assert!(load_error(&env).await.contains("failed to resolve secrets"));
}
