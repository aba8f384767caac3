//! Long-running daemon: streaming output, SIGHUP-style reload, shutdown.

use std::time::Duration;

use tokio::sync::mpsc;

use killfeed_core::event::EventPayload;
use killfeed_core::types::SourceId;
use killfeed_daemon::orchestrator::DaemonSignal;

use crate::helpers::env::*;
use crate::helpers::output::CapturedOutput;

const WAIT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn daemon_streams_events_and_picks_up_new_sources_on_reload() {
    // Given: two servers on disk, only eu-1 configured
    let env = TestEnv::new();
    env.write_kills("10.0.0.5", "kills.csv", ALICE_KILLS_BOB);
    env.write_kills("10.0.0.6", "kills.csv", CAROL_RELOCATES);
    env.write_config(&[TestSource::new("eu-1", "10.0.0.5")]);
    let mut orchestrator = env.orchestrator().await;
    let output = CapturedOutput::default();
    let (signal_tx, signal_rx) = mpsc::channel(4);

    // When
    let daemon = orchestrator.run_with(output.clone(), signal_rx);
    let driver = async {
        output.wait_for(WAIT, |events| !events.is_empty()).await;
        assert!(env.pid_path().exists(), "PID file should exist while running");

        env.write_config(&[
            TestSource::new("eu-1", "10.0.0.5"),
            TestSource::new("us-1", "10.0.0.6"),
        ]);
        signal_tx.send(DaemonSignal::Reload).await.unwrap();
        output
            .wait_for(WAIT, |events| {
                events.iter().any(|e| e.source_id == SourceId::from("us-1"))
            })
            .await;

        signal_tx.send(DaemonSignal::Shutdown("SIGTERM")).await.unwrap();
    };
    let (result, ()) = tokio::join!(daemon, driver);

    // Then
    assert!(result.is_ok(), "daemon should exit cleanly: {result:?}");
    assert!(!env.pid_path().exists(), "PID file should be removed on exit");
    assert_eq!(orchestrator.config().sources.len(), 2);

    let events = output.events();
    let eu_kills: Vec<&str> = events
        .iter()
        .filter(|e| e.source_id == SourceId::from("eu-1"))
        .filter_map(|e| match &e.payload {
            EventPayload::Kill(kill) => Some(kill.killer_name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(eu_kills, vec!["Alice"], "repeated sweeps must not re-emit rows");
    assert!(output.kills().iter().any(|k| k.is_suicide && k.weapon == "Menu Suicide"));
}

#[tokio::test]
async fn failed_reload_keeps_running_with_current_sources() {
    let env = TestEnv::new();
    env.write_config(&[TestSource::new("eu-1", "10.0.0.5")]);
    let mut orchestrator = env.orchestrator().await;
    let (signal_tx, signal_rx) = mpsc::channel(4);

    std::fs::write(env.config_path(), "[general]\nlog_level = \"loud\"\n").unwrap();
    signal_tx.send(DaemonSignal::Reload).await.unwrap();
    signal_tx.send(DaemonSignal::Shutdown("SIGINT")).await.unwrap();
    let result = tokio::time::timeout(WAIT, orchestrator.run_with(CapturedOutput::default(), signal_rx))
        .await
        .expect("daemon should stop");

    assert!(result.is_ok());
    assert_eq!(orchestrator.config().sources.len(), 1);
}

#[tokio::test]
async fn second_instance_is_refused_by_pid_file() {
    let env = TestEnv::new();
    env.write_config(&[]);
    std::fs::create_dir_all(env.pid_path().parent().unwrap()).unwrap();
    std::fs::write(env.pid_path(), "4242\n").unwrap();
    let mut orchestrator = env.orchestrator().await;
    let (_signal_tx, signal_rx) = mpsc::channel(1);

    let err = orchestrator
        .run_with(CapturedOutput::default(), signal_rx)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("4242"), "got: {err}");
    assert_eq!(
        std::fs::read_to_string(env.pid_path()).unwrap(),
        "4242\n",
        "existing PID file must be left alone"
    );
}

#[tokio::test]
async fn health_reflects_running_components() {
    let env = TestEnv::new();
    env.write_config(&[TestSource::new("eu-1", "10.0.0.5")]);
    let mut orchestrator = env.orchestrator().await;

    let before = orchestrator.health().await;
    assert!(before.status.is_unhealthy(), "nothing started yet");

    let (signal_tx, signal_rx) = mpsc::channel(1);
    signal_tx.send(DaemonSignal::Shutdown("SIGTERM")).await.unwrap();
    orchestrator
        .run_with(CapturedOutput::default(), signal_rx)
        .await
        .unwrap();

    let after = orchestrator.health().await;
    assert!(after.status.is_unhealthy(), "stopped service is unhealthy");
    let names: Vec<&str> = after.components.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["ingest", "event-writer"]);
}
