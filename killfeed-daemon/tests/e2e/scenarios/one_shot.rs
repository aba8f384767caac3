//! `--once` and `--replay` modes.

use killfeed_core::event::EventPayload;
use killfeed_core::types::LogEventKind;

use crate::helpers::env::*;
use crate::helpers::output::CapturedOutput;

#[tokio::test]
async fn once_writes_kill_rows_as_json_lines() {
    // Given
    let env = TestEnv::new();
    env.write_kills(
        "10.0.0.5",
        "2025.04.30-00.00.00.csv",
        &format!("{ALICE_KILLS_BOB}{CAROL_RELOCATES}"),
    );
    env.write_config(&[TestSource::new("eu-1", "10.0.0.5")]);
    let mut orchestrator = env.orchestrator().await;
    let output = CapturedOutput::default();

    // When
    let report = orchestrator.run_once(output.clone()).await.unwrap();

    // Then
    assert!(report.failed_sources().is_empty());
    let kills = output.kills();
    assert_eq!(kills.len(), 2);
    assert_eq!(kills[0].weapon, "AK-74");
    assert_eq!(kills[0].distance_meters, 150.0);
    assert!(!kills[0].is_suicide);
    assert_eq!(kills[1].weapon, "Menu Suicide");
    assert!(kills[1].is_suicide);
    assert!(!env.pid_path().exists(), "one-shot modes do not write a PID file");
}

#[tokio::test]
async fn once_reports_server_log_and_presence() {
    let env = TestEnv::new();
    env.write_log(
        "10.0.0.5",
        "[2025.05.17-14.30.00:001] Server startup with playersmaxcount=60\n\
         [2025.05.17-14.31.05:456] LogOnline: Login: UniqueId: X, PlatformId: 765\n",
    );
    env.write_config(&[TestSource::new("eu-1", "10.0.0.5").with_log()]);
    let mut orchestrator = env.orchestrator().await;
    let output = CapturedOutput::default();

    orchestrator.run_once(output.clone()).await.unwrap();

    let events = output.events();
    assert!(events.iter().any(|e| matches!(
        &e.payload,
        EventPayload::Log(log) if log.kind == LogEventKind::MaxCapacityReport { max_players: 60 }
    )));
    let last_presence = events
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::Presence(snapshot) => Some(*snapshot),
            _ => None,
        })
        .last()
        .expect("presence should be reported");
    assert_eq!((last_presence.current, last_presence.max), (1, 60));
}

#[tokio::test]
async fn replay_writes_full_history_in_file_order() {
    let env = TestEnv::new();
    env.write_kills("10.0.0.5", "a.csv", ALICE_KILLS_BOB);
    env.write_kills("10.0.0.5", "b.csv", CAROL_RELOCATES);
    env.write_config(&[TestSource::new("eu-1", "10.0.0.5")]);
    let mut orchestrator = env.orchestrator().await;
    let output = CapturedOutput::default();

    let report = orchestrator.replay("eu-1", output.clone()).await.unwrap();

    assert_eq!(report.files, 2);
    let killers: Vec<String> = output.kills().into_iter().map(|k| k.killer_name).collect();
    assert_eq!(killers, vec!["Alice", "Carol"]);
}

#[tokio::test]
async fn replay_of_unknown_source_fails() {
    let env = TestEnv::new();
    env.write_config(&[TestSource::new("eu-1", "10.0.0.5")]);
    let mut orchestrator = env.orchestrator().await;

    let err = orchestrator
        .replay("nope", CapturedOutput::default())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("unknown source: nope"), "got: {err}");
}
