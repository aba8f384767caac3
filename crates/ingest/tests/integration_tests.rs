//! 수집 파이프라인 통합 테스트
//!
//! 공개 API(`IngestServiceBuilder` + `LocalConnector`)만으로 디렉토리 트리를
//! 원격 서버처럼 폴링하고, 채널로 나오는 `IngestEvent`를 검증합니다.

use std::path::Path;
use std::time::Duration;

use killfeed_core::config::{KillfeedConfig, SourceConfig};
use killfeed_core::event::{Event, EventPayload, IngestEvent};
use killfeed_core::pipeline::Pipeline;
use killfeed_core::types::{KillEvent, LogEventKind, PlaytimeSession, PresenceSnapshot, SourceId};
use killfeed_ingest::{
    IngestService, IngestServiceBuilder, LocalConnector, StepOutcome, SweepConfigBuilder,
};
use tokio::sync::mpsc;

const KILLS: &str = "10.0.0.5_7020/actual1/deathlogs";
const LOG: &str = "10.0.0.5_7020/Logs/Deadside.log";

const ALICE_KILLS_BOB: &str = "2025.04.30-00.16.49;Alice;1;Bob;2;AK-74;150.0;STEAM;STEAM\n";
const CAROL_RELOCATES: &str =
    "2025.04.30-00.17.00;Carol;3;Carol;3;suicide_by_relocation;0;STEAM;STEAM\n";

fn source(log_enabled: bool) -> SourceConfig {
    KillfeedConfig::parse(&format!(
        r#"
[[sources]]
id = "eu-1"
name = "EU #1"
host = "10.0.0.5"
server_id = "7020"
username = "ftp"
log_enabled = {log_enabled}
"#
    ))
    .unwrap()
    .sources
    .remove(0)
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn append(root: &Path, rel: &str, content: &str) {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(root.join(rel))
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
}

fn service(
    root: &Path,
    sources: Vec<SourceConfig>,
) -> (IngestService<LocalConnector>, mpsc::Receiver<IngestEvent>) {
    let (service, rx) = IngestServiceBuilder::new()
        .config(SweepConfigBuilder::new().sweep_interval_secs(1).build().unwrap())
        .connector(LocalConnector::new(root))
        .sources(sources)
        .build()
        .unwrap();
    (service, rx.unwrap())
}

fn drain(rx: &mut mpsc::Receiver<IngestEvent>) -> Vec<IngestEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn kills(events: &[IngestEvent]) -> Vec<KillEvent> {
    events
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::Kill(kill) => Some(kill.clone()),
            _ => None,
        })
        .collect()
}

fn presence(events: &[IngestEvent]) -> Vec<PresenceSnapshot> {
    events
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::Presence(snapshot) => Some(*snapshot),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn kill_rows_flow_to_the_event_channel() {
    // Given
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        &format!("{KILLS}/2025.04.30-00.00.00.csv"),
        &format!("{ALICE_KILLS_BOB}{CAROL_RELOCATES}"),
    );
    let (service, mut rx) = service(dir.path(), vec![source(false)]);

    // When
    let report = service.run_once().await;

    // Then
    let events = drain(&mut rx);
    let kills = kills(&events);
    assert_eq!(kills.len(), 2);

    let alice = &kills[0];
    assert_eq!(alice.killer_name, "Alice");
    assert_eq!(alice.victim_name, "Bob");
    assert_eq!(alice.weapon, "AK-74");
    assert_eq!(alice.distance_meters, 150.0);
    assert!(!alice.is_suicide);

    let carol = &kills[1];
    assert_eq!(carol.weapon, "Menu Suicide");
    assert!(carol.is_suicide);

    assert!(events.iter().all(|e| e.source_id == SourceId::from("eu-1")));
    assert!(events.iter().all(|e| e.metadata().trace_id == report.trace_id));
    assert!(events.iter().all(|e| e.event_type() == "kill"));
    assert_eq!(report.events(), 2);
}

#[tokio::test]
async fn retained_cursor_makes_second_pass_empty() {
    let dir = tempfile::tempdir().unwrap();
    let file = format!("{KILLS}/kills.csv");
    write(dir.path(), &file, ALICE_KILLS_BOB);
    let (service, mut rx) = service(dir.path(), vec![source(false)]);

    service.run_once().await;
    assert_eq!(kills(&drain(&mut rx)).len(), 1);

    let again = service.run_once().await;
    assert_eq!(again.events(), 0);
    assert!(drain(&mut rx).is_empty());

    append(dir.path(), &file, CAROL_RELOCATES);
    service.run_once().await;
    let new = kills(&drain(&mut rx));
    assert_eq!(new.len(), 1);
    assert_eq!(new[0].killer_name, "Carol");
}

#[tokio::test]
async fn malformed_row_is_skipped_and_batch_continues() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        &format!("{KILLS}/kills.csv"),
        &format!("2025.04.30-00.16.00;a;b;c;d\n{ALICE_KILLS_BOB}"),
    );
    let (service, mut rx) = service(dir.path(), vec![source(false)]);

    let report = service.run_once().await;

    let source_report = report.source(&SourceId::from("eu-1")).unwrap();
    assert_eq!(
        source_report.killfeed,
        StepOutcome::Completed {
            events: 1,
            malformed: 1
        }
    );
    assert_eq!(kills(&drain(&mut rx))[0].weapon, "AK-74");
}

#[tokio::test]
async fn server_log_produces_log_presence_and_playtime_events() {
    // Given
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        LOG,
        "[2025.05.17-14.30.15:123] Player X queued at position 1\n\
         [2025.05.17-14.31.05:456] LogOnline: Login: UniqueId: X, PlatformId: 765\n\
         [2025.05.17-15.45.30:890] LogOnline: Logout: UniqueId: X\n",
    );
    let (service, mut rx) = service(dir.path(), vec![source(true)]);

    // When
    service.run_once().await;

    // Then
    let events = drain(&mut rx);
    let log_kinds: Vec<&str> = events
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::Log(log) => Some(log.kind.name()),
            _ => None,
        })
        .collect();
    assert_eq!(
        log_kinds,
        vec!["player_queued", "player_joined", "player_disconnected"]
    );

    let pairs: Vec<(usize, usize)> = presence(&events)
        .iter()
        .map(|s| (s.queued, s.current))
        .collect();
    assert_eq!(pairs, vec![(1, 0), (0, 1), (0, 0)]);

    let ended: Vec<i64> = events
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::Playtime(session @ PlaytimeSession::Ended { .. }) => {
                Some(session.minutes())
            }
            _ => None,
        })
        .collect();
    assert_eq!(ended, vec![74]);
}

#[tokio::test]
async fn unchanged_log_emits_no_duplicate_presence() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        LOG,
        "[2025.05.17-14.31.05:456] LogOnline: Login: UniqueId: X, PlatformId: 765\n",
    );
    let (service, mut rx) = service(dir.path(), vec![source(true)]);

    service.run_once().await;
    assert_eq!(presence(&drain(&mut rx)).len(), 1);

    // 같은 플레이어의 중복 접속 줄은 현황을 바꾸지 않음
    append(
        dir.path(),
        LOG,
        "[2025.05.17-14.32.00:000] LogOnline: Login: UniqueId: X, PlatformId: 765\n",
    );
    service.run_once().await;

    let events = drain(&mut rx);
    assert!(presence(&events).is_empty());
    assert!(matches!(
        events[0].payload,
        EventPayload::Log(ref log) if matches!(log.kind, LogEventKind::PlayerJoined { .. })
    ));
}

#[tokio::test]
async fn replay_then_sweep_does_not_duplicate() {
    // Given: history spread over two files
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), &format!("{KILLS}/2025.04.29-00.00.00.csv"), ALICE_KILLS_BOB);
    write(dir.path(), &format!("{KILLS}/2025.04.30-00.00.00.csv"), CAROL_RELOCATES);
    let (service, mut rx) = service(dir.path(), vec![source(false)]);

    // When
    let replay = service.replay("eu-1").await.unwrap();
    let sweep = service.run_once().await;

    // Then
    assert_eq!(replay.files, 2);
    assert_eq!(replay.events, 2);
    assert_eq!(sweep.events(), 0);
    let events = drain(&mut rx);
    assert_eq!(kills(&events).len(), 2);
    assert!(events.iter().all(|e| e.metadata().trace_id == replay.trace_id));
}

#[tokio::test]
async fn running_service_picks_up_appended_rows() {
    // Given
    let dir = tempfile::tempdir().unwrap();
    let file = format!("{KILLS}/kills.csv");
    write(dir.path(), &file, ALICE_KILLS_BOB);
    let (mut service, mut rx) = service(dir.path(), vec![source(false)]);
    service.start().await.unwrap();

    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(first.payload, EventPayload::Kill(ref k) if k.killer_name == "Alice"));

    // When
    append(dir.path(), &file, CAROL_RELOCATES);

    // Then: the next tick delivers only the new row
    let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    service.stop().await.unwrap();
    assert!(matches!(second.payload, EventPayload::Kill(ref k) if k.is_suicide));
    assert_ne!(first.metadata.trace_id, second.metadata.trace_id);
}

#[tokio::test]
async fn events_serialize_as_tagged_json() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), &format!("{KILLS}/kills.csv"), ALICE_KILLS_BOB);
    let (service, mut rx) = service(dir.path(), vec![source(false)]);

    service.run_once().await;
    let event = rx.try_recv().unwrap();

    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["source_id"], "eu-1");
    assert_eq!(json["payload"]["kind"], "kill");
    assert_eq!(json["payload"]["data"]["weapon"], "AK-74");
    let back: IngestEvent = serde_json::from_value(json).unwrap();
    assert_eq!(back, event);
}

#[tokio::test]
async fn missing_directories_are_healthy_and_quiet() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, mut rx) = service(dir.path(), vec![source(true)]);

    let report = service.run_once().await;
    service.start().await.unwrap();
    let health = service.health_check().await;
    service.stop().await.unwrap();

    assert!(report.failed_sources().is_empty());
    assert!(drain(&mut rx).is_empty());
    assert!(health.is_healthy());
}
