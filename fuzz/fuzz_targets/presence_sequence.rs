#![no_main]

use arbitrary::Arbitrary;
use chrono::{TimeZone, Utc};
use killfeed_core::types::{LogEvent, LogEventKind};
use killfeed_ingest::presence::PresenceState;
use libfuzzer_sys::fuzz_target;

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    default_max: u32,
    /// 적용할 이벤트 목록 (최대 64개로 제한)
    steps: Vec<FuzzStep>,
}

#[derive(Arbitrary, Debug)]
struct FuzzStep {
    /// 작은 이름 공간에서 골라 충돌이 자주 나도록 함
    player: u8,
    action: FuzzAction,
    value: u32,
}

#[derive(Arbitrary, Debug)]
enum FuzzAction {
    Queued,
    Joined,
    Disconnected,
    JoinFailed,
    MaxCapacity,
}

impl FuzzStep {
    fn to_event(&self, second: i64) -> LogEvent {
        let player = format!("p{}", self.player % 8);
        let kind = match self.action {
            FuzzAction::Queued => LogEventKind::PlayerQueued {
                player,
                position: self.value,
            },
            FuzzAction::Joined => LogEventKind::PlayerJoined {
                player,
                platform_id: "steam".to_owned(),
            },
            FuzzAction::Disconnected => LogEventKind::PlayerDisconnected { player },
            FuzzAction::JoinFailed => LogEventKind::PlayerJoinFailed { player },
            FuzzAction::MaxCapacity => LogEventKind::MaxCapacityReport {
                max_players: self.value,
            },
        };
        let timestamp = Utc
            .timestamp_opt(1_700_000_000 + second, 0)
            .single()
            .unwrap_or_default();
        LogEvent::new(timestamp, kind)
    }
}

fuzz_target!(|input: FuzzInput| {
    let mut state = PresenceState::new(input.default_max);

    for (i, step) in input.steps.iter().take(64).enumerate() {
        let event = step.to_event(i as i64);
        let update = state.apply(&event);

        // 같은 이벤트를 다시 적용해도 스냅샷은 바뀌지 않음
        let again = state.apply(&event);
        assert!(again.snapshot.is_none());
        assert!(again.playtime.is_none());

        let snapshot = state.snapshot();
        if let Some(emitted) = update.snapshot {
            assert_eq!(emitted, snapshot);
        }
        assert!(snapshot.current <= 8);
        assert!(snapshot.queued <= 8);
    }
});
