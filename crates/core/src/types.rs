//! 도메인 타입: 시스템 전역에서 사용되는 공통 타입
//!
//! 수집기가 만들어 내는 킬 이벤트, 서버 로그 이벤트, 접속 현황 스냅샷을 정의합니다.
//! 모든 이벤트는 생성 후 불변이며 출력 싱크로 한 번 전달된 뒤 폐기됩니다.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 원격 소스 식별자
///
/// 설정의 `[[sources]].id` 값입니다. 커서, 접속 현황, 헬스 상태가 모두 이 키로 분할됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// 새 소스 식별자를 생성합니다.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// 문자열 참조를 반환합니다.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for SourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// 폴링 대상 아티팩트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// 킬피드 CSV 디렉토리
    Killfeed,
    /// 단일 서버 로그 파일
    ServerLog,
}

impl ArtifactKind {
    /// 로그/메트릭 레이블에 쓰이는 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Killfeed => "killfeed",
            Self::ServerLog => "server_log",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 월드 좌표 (게임 맵 기준)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X={:.1} Y={:.1}", self.x, self.y)
    }
}

/// 킬피드 한 행에서 만들어진 킬 이벤트
///
/// CSV 파서가 필드를 채우고, 정규화기가 `weapon`과 `is_suicide`를 확정합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillEvent {
    /// 킬 발생 시각 (UTC)
    pub timestamp: DateTime<Utc>,
    /// 가해자 ID
    pub killer_id: String,
    /// 가해자 이름
    pub killer_name: String,
    /// 피해자 ID
    pub victim_id: String,
    /// 피해자 이름
    pub victim_name: String,
    /// 무기 또는 사망 원인
    pub weapon: String,
    /// 교전 거리 (미터)
    pub distance_meters: f64,
    /// 가해자 플랫폼 (STEAM 등)
    pub killer_platform: String,
    /// 피해자 플랫폼
    pub victim_platform: String,
    /// 자살 여부
    pub is_suicide: bool,
}

impl fmt::Display for KillEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_suicide {
            write!(
                f,
                "{} {} died ({})",
                self.timestamp.format("%Y-%m-%d %H:%M:%S"),
                self.victim_name,
                self.weapon,
            )
        } else {
            write!(
                f,
                "{} {} killed {} with {} at {:.1}m",
                self.timestamp.format("%Y-%m-%d %H:%M:%S"),
                self.killer_name,
                self.victim_name,
                self.weapon,
                self.distance_meters,
            )
        }
    }
}

/// 서버 로그 한 줄에서 만들어진 이벤트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// 로그 줄 앞머리의 타임스탬프 (밀리초 포함, UTC)
    pub timestamp: DateTime<Utc>,
    /// 이벤트 종류와 종류별 필드
    #[serde(flatten)]
    pub kind: LogEventKind,
}

impl LogEvent {
    pub fn new(timestamp: DateTime<Utc>, kind: LogEventKind) -> Self {
        Self { timestamp, kind }
    }
}

/// 서버 로그 이벤트 종류
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEventKind {
    /// 플레이어가 대기열에 들어감
    PlayerQueued { player: String, position: u32 },
    /// 플레이어 접속 완료
    PlayerJoined { player: String, platform_id: String },
    /// 플레이어 접속 종료
    PlayerDisconnected { player: String },
    /// 접속 실패 (타임아웃 등)
    PlayerJoinFailed { player: String },
    /// 서버가 보고한 대기열 길이
    QueueSizeReport { size: u32 },
    /// 서버 최대 수용 인원
    MaxCapacityReport { max_players: u32 },
    /// 보급품 수송기 비행
    AirdropFlying { location: Coordinates },
    /// 미션 시작
    MissionStarted {
        mission: String,
        level: u32,
        location: Option<Coordinates>,
    },
    /// 상인 등장
    TraderSpawned {
        trader: String,
        location: Option<Coordinates>,
    },
    /// 헬리콥터 추락
    HelicopterCrash { location: Coordinates },
    /// 서버 치명적 오류
    ServerFatalError { message: String },
    /// 서버 재시작/종료
    ServerRestart { message: String },
}

impl LogEventKind {
    /// 로그/메트릭 레이블에 쓰이는 이벤트 이름
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlayerQueued { .. } => "player_queued",
            Self::PlayerJoined { .. } => "player_joined",
            Self::PlayerDisconnected { .. } => "player_disconnected",
            Self::PlayerJoinFailed { .. } => "player_join_failed",
            Self::QueueSizeReport { .. } => "queue_size_report",
            Self::MaxCapacityReport { .. } => "max_capacity_report",
            Self::AirdropFlying { .. } => "airdrop_flying",
            Self::MissionStarted { .. } => "mission_started",
            Self::TraderSpawned { .. } => "trader_spawned",
            Self::HelicopterCrash { .. } => "helicopter_crash",
            Self::ServerFatalError { .. } => "server_fatal_error",
            Self::ServerRestart { .. } => "server_restart",
        }
    }

    /// 접속 현황에 영향을 주는 이벤트인지 여부
    pub fn affects_presence(&self) -> bool {
        matches!(
            self,
            Self::PlayerQueued { .. }
                | Self::PlayerJoined { .. }
                | Self::PlayerDisconnected { .. }
                | Self::PlayerJoinFailed { .. }
                | Self::MaxCapacityReport { .. }
        )
    }
}

/// 서버 접속 현황 스냅샷
///
/// 값이 직전 스냅샷과 같으면 방출되지 않습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    /// 현재 접속 인원
    pub current: usize,
    /// 최대 수용 인원
    pub max: u32,
    /// 대기열 인원
    pub queued: usize,
}

impl PresenceSnapshot {
    /// 채널 이름 등 표시용 레이블을 만듭니다.
    ///
    /// 대기열이 비어 있으면 `"<이름> <현재>/<최대>"`, 아니면
    /// `"<이름> <현재>/<최대> with <대기> in queue"` 형식입니다.
    pub fn channel_label(&self, server_name: &str) -> String {
        if self.queued > 0 {
            format!(
                "{server_name} {}/{} with {} in queue",
                self.current, self.max, self.queued
            )
        } else {
            format!("{server_name} {}/{}", self.current, self.max)
        }
    }
}

impl fmt::Display for PresenceSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} queued={}", self.current, self.max, self.queued)
    }
}

/// 플레이 세션 경계
///
/// 보상 계산 등 외부 소비자가 접속 시간 집계에 사용합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum PlaytimeSession {
    /// 오프라인이던 플레이어가 접속함
    Started { player: String, at: DateTime<Utc> },
    /// 온라인이던 플레이어가 접속을 끊음
    Ended {
        player: String,
        joined_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
}

impl PlaytimeSession {
    pub fn player(&self) -> &str {
        match self {
            Self::Started { player, .. } | Self::Ended { player, .. } => player,
        }
    }

    /// 종료된 세션의 접속 시간(분). 시작 이벤트이거나 시각이 역전되면 0입니다.
    pub fn minutes(&self) -> i64 {
        match self {
            Self::Started { .. } => 0,
            Self::Ended { joined_at, at, .. } => (*at - *joined_at).num_minutes().max(0),
        }
    }
}
