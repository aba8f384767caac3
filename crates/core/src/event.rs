//! 이벤트 봉투: 출력 싱크로 전달되는 메시지의 기본 단위
//!
//! 수집기가 만든 킬/로그/접속 현황/플레이 세션 이벤트는 [`IngestEvent`]로 감싸져
//! 소스 식별자와 추적 메타데이터를 함께 싣고 `tokio::mpsc` 채널로 흘러갑니다.
//! 같은 스윕에서 나온 이벤트는 같은 `trace_id`를 공유합니다.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{KillEvent, LogEvent, PlaytimeSession, PresenceSnapshot, SourceId};

// --- 모듈명 상수 ---

/// 수집 모듈명
pub const MODULE_INGEST: &str = "ingest";

// --- 이벤트 타입 상수 ---

/// 킬 이벤트 타입
pub const EVENT_TYPE_KILL: &str = "kill";
/// 서버 로그 이벤트 타입
pub const EVENT_TYPE_LOG: &str = "log";
/// 접속 현황 이벤트 타입
pub const EVENT_TYPE_PRESENCE: &str = "presence";
/// 플레이 세션 이벤트 타입
pub const EVENT_TYPE_PLAYTIME: &str = "playtime";

/// 이벤트 메타데이터: 모든 이벤트에 공통으로 포함되는 추적 정보
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// 수집기가 이벤트를 만든 시각
    pub received_at: DateTime<Utc>,
    /// 이벤트를 생성한 모듈명
    pub source_module: String,
    /// 추적 ID: 같은 스윕/리플레이에서 나온 이벤트를 연결합니다
    pub trace_id: String,
}

impl EventMetadata {
    /// 기존 trace_id를 사용하여 새 메타데이터를 생성합니다.
    pub fn new(source_module: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            received_at: Utc::now(),
            source_module: source_module.into(),
            trace_id: trace_id.into(),
        }
    }

    /// 새로운 UUID v4 trace_id로 메타데이터를 만듭니다.
    pub fn with_new_trace(source_module: impl Into<String>) -> Self {
        Self::new(source_module, uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for EventMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] source={} trace={}",
            self.received_at.timestamp(),
            self.source_module,
            self.trace_id,
        )
    }
}

/// 모든 이벤트가 구현해야 하는 기본 trait
///
/// `Send + Sync + 'static` 바운드로 `tokio::mpsc` 채널을 통한 전송을 보장합니다.
pub trait Event: Send + Sync + 'static {
    /// 이벤트 고유 ID (UUID v4)
    fn event_id(&self) -> &str;

    /// 이벤트 메타데이터
    fn metadata(&self) -> &EventMetadata;

    /// 이벤트 타입명 (로깅 및 라우팅에 사용)
    fn event_type(&self) -> &str;
}

/// 이벤트 페이로드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    Kill(KillEvent),
    Log(LogEvent),
    Presence(PresenceSnapshot),
    Playtime(PlaytimeSession),
}

/// 출력 싱크로 전달되는 이벤트 봉투
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestEvent {
    /// 이벤트 고유 ID
    pub id: String,
    /// 이벤트 메타데이터
    pub metadata: EventMetadata,
    /// 이벤트를 만든 원격 소스
    pub source_id: SourceId,
    /// 페이로드
    pub payload: EventPayload,
}

impl IngestEvent {
    /// 기존 trace에 연결된 이벤트를 생성합니다.
    pub fn with_trace(
        source_id: SourceId,
        payload: EventPayload,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::new(MODULE_INGEST, trace_id),
            source_id,
            payload,
        }
    }

    /// 새로운 trace를 시작하는 이벤트를 생성합니다.
    pub fn new(source_id: SourceId, payload: EventPayload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::with_new_trace(MODULE_INGEST),
            source_id,
            payload,
        }
    }
}

impl Event for IngestEvent {
    fn event_id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn event_type(&self) -> &str {
        match self.payload {
            EventPayload::Kill(_) => EVENT_TYPE_KILL,
            EventPayload::Log(_) => EVENT_TYPE_LOG,
            EventPayload::Presence(_) => EVENT_TYPE_PRESENCE,
            EventPayload::Playtime(_) => EVENT_TYPE_PLAYTIME,
        }
    }
}

impl fmt::Display for IngestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short_id = &self.id[..8.min(self.id.len())];
        match &self.payload {
            EventPayload::Kill(kill) => {
                write!(f, "KillEvent[{short_id}] source={} {kill}", self.source_id)
            }
            EventPayload::Log(log) => write!(
                f,
                "LogEvent[{short_id}] source={} type={}",
                self.source_id,
                log.kind.name()
            ),
            EventPayload::Presence(snapshot) => write!(
                f,
                "PresenceEvent[{short_id}] source={} {snapshot}",
                self.source_id
            ),
            EventPayload::Playtime(session) => write!(
                f,
                "PlaytimeEvent[{short_id}] source={} player={}",
                self.source_id,
                session.player()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> PresenceSnapshot {
        PresenceSnapshot {
            current: 3,
            max: 50,
            queued: 1,
        }
    }

    #[test]
    fn metadata_new_trace_generates_uuid() {
        let a = EventMetadata::with_new_trace(MODULE_INGEST);
        let b = EventMetadata::with_new_trace(MODULE_INGEST);
        assert_ne!(a.trace_id, b.trace_id);
        assert_eq!(a.trace_id.len(), 36);
        assert_eq!(a.source_module, "ingest");
    }

    #[test]
    fn events_in_same_trace_share_trace_id() {
        let first = IngestEvent::with_trace(
            SourceId::from("eu-1"),
            EventPayload::Presence(snapshot()),
            "trace-1",
        );
        let second = IngestEvent::with_trace(
            SourceId::from("eu-1"),
            EventPayload::Presence(snapshot()),
            "trace-1",
        );
        assert_eq!(first.metadata.trace_id, second.metadata.trace_id);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn event_type_follows_payload() {
        let event = IngestEvent::new(SourceId::from("eu-1"), EventPayload::Presence(snapshot()));
        assert_eq!(event.event_type(), EVENT_TYPE_PRESENCE);
        assert!(event.to_string().starts_with("PresenceEvent["));
    }

    #[test]
    fn envelope_serializes_to_json_with_kind_tag() {
        let event = IngestEvent::new(SourceId::from("eu-1"), EventPayload::Presence(snapshot()));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["source_id"], "eu-1");
        assert_eq!(json["payload"]["kind"], "presence");
        assert_eq!(json["payload"]["data"]["current"], 3);
    }

    #[test]
    fn event_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<IngestEvent>();
    }
}
