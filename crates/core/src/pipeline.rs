//! 파이프라인 trait: 모듈 확장 포인트 정의
//!
//! - [`Pipeline`]: 장기 실행 서비스의 생명주기 (start / stop / health_check)
//! - [`EventSink`]: 수집 결과를 받아 가는 외부 소비자 계약
//! - [`HealthStatus`]: 헬스 체크 결과

use std::fmt;
use std::future::Future;

use serde::Serialize;

use crate::error::{KillfeedError, SinkError};
use crate::types::{KillEvent, LogEvent, PlaytimeSession, PresenceSnapshot, SourceId};

/// 서비스 헬스 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 일부 기능 저하 (일부 소스 실패 등)
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 장기 실행 서비스의 생명주기 trait
///
/// `start`는 백그라운드 태스크를 띄우고 즉시 반환하며,
/// `stop`은 태스크가 정리될 때까지 기다립니다.
pub trait Pipeline: Send + Sync {
    /// 서비스를 시작합니다. 이미 실행 중이면 에러를 반환합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), KillfeedError>> + Send;

    /// 서비스를 정지합니다. 실행 중이 아니면 에러를 반환합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), KillfeedError>> + Send;

    /// 현재 헬스 상태를 반환합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// 수집 결과 출력 계약
///
/// 통계 저장소/알림 계층 등 외부 소비자가 구현합니다.
/// 크래시 후 재시작하면 같은 이벤트가 다시 전달될 수 있으므로
/// 구현체는 중복 제거 또는 멱등 갱신을 해야 합니다.
///
/// 어떤 호출이든 `Err`를 반환하면 수집기는 해당 지점에서 배치를 멈추고
/// 이미 수락된 부분까지만 커서를 전진시킵니다.
pub trait EventSink: Send + Sync + 'static {
    /// 새 스윕/리플레이 시작 알림 (기본: 무시)
    ///
    /// 이후 전달되는 이벤트를 같은 추적 ID로 묶을 때 사용합니다.
    fn on_sweep_started(&self, _trace_id: &str) {}

    /// 킬 이벤트 전달
    fn on_kill_event(
        &self,
        source: &SourceId,
        event: KillEvent,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// 서버 로그 이벤트 전달
    fn on_log_event(
        &self,
        source: &SourceId,
        event: LogEvent,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// 접속 현황 변경 전달
    fn on_presence_changed(
        &self,
        source: &SourceId,
        snapshot: PresenceSnapshot,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// 플레이 세션 경계 전달 (기본: 무시)
    fn on_playtime_session(
        &self,
        _source: &SourceId,
        _session: PlaytimeSession,
    ) -> impl Future<Output = Result<(), SinkError>> + Send {
        async { Ok(()) }
    }
}
