//! 수집기 에러 타입
//!
//! [`SessionError`]는 원격 세션(접속, stat, 디렉토리 나열, 읽기)에서 발생하는 에러이고,
//! [`IngestError`]는 수집기 내부의 나머지 에러를 포괄합니다.
//! `From<IngestError> for KillfeedError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.
//!
//! 줄 단위 파싱 실패는 에러가 아니라 값([`crate::parser::killfeed::KillRowOutcome`])으로 표현됩니다.

use killfeed_core::error::{KillfeedError, SinkError};

/// 원격 세션 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// 인증 실패: 같은 자격 증명으로는 재시도해도 성공할 수 없음
    #[error("authentication failed for {user}@{host}: {reason}")]
    Auth {
        host: String,
        user: String,
        reason: String,
    },

    /// 네트워크/프로토콜 수준 접속 실패
    #[error("host {host} unreachable: {reason}")]
    Unreachable { host: String, reason: String },

    /// 접속 시도 타임아웃
    #[error("connection to {host} timed out after {secs}s")]
    Timeout { host: String, secs: u64 },

    /// 원격 경로 없음
    #[error("remote path not found: {path}")]
    NotFound { path: String },

    /// 원격 경로 권한 없음
    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    /// 열린 세션에서의 I/O 실패
    #[error("remote io error on {path}: {reason}")]
    Io { path: String, reason: String },

    /// 세션이 닫혀 있음
    #[error("session closed")]
    Closed,
}

impl SessionError {
    /// 접속 재시도로 회복될 수 있는 에러인지 여부
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unreachable { .. } | Self::Timeout { .. } | Self::Io { .. } | Self::Closed
        )
    }

    /// 풀에 캐시된 세션을 버려야 하는 에러인지 여부
    ///
    /// 파일이 없거나 권한이 없는 것은 세션 자체의 문제가 아닙니다.
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            Self::Unreachable { .. } | Self::Timeout { .. } | Self::Io { .. } | Self::Closed
        )
    }

    /// "데이터 없음"으로 취급할 에러인지 여부
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::PermissionDenied { .. })
    }

    /// 메트릭/로그 레이블
    pub fn label(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Unreachable { .. } => "unreachable",
            Self::Timeout { .. } => "timeout",
            Self::NotFound { .. } => "not_found",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::Io { .. } => "io",
            Self::Closed => "closed",
        }
    }
}

/// 수집기 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// 원격 세션 에러
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// 출력 싱크가 이벤트를 받지 않음
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 설정에 없는 소스
    #[error("unknown source: {0}")]
    UnknownSource(String),

    /// 같은 소스/아티팩트 작업이 이미 진행 중
    #[error("step already running for source {source_id} ({artifact})")]
    Busy { source_id: String, artifact: String },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl IngestError {
    /// 메트릭/헬스 레이블
    pub fn label(&self) -> &'static str {
        match self {
            Self::Session(err) => err.label(),
            Self::Sink(_) => "sink",
            Self::Config { .. } => "config",
            Self::UnknownSource(_) => "unknown_source",
            Self::Busy { .. } => "busy",
            Self::Channel(_) => "channel",
            Self::Regex(_) => "regex",
        }
    }
}

impl From<IngestError> for KillfeedError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Sink(sink) => KillfeedError::Sink(sink),
            other => KillfeedError::Ingest(other.to_string()),
        }
    }
}
