//! 에러 타입: 도메인별 에러 정의

/// killfeed 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum KillfeedError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 생명주기 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 출력 싱크 에러
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// 수집(ingest) 처리 에러: 하위 크레이트가 메시지로 변환해 전달합니다.
    #[error("ingest error: {0}")]
    Ingest(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// 비밀값을 담은 환경변수가 없음
    #[error("secret env var '{env_key}' for source '{source_id}' is not set")]
    MissingSecret { source_id: String, env_key: String },
}

/// 파이프라인 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),
}

/// 출력 싱크 에러
///
/// 싱크가 이벤트를 받아들이지 못하면 해당 배치의 커서는 전진하지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// 소비자가 종료되어 더 이상 이벤트를 받을 수 없음
    #[error("sink closed")]
    Closed,

    /// 소비자가 이벤트를 거부함
    #[error("sink rejected event: {reason}")]
    Rejected { reason: String },
}
