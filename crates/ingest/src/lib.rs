#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`session`]: 원격 세션 추상화(SFTP, 로컬 디렉토리)와 키별 세션 풀
//! - [`retry`]: 접속 재시도/지수 백오프 정책
//! - [`locator`]: 원격 경로 템플릿과 후보 파일 목록
//! - [`cursor`]: 소스/아티팩트별 읽기 위치 (바이트 오프셋, 줄 식별자 집합)
//! - [`lines`]: 줄 분리와 UTF-8/Latin-1 디코딩
//! - [`parser`]: 킬피드 CSV 행 파서와 서버 로그 패턴 파서
//! - [`normalize`]: 킬 이벤트 정규화 (자살 판정, 사망 원인 이름)
//! - [`presence`]: 서버 로그 기반 접속 현황 추적
//! - [`orchestrator`]: 증분 스윕과 리플레이
//! - [`service`]: 주기 실행 서비스 (Pipeline trait 구현)
//! - [`sink`]: `mpsc` 채널 출력 싱크
//! - [`config`]: 수집기 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입

pub mod config;
pub mod cursor;
pub mod error;
pub mod lines;
pub mod locator;
pub mod normalize;
pub mod orchestrator;
pub mod parser;
pub mod presence;
pub mod retry;
pub mod service;
pub mod session;
pub mod sink;

// --- 주요 타입 re-export ---

// 서비스
pub use service::{IngestService, IngestServiceBuilder};

// 오케스트레이터
pub use orchestrator::{
    IngestOrchestrator, ReplayReport, SourceHealth, SourceReport, SourceStatus, StepOutcome,
    SweepReport,
};

// 설정
pub use config::{EmptyNamePolicy, SweepConfig, SweepConfigBuilder};

// 에러
pub use error::{IngestError, SessionError};

// 세션
pub use session::{
    LocalConnector, RemoteSession, SessionConnector, SessionKey, SessionPool, SftpConnector,
};

// 파서
pub use parser::{KillRowOutcome, KillfeedParser, LinePattern, ServerLogParser};

// 접속 현황
pub use presence::{PresenceTracker, PresenceUpdate};

// 커서
pub use cursor::CursorStore;

// 싱크
pub use sink::ChannelSink;
