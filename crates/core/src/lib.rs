#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, KillfeedError, PipelineError, SinkError};

// 설정
pub use config::{KillfeedConfig, SourceConfig};

// 이벤트
pub use event::{Event, EventMetadata, EventPayload, IngestEvent};

// 파이프라인 trait
pub use pipeline::{EventSink, HealthStatus, Pipeline};

// 도메인 타입
pub use types::{
    ArtifactKind, Coordinates, KillEvent, LogEvent, LogEventKind, PlaytimeSession,
    PresenceSnapshot, SourceId,
};
