//! 수집기 설정
//!
//! [`SweepConfig`]는 core의 [`IngestConfig`](killfeed_core::config::IngestConfig)를
//! 기반으로 수집기 내부에서 쓰는 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use killfeed_core::config::KillfeedConfig;
//! use killfeed_ingest::config::SweepConfig;
//!
//! let core_config = KillfeedConfig::default();
//! let config = SweepConfig::from_core(&core_config.ingest)?;
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::retry::RetryPolicy;

/// 킬피드 행의 가해자/피해자 이름이 비어 있을 때의 처리 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyNamePolicy {
    /// 잘못된 행으로 건너뜀 (기본값)
    #[default]
    Malformed,
    /// 양쪽 ID가 같은 행(자기 자신)에 한해 비어 있는 이름을 반대편 이름으로 채움
    FillFromCounterpart,
}

impl EmptyNamePolicy {
    /// 설정 문자열을 해석합니다.
    pub fn parse(value: &str) -> Result<Self, IngestError> {
        match value {
            "malformed" => Ok(Self::Malformed),
            "fill_from_counterpart" => Ok(Self::FillFromCounterpart),
            other => Err(IngestError::Config {
                field: "empty_name_policy".to_owned(),
                reason: format!("unknown policy '{other}'"),
            }),
        }
    }
}

/// 수집기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 스윕 주기 (초)
    pub sweep_interval_secs: u64,
    /// 서버 로그 파일 이름
    pub log_file_name: String,
    /// 킬피드 CSV 기준 경로
    pub killfeed_subpath: String,
    /// 접속 시도 1회당 타임아웃 (초)
    pub connect_timeout_secs: u64,
    /// 최대 접속 시도 횟수
    pub max_connect_attempts: u32,
    /// 재시도 백오프 기준 (초)
    pub backoff_base_secs: u64,
    /// 한 스텝에서 로그를 읽는 최대 바이트
    pub max_read_bytes: usize,
    /// 소스별 킬피드 줄 식별자 최대 보관 수
    pub max_tracked_lines: usize,
    /// 동시에 처리할 최대 소스 수
    pub max_concurrent_sources: usize,
    /// 기본 최대 인원
    pub default_max_players: u32,
    /// degraded 판정 연속 실패 횟수
    pub degraded_after_failures: u32,
    /// unreachable 판정 연속 실패 횟수
    pub unreachable_after_failures: u32,
    /// 빈 이름 처리 정책
    pub empty_name_policy: EmptyNamePolicy,
    /// 출력 채널 용량
    pub event_channel_capacity: usize,

    // --- 확장 설정 (core에 없는 추가 필드) ---
    /// 킬피드 디렉토리 재귀 탐색 최대 깊이
    pub max_scan_depth: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_secs: 300,
            log_file_name: "Deadside.log".to_owned(),
            killfeed_subpath: "actual1/deathlogs".to_owned(),
            connect_timeout_secs: 30,
            max_connect_attempts: 3,
            backoff_base_secs: 1,
            max_read_bytes: 8 * 1024 * 1024,
            max_tracked_lines: 100_000,
            max_concurrent_sources: 16,
            default_max_players: 50,
            degraded_after_failures: 1,
            unreachable_after_failures: 3,
            empty_name_policy: EmptyNamePolicy::Malformed,
            event_channel_capacity: 4096,
            max_scan_depth: 8,
        }
    }
}

impl SweepConfig {
    /// core의 `IngestConfig`에서 수집기 설정을 생성합니다.
    ///
    /// core 설정에 없는 확장 필드는 기본값이 적용됩니다.
    pub fn from_core(core: &killfeed_core::config::IngestConfig) -> Result<Self, IngestError> {
        let config = Self {
            enabled: core.enabled,
            sweep_interval_secs: core.sweep_interval_secs,
            log_file_name: core.log_file_name.clone(),
            killfeed_subpath: core.killfeed_subpath.clone(),
            connect_timeout_secs: core.connect_timeout_secs,
            max_connect_attempts: core.max_connect_attempts,
            backoff_base_secs: core.backoff_base_secs,
            max_read_bytes: core.max_read_bytes,
            max_tracked_lines: core.max_tracked_lines,
            max_concurrent_sources: core.max_concurrent_sources,
            default_max_players: core.default_max_players,
            degraded_after_failures: core.degraded_after_failures,
            unreachable_after_failures: core.unreachable_after_failures,
            empty_name_policy: EmptyNamePolicy::parse(&core.empty_name_policy)?,
            event_channel_capacity: core.event_channel_capacity,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// 스윕 주기
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// 세션 풀이 사용할 재시도 정책
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_connect_attempts,
            Duration::from_secs(self.backoff_base_secs),
            Duration::from_secs(self.connect_timeout_secs),
        )
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), IngestError> {
        const MAX_INTERVAL_SECS: u64 = 24 * 3600;
        const MAX_SCAN_DEPTH: usize = 32;

        if self.sweep_interval_secs == 0 || self.sweep_interval_secs > MAX_INTERVAL_SECS {
            return Err(config_error(
                "sweep_interval_secs",
                format!("must be 1-{MAX_INTERVAL_SECS}"),
            ));
        }
        if self.log_file_name.is_empty() || self.log_file_name.contains('/') {
            return Err(config_error(
                "log_file_name",
                "must be a plain file name".to_owned(),
            ));
        }
        if self.killfeed_subpath.is_empty()
            || self.killfeed_subpath.split('/').any(|part| part == "..")
        {
            return Err(config_error(
                "killfeed_subpath",
                "must be a relative path without '..'".to_owned(),
            ));
        }
        if self.max_connect_attempts == 0 {
            return Err(config_error(
                "max_connect_attempts",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(config_error(
                "connect_timeout_secs",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.max_read_bytes < 1024 {
            return Err(config_error(
                "max_read_bytes",
                "must be at least 1024".to_owned(),
            ));
        }
        if self.max_tracked_lines == 0 {
            return Err(config_error(
                "max_tracked_lines",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.max_concurrent_sources == 0 {
            return Err(config_error(
                "max_concurrent_sources",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.degraded_after_failures == 0
            || self.unreachable_after_failures < self.degraded_after_failures
        {
            return Err(config_error(
                "unreachable_after_failures",
                "thresholds must satisfy 0 < degraded <= unreachable".to_owned(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(config_error(
                "event_channel_capacity",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.max_scan_depth == 0 || self.max_scan_depth > MAX_SCAN_DEPTH {
            return Err(config_error(
                "max_scan_depth",
                format!("must be 1-{MAX_SCAN_DEPTH}"),
            ));
        }
        Ok(())
    }
}

fn config_error(field: &str, reason: String) -> IngestError {
    IngestError::Config {
        field: field.to_owned(),
        reason,
    }
}

/// 수집기 설정 빌더
#[derive(Default)]
pub struct SweepConfigBuilder {
    config: SweepConfig,
}

impl SweepConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 스윕 주기(초)를 설정합니다.
    pub fn sweep_interval_secs(mut self, secs: u64) -> Self {
        self.config.sweep_interval_secs = secs;
        self
    }

    /// 서버 로그 파일 이름을 설정합니다.
    pub fn log_file_name(mut self, name: impl Into<String>) -> Self {
        self.config.log_file_name = name.into();
        self
    }

    /// 킬피드 기준 경로를 설정합니다.
    pub fn killfeed_subpath(mut self, path: impl Into<String>) -> Self {
        self.config.killfeed_subpath = path.into();
        self
    }

    /// 접속 재시도 파라미터를 설정합니다.
    pub fn connect_retry(mut self, attempts: u32, backoff_base_secs: u64, timeout_secs: u64) -> Self {
        self.config.max_connect_attempts = attempts;
        self.config.backoff_base_secs = backoff_base_secs;
        self.config.connect_timeout_secs = timeout_secs;
        self
    }

    /// 한 스텝의 최대 읽기 바이트를 설정합니다.
    pub fn max_read_bytes(mut self, bytes: usize) -> Self {
        self.config.max_read_bytes = bytes;
        self
    }

    /// 줄 식별자 최대 보관 수를 설정합니다.
    pub fn max_tracked_lines(mut self, lines: usize) -> Self {
        self.config.max_tracked_lines = lines;
        self
    }

    /// 동시 처리 소스 수를 설정합니다.
    pub fn max_concurrent_sources(mut self, count: usize) -> Self {
        self.config.max_concurrent_sources = count;
        self
    }

    /// 기본 최대 인원을 설정합니다.
    pub fn default_max_players(mut self, players: u32) -> Self {
        self.config.default_max_players = players;
        self
    }

    /// 헬스 판정 임계값을 설정합니다.
    pub fn failure_thresholds(mut self, degraded: u32, unreachable: u32) -> Self {
        self.config.degraded_after_failures = degraded;
        self.config.unreachable_after_failures = unreachable;
        self
    }

    /// 빈 이름 처리 정책을 설정합니다.
    pub fn empty_name_policy(mut self, policy: EmptyNamePolicy) -> Self {
        self.config.empty_name_policy = policy;
        self
    }

    /// 출력 채널 용량을 설정합니다.
    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.event_channel_capacity = capacity;
        self
    }

    /// 설정을 검증하고 `SweepConfig`를 생성합니다.
    pub fn build(self) -> Result<SweepConfig, IngestError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
