//! 설정 관리: killfeed.toml 파싱 및 런타임 설정
//!
//! [`KillfeedConfig`]는 데몬과 수집기의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`KILLFEED_INGEST_SWEEP_INTERVAL_SECS=120` 형식)
//! 3. 설정 파일 (`killfeed.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! 원격 소스의 비밀번호는 `password` 대신 `password_env`로 환경변수 이름을 지정할 수 있으며,
//! [`KillfeedConfig::load`]가 로딩 시점에 값을 채웁니다.
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), killfeed_core::error::KillfeedError> {
//! use killfeed_core::config::KillfeedConfig;
//!
//! let config = KillfeedConfig::load("killfeed.toml").await?;
//! let config = KillfeedConfig::parse("[ingest]\nsweep_interval_secs = 120")?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, KillfeedError};
use crate::types::SourceId;

/// killfeed 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KillfeedConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 수집기 설정
    #[serde(default)]
    pub ingest: IngestConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// 원격 소스 목록
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl KillfeedConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드와 비밀값 해석을 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, KillfeedError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.resolve_secrets()?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, KillfeedError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                KillfeedError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                KillfeedError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, KillfeedError> {
        toml::from_str(toml_str).map_err(|e| {
            KillfeedError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `KILLFEED_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "KILLFEED_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "KILLFEED_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "KILLFEED_GENERAL_PID_FILE");
        override_string(
            &mut self.general.dev_data_dir,
            "KILLFEED_GENERAL_DEV_DATA_DIR",
        );

        // Ingest
        override_bool(&mut self.ingest.enabled, "KILLFEED_INGEST_ENABLED");
        override_u64(
            &mut self.ingest.sweep_interval_secs,
            "KILLFEED_INGEST_SWEEP_INTERVAL_SECS",
        );
        override_string(
            &mut self.ingest.log_file_name,
            "KILLFEED_INGEST_LOG_FILE_NAME",
        );
        override_string(
            &mut self.ingest.killfeed_subpath,
            "KILLFEED_INGEST_KILLFEED_SUBPATH",
        );
        override_u64(
            &mut self.ingest.connect_timeout_secs,
            "KILLFEED_INGEST_CONNECT_TIMEOUT_SECS",
        );
        override_u32(
            &mut self.ingest.max_connect_attempts,
            "KILLFEED_INGEST_MAX_CONNECT_ATTEMPTS",
        );
        override_u64(
            &mut self.ingest.backoff_base_secs,
            "KILLFEED_INGEST_BACKOFF_BASE_SECS",
        );
        override_usize(
            &mut self.ingest.max_read_bytes,
            "KILLFEED_INGEST_MAX_READ_BYTES",
        );
        override_usize(
            &mut self.ingest.max_tracked_lines,
            "KILLFEED_INGEST_MAX_TRACKED_LINES",
        );
        override_usize(
            &mut self.ingest.max_concurrent_sources,
            "KILLFEED_INGEST_MAX_CONCURRENT_SOURCES",
        );
        override_u32(
            &mut self.ingest.default_max_players,
            "KILLFEED_INGEST_DEFAULT_MAX_PLAYERS",
        );
        override_string(
            &mut self.ingest.empty_name_policy,
            "KILLFEED_INGEST_EMPTY_NAME_POLICY",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "KILLFEED_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "KILLFEED_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "KILLFEED_METRICS_PORT");
    }

    /// `password_env`가 지정된 소스의 비밀번호를 환경변수에서 채웁니다.
    ///
    /// `password`가 이미 설정되어 있으면 그대로 둡니다.
    pub fn resolve_secrets(&mut self) -> Result<(), KillfeedError> {
        for source in &mut self.sources {
            if !source.password.is_empty() || source.password_env.is_empty() {
                continue;
            }
            match std::env::var(&source.password_env) {
                Ok(secret) => source.password = secret,
                Err(_) => {
                    return Err(ConfigError::MissingSecret {
                        source_id: source.id.clone(),
                        env_key: source.password_env.clone(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), KillfeedError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        self.ingest.validate()?;

        if self.metrics.enabled && self.metrics.endpoint != "/metrics" {
            return Err(invalid(
                "metrics.endpoint",
                "only '/metrics' is supported".to_owned(),
            ));
        }

        let mut seen = HashSet::new();
        for (index, source) in self.sources.iter().enumerate() {
            source.validate(index)?;
            if !seen.insert(source.id.as_str()) {
                return Err(invalid(
                    &format!("sources[{index}].id"),
                    format!("duplicate source id '{}'", source.id),
                ));
            }
        }

        Ok(())
    }

    /// id로 소스 설정을 찾습니다.
    pub fn source(&self, id: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.id == id)
    }
}

fn invalid(field: &str, reason: String) -> KillfeedError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열이면 생성하지 않음)
    pub pid_file: String,
    /// 개발 모드 데이터 디렉토리
    ///
    /// 비어 있지 않으면 원격 접속 대신 이 디렉토리에서 같은 경로 규칙으로 파일을 읽습니다.
    pub dev_data_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: String::new(),
            dev_data_dir: String::new(),
        }
    }
}

/// 수집기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 스윕 주기 (초)
    pub sweep_interval_secs: u64,
    /// 서버 로그 파일 이름 (`<host>_<server_id>/Logs/` 아래)
    pub log_file_name: String,
    /// 킬피드 CSV 기준 경로 (`<host>_<server_id>/` 아래)
    pub killfeed_subpath: String,
    /// 접속 시도 1회당 타임아웃 (초)
    pub connect_timeout_secs: u64,
    /// 최대 접속 시도 횟수
    pub max_connect_attempts: u32,
    /// 재시도 백오프 기준 (초): `base * 2^attempt`
    pub backoff_base_secs: u64,
    /// 한 스텝에서 로그 파일을 읽는 최대 바이트
    pub max_read_bytes: usize,
    /// 소스별 킬피드 중복 제거 집합의 최대 크기
    pub max_tracked_lines: usize,
    /// 동시에 처리할 최대 소스 수
    pub max_concurrent_sources: usize,
    /// `playersmaxcount` 보고 전 기본 최대 인원
    pub default_max_players: u32,
    /// 연속 실패가 이 횟수 이상이면 degraded
    pub degraded_after_failures: u32,
    /// 연속 실패가 이 횟수 이상이면 unreachable
    pub unreachable_after_failures: u32,
    /// 킬피드 행의 빈 이름 처리 정책 (malformed, fill_from_counterpart)
    pub empty_name_policy: String,
    /// 출력 채널 용량
    pub event_channel_capacity: usize,
}

impl Default for IngestConfig {
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
            empty_name_policy: "malformed".to_owned(),
            event_channel_capacity: 4096,
        }
    }
}

impl IngestConfig {
    /// 수집기 섹션을 검증합니다.
    pub fn validate(&self) -> Result<(), KillfeedError> {
        if self.sweep_interval_secs == 0 {
            return Err(invalid(
                "ingest.sweep_interval_secs",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.log_file_name.trim().is_empty() || self.log_file_name.contains('/') {
            return Err(invalid(
                "ingest.log_file_name",
                "must be a plain file name".to_owned(),
            ));
        }
        if self.killfeed_subpath.trim().is_empty() || self.killfeed_subpath.contains("..") {
            return Err(invalid(
                "ingest.killfeed_subpath",
                "must be a non-empty relative path without '..'".to_owned(),
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(invalid(
                "ingest.connect_timeout_secs",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.max_connect_attempts == 0 || self.max_connect_attempts > 10 {
            return Err(invalid(
                "ingest.max_connect_attempts",
                "must be between 1 and 10".to_owned(),
            ));
        }
        if self.max_read_bytes < 1024 {
            return Err(invalid(
                "ingest.max_read_bytes",
                "must be at least 1024".to_owned(),
            ));
        }
        if self.max_tracked_lines == 0 {
            return Err(invalid(
                "ingest.max_tracked_lines",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.max_concurrent_sources == 0 {
            return Err(invalid(
                "ingest.max_concurrent_sources",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.degraded_after_failures == 0
            || self.unreachable_after_failures < self.degraded_after_failures
        {
            return Err(invalid(
                "ingest.unreachable_after_failures",
                "thresholds must satisfy 0 < degraded <= unreachable".to_owned(),
            ));
        }
        let valid_policies = ["malformed", "fill_from_counterpart"];
        if !valid_policies.contains(&self.empty_name_policy.as_str()) {
            return Err(invalid(
                "ingest.empty_name_policy",
                format!("must be one of: {}", valid_policies.join(", ")),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(invalid(
                "ingest.event_channel_capacity",
                "must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus 엔드포인트 활성화 여부
    pub enabled: bool,
    /// 바인딩 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
    /// 엔드포인트 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

/// 원격 게임 서버 소스
///
/// 접속 키 `(host, port, username)`와 경로 템플릿 `<host>_<server_id>`를 구성합니다.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// 소스 식별자 (커서/헬스/메트릭 키)
    pub id: String,
    /// 표시용 서버 이름
    #[serde(default)]
    pub name: String,
    /// 원격 호스트
    pub host: String,
    /// 서버별 식별자 (경로 템플릿에 사용)
    pub server_id: String,
    /// SFTP 포트
    #[serde(default = "default_sftp_port")]
    pub port: u16,
    /// 접속 사용자
    pub username: String,
    /// 접속 비밀번호
    #[serde(default)]
    pub password: String,
    /// 비밀번호를 담은 환경변수 이름
    #[serde(default)]
    pub password_env: String,
    /// 서버 로그 폴링 여부 (킬피드는 항상 폴링)
    #[serde(default)]
    pub log_enabled: bool,
}

fn default_sftp_port() -> u16 {
    22
}

impl SourceConfig {
    /// 소스 식별자
    pub fn source_id(&self) -> SourceId {
        SourceId::new(self.id.clone())
    }

    /// 표시용 이름 (없으면 id)
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// 원격 디렉토리 접두어 `./<host>_<server_id>`
    pub fn remote_root(&self) -> String {
        format!("./{}_{}", self.host, self.server_id)
    }

    fn validate(&self, index: usize) -> Result<(), KillfeedError> {
        let field = |name: &str| format!("sources[{index}].{name}");
        if self.id.trim().is_empty() {
            return Err(invalid(&field("id"), "must not be empty".to_owned()));
        }
        if self.host.trim().is_empty() {
            return Err(invalid(&field("host"), "must not be empty".to_owned()));
        }
        if self.server_id.trim().is_empty() || self.server_id.contains('/') {
            return Err(invalid(
                &field("server_id"),
                "must be non-empty and contain no '/'".to_owned(),
            ));
        }
        if self.port == 0 {
            return Err(invalid(&field("port"), "must be greater than 0".to_owned()));
        }
        if self.username.trim().is_empty() {
            return Err(invalid(&field("username"), "must not be empty".to_owned()));
        }
        Ok(())
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("host", &self.host)
            .field("server_id", &self.server_id)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("password_env", &self.password_env)
            .field("log_enabled", &self.log_enabled)
            .finish()
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u32(target: &mut u32, env_key: &str) {
    override_parsed(target, env_key, "u32");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = type_name,
                "failed to parse env var override, ignoring"
            ),
        }
    }
}
