//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 수집기는 이 상수로 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `killfeed_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(killfeed_core::metrics::KILL_EVENTS_TOTAL, "source" => "eu-1").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 소스 레이블 키
pub const LABEL_SOURCE: &str = "source";

/// 아티팩트 레이블 키 (killfeed, server_log)
pub const LABEL_ARTIFACT: &str = "artifact";

/// 로그 이벤트 종류 레이블 키
pub const LABEL_EVENT_TYPE: &str = "type";

/// 실패 사유 레이블 키 (auth, unreachable, ...)
pub const LABEL_REASON: &str = "reason";

// ─── 스윕 메트릭 ──────────────────────────────────────────────────

/// 완료된 스윕 수 (counter)
pub const SWEEPS_TOTAL: &str = "killfeed_sweeps_total";

/// 스윕 소요 시간 (histogram, 초)
pub const SWEEP_DURATION_SECONDS: &str = "killfeed_sweep_duration_seconds";

/// 잠금 경합으로 건너뛴 스텝 수 (counter, label: source, artifact)
pub const STEPS_SKIPPED_TOTAL: &str = "killfeed_steps_skipped_total";

/// 소스 스텝 실패 수 (counter, label: source, reason)
pub const SOURCE_FAILURES_TOTAL: &str = "killfeed_source_failures_total";

/// degraded/unreachable 상태인 소스 수 (gauge)
pub const SOURCES_DEGRADED: &str = "killfeed_sources_degraded";

/// 리플레이 실행 수 (counter, label: source)
pub const REPLAYS_TOTAL: &str = "killfeed_replays_total";

// ─── 이벤트 메트릭 ────────────────────────────────────────────────

/// 방출된 킬 이벤트 수 (counter, label: source)
pub const KILL_EVENTS_TOTAL: &str = "killfeed_kill_events_total";

/// 방출된 로그 이벤트 수 (counter, label: source, type)
pub const LOG_EVENTS_TOTAL: &str = "killfeed_log_events_total";

/// 방출된 접속 현황 스냅샷 수 (counter, label: source)
pub const PRESENCE_UPDATES_TOTAL: &str = "killfeed_presence_updates_total";

/// 건너뛴 잘못된 킬피드 행 수 (counter, label: reason)
pub const MALFORMED_LINES_TOTAL: &str = "killfeed_malformed_lines_total";

/// 디코딩 실패로 버린 줄 수 (counter, label: source)
pub const UNDECODABLE_LINES_TOTAL: &str = "killfeed_undecodable_lines_total";

// ─── 세션/파일 메트릭 ─────────────────────────────────────────────

/// 원격 세션 접속 시도 실패 수 (counter, label: reason)
pub const SESSION_CONNECT_FAILURES_TOTAL: &str = "killfeed_session_connect_failures_total";

/// 풀에서 제거된 세션 수 (counter)
pub const SESSION_EVICTIONS_TOTAL: &str = "killfeed_session_evictions_total";

/// 감지된 로그 로테이션 수 (counter, label: source)
pub const LOG_ROTATIONS_TOTAL: &str = "killfeed_log_rotations_total";

/// 읽은 원격 바이트 수 (counter, label: source, artifact)
pub const BYTES_READ_TOTAL: &str = "killfeed_bytes_read_total";

// ─── 데몬 메트릭 ──────────────────────────────────────────────────

/// 데몬 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "killfeed_daemon_uptime_seconds";

/// 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "killfeed_daemon_build_info";

/// 설정된 소스 수 (gauge)
pub const DAEMON_SOURCES_CONFIGURED: &str = "killfeed_daemon_sources_configured";

/// 스윕 소요 시간 히스토그램 버킷 (초)
pub const SWEEP_DURATION_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(SWEEPS_TOTAL, "Completed ingestion sweeps");
    describe_histogram!(
        SWEEP_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Wall-clock duration of one sweep over all sources"
    );
    describe_counter!(
        STEPS_SKIPPED_TOTAL,
        "Source steps skipped because a previous step for the same artifact was still running"
    );
    describe_counter!(SOURCE_FAILURES_TOTAL, "Failed source steps by reason");
    describe_gauge!(
        SOURCES_DEGRADED,
        "Sources currently reported as degraded or unreachable"
    );
    describe_counter!(REPLAYS_TOTAL, "Full kill-feed replays executed");

    describe_counter!(KILL_EVENTS_TOTAL, "Kill events handed to the output sink");
    describe_counter!(LOG_EVENTS_TOTAL, "Server log events handed to the output sink");
    describe_counter!(
        PRESENCE_UPDATES_TOTAL,
        "Presence snapshots handed to the output sink"
    );
    describe_counter!(MALFORMED_LINES_TOTAL, "Kill-feed rows skipped as malformed");
    describe_counter!(
        UNDECODABLE_LINES_TOTAL,
        "Lines dropped because no text encoding applied"
    );

    describe_counter!(
        SESSION_CONNECT_FAILURES_TOTAL,
        "Failed remote session connection attempts"
    );
    describe_counter!(SESSION_EVICTIONS_TOTAL, "Pooled remote sessions evicted");
    describe_counter!(LOG_ROTATIONS_TOTAL, "Server log rotations detected");
    describe_counter!(BYTES_READ_TOTAL, "Bytes read from remote artifacts");

    describe_gauge!(
        DAEMON_UPTIME_SECONDS,
        metrics::Unit::Seconds,
        "Seconds since the daemon started"
    );
    describe_gauge!(DAEMON_BUILD_INFO, "Build information (always 1)");
    describe_gauge!(DAEMON_SOURCES_CONFIGURED, "Remote sources in the active configuration");
}
