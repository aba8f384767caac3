//! 수집 오케스트레이터: 스윕 한 번을 구동합니다.
//!
//! # 흐름
//! ```text
//! SessionPool (lease) -> SourceLocator (candidates) -> CursorStore (unread window)
//!     -> KillfeedParser / ServerLogParser -> normalize / PresenceTracker -> EventSink
//! ```
//!
//! - 소스마다 독립 태스크로 실행되며 동시에 도는 소스 수는 `max_concurrent_sources`로 제한됩니다.
//! - `(소스, 아티팩트)` 스텝 잠금을 잡지 못하면 그 스텝은 건너뜁니다 ([`StepOutcome::Skipped`]).
//!   같은 스텝이 자기 자신과 병렬로 실행되는 일은 없습니다.
//! - 커서는 싱크가 받아들인 부분까지만 전진합니다.
//! - 한 소스의 실패는 보고서와 헬스에만 기록되고 다른 소스에는 영향을 주지 않습니다.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use killfeed_core::config::SourceConfig;
use killfeed_core::metrics as kf_metrics;
use killfeed_core::pipeline::EventSink;
use killfeed_core::types::{ArtifactKind, LogEvent, SourceId};
use tokio::sync::{OwnedMutexGuard, Semaphore};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, trace, warn};

use crate::config::SweepConfig;
use crate::cursor::{CursorStore, LineSetCursor, OffsetCursor, line_id};
use crate::error::{IngestError, SessionError};
use crate::lines::{Decoded, complete_lines, decode_line};
use crate::locator::{FileCandidate, SourceLocator};
use crate::normalize::normalize;
use crate::parser::{KillRowOutcome, KillfeedParser, ServerLogParser};
use crate::presence::PresenceTracker;
use crate::session::{RemoteSession, SessionConnector, SessionKey, SessionLease, SessionPool};

/// 스텝 하나의 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// 정상 완료 (malformed는 잘못된 행과 디코딩 불가 줄의 합)
    Completed { events: usize, malformed: usize },
    /// 같은 스텝이 아직 실행 중이라 건너뜀
    Skipped,
    /// 소스 설정에서 꺼져 있음
    Disabled,
    /// 실패 (사유)
    Failed(String),
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// 싱크로 전달된 이벤트 수
    pub fn events(&self) -> usize {
        match self {
            Self::Completed { events, .. } => *events,
            _ => 0,
        }
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed { events, malformed } => {
                write!(f, "completed ({events} events, {malformed} malformed)")
            }
            Self::Skipped => f.write_str("skipped"),
            Self::Disabled => f.write_str("disabled"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// 소스 하나의 스윕 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub source_id: SourceId,
    pub killfeed: StepOutcome,
    pub server_log: StepOutcome,
}

impl SourceReport {
    pub fn failed(&self) -> bool {
        self.killfeed.is_failed() || self.server_log.is_failed()
    }

    fn first_failure(&self) -> Option<&str> {
        [&self.killfeed, &self.server_log]
            .into_iter()
            .find_map(|outcome| match outcome {
                StepOutcome::Failed(reason) => Some(reason.as_str()),
                _ => None,
            })
    }
}

/// 스윕 전체 결과
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub trace_id: String,
    /// 소스 id 순으로 정렬됨
    pub sources: Vec<SourceReport>,
    pub duration: Duration,
}

impl SweepReport {
    /// 전달된 이벤트 총합
    pub fn events(&self) -> usize {
        self.sources
            .iter()
            .map(|s| s.killfeed.events() + s.server_log.events())
            .sum()
    }

    pub fn failed_sources(&self) -> Vec<&SourceId> {
        self.sources
            .iter()
            .filter(|s| s.failed())
            .map(|s| &s.source_id)
            .collect()
    }

    pub fn source(&self, id: &SourceId) -> Option<&SourceReport> {
        self.sources.iter().find(|s| &s.source_id == id)
    }
}

/// 리플레이 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub source_id: SourceId,
    pub trace_id: String,
    /// 읽은 CSV 파일 수
    pub files: usize,
    pub events: usize,
    pub malformed: usize,
    pub duration: Duration,
}

/// 소스 헬스 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourceStatus {
    #[default]
    Healthy,
    Degraded,
    Unreachable,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unreachable => "unreachable",
        }
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 소스별 헬스 (운영 도구용)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceHealth {
    pub status: SourceStatus,
    /// 연속 실패 스윕 수
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_success: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct StepStats {
    events: usize,
    malformed: usize,
    undecodable: usize,
}

impl StepStats {
    fn outcome(&self) -> StepOutcome {
        StepOutcome::Completed {
            events: self.events,
            malformed: self.malformed + self.undecodable,
        }
    }
}

type StepKey = (SourceId, ArtifactKind);
type StepLock = Arc<tokio::sync::Mutex<()>>;

/// 수집 오케스트레이터
pub struct IngestOrchestrator<C: SessionConnector, S: EventSink> {
    config: SweepConfig,
    pool: SessionPool<C>,
    locator: SourceLocator,
    cursors: CursorStore,
    killfeed_parser: KillfeedParser,
    log_parser: ServerLogParser,
    presence: PresenceTracker,
    sink: Arc<S>,
    step_locks: Mutex<HashMap<StepKey, StepLock>>,
    health: Mutex<HashMap<SourceId, SourceHealth>>,
    limiter: Arc<Semaphore>,
}

impl<C: SessionConnector, S: EventSink> IngestOrchestrator<C, S> {
    /// 설정을 검증하고 오케스트레이터를 만듭니다.
    pub fn new(config: SweepConfig, connector: C, sink: Arc<S>) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self {
            pool: SessionPool::new(connector, config.retry_policy()),
            locator: SourceLocator::from_config(&config),
            cursors: CursorStore::new(),
            killfeed_parser: KillfeedParser::new(config.empty_name_policy),
            log_parser: ServerLogParser::with_defaults()?,
            presence: PresenceTracker::new(config.default_max_players),
            sink,
            step_locks: Mutex::new(HashMap::new()),
            health: Mutex::new(HashMap::new()),
            limiter: Arc::new(Semaphore::new(config.max_concurrent_sources)),
            config,
        })
    }

    /// 서버 로그 문법을 교체합니다 (패턴을 추가한 파서 등).
    pub fn with_log_parser(mut self, parser: ServerLogParser) -> Self {
        self.log_parser = parser;
        self
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    pub fn pool(&self) -> &SessionPool<C> {
        &self.pool
    }

    pub fn cursors(&self) -> &CursorStore {
        &self.cursors
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn sink(&self) -> &Arc<S> {
        &self.sink
    }

    /// 증분 스윕을 한 번 실행합니다.
    ///
    /// 소스별 실패는 보고서에 담기며 이 함수는 실패하지 않습니다.
    pub async fn run_incremental_sweep(self: &Arc<Self>, sources: &[SourceConfig]) -> SweepReport {
        let started = Instant::now();
        let trace_id = uuid::Uuid::new_v4().to_string();
        self.sink.on_sweep_started(&trace_id);
        debug!(trace_id = %trace_id, sources = sources.len(), "sweep started");

        let mut tasks = JoinSet::new();
        let mut task_sources = HashMap::new();
        for source in sources.iter().cloned() {
            let this = Arc::clone(self);
            let limiter = Arc::clone(&self.limiter);
            let span = tracing::info_span!("source", source = %source.id, trace_id = %trace_id);
            let source_id = source.source_id();
            let handle = tasks.spawn(
                async move {
                    // 세마포어는 닫히지 않으므로 실패하면 제한 없이 진행
                    let _permit = limiter.acquire_owned().await.ok();
                    this.sweep_source(&source).await
                }
                .instrument(span),
            );
            task_sources.insert(handle.id(), source_id);
        }

        let mut reports = Vec::with_capacity(sources.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, report)) => reports.push(report),
                Err(err) => {
                    let Some(source_id) = task_sources.remove(&err.id()) else {
                        error!(error = %err, "sweep task failed");
                        continue;
                    };
                    error!(source = %source_id, error = %err, "source task aborted");
                    let failed = StepOutcome::Failed(format!("task aborted: {err}"));
                    let report = SourceReport {
                        source_id,
                        killfeed: failed.clone(),
                        server_log: failed,
                    };
                    self.record_health(&report);
                    reports.push(report);
                }
            }
        }
        reports.sort_by(|a, b| a.source_id.cmp(&b.source_id));

        let report = SweepReport {
            trace_id,
            sources: reports,
            duration: started.elapsed(),
        };

        metrics::counter!(kf_metrics::SWEEPS_TOTAL).increment(1);
        metrics::histogram!(kf_metrics::SWEEP_DURATION_SECONDS)
            .record(report.duration.as_secs_f64());
        metrics::gauge!(kf_metrics::SOURCES_DEGRADED).set(self.unhealthy_sources() as f64);

        info!(
            trace_id = %report.trace_id,
            sources = report.sources.len(),
            failed = report.failed_sources().len(),
            events = report.events(),
            duration_ms = u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
            "sweep finished"
        );
        report
    }

    /// 소스의 킬피드 이력 전체를 다시 처리합니다.
    ///
    /// 기존 킬피드 커서는 보지 않고 모든 CSV를 수정 시각 오름차순으로 읽으며,
    /// 실행 안에서만 줄 식별자로 중복을 제거합니다. 성공하면 그동안 본 식별자가
    /// 소스의 킬피드 커서가 되고, 실패하면 기존 커서에 합쳐집니다.
    ///
    /// # Errors
    ///
    /// 같은 소스의 킬피드 스텝이 실행 중이면 `IngestError::Busy`,
    /// 세션/싱크 실패 시 해당 에러.
    pub async fn run_replay(&self, source: &SourceConfig) -> Result<ReplayReport, IngestError> {
        let id = source.source_id();
        let Some(_guard) = self.try_lock_step(&id, ArtifactKind::Killfeed) else {
            self.count_skipped(&id, ArtifactKind::Killfeed);
            return Err(IngestError::Busy {
                source_id: id.to_string(),
                artifact: ArtifactKind::Killfeed.to_string(),
            });
        };

        let started = Instant::now();
        let trace_id = uuid::Uuid::new_v4().to_string();
        self.sink.on_sweep_started(&trace_id);
        metrics::counter!(kf_metrics::REPLAYS_TOTAL, kf_metrics::LABEL_SOURCE => id.to_string())
            .increment(1);
        info!(source = %id, trace_id = %trace_id, "killfeed replay started");

        let key = SessionKey::for_source(source);
        let lease = self.pool.acquire(&key, &source.password).await.inspect_err(|err| {
            error!(source = %id, error = %err, "replay could not acquire session");
        })?;

        let mut run_cursor = LineSetCursor::new();
        let mut stats = StepStats::default();
        let result = self
            .replay_files(&lease, source, &mut run_cursor, &mut stats)
            .await;

        match result {
            Ok(files) => {
                self.cursors.install_killfeed(&id, run_cursor);
                let report = ReplayReport {
                    source_id: id,
                    trace_id,
                    files,
                    events: stats.events,
                    malformed: stats.malformed + stats.undecodable,
                    duration: started.elapsed(),
                };
                info!(
                    source = %report.source_id,
                    files = report.files,
                    events = report.events,
                    malformed = report.malformed,
                    "killfeed replay finished"
                );
                Ok(report)
            }
            Err(err) => {
                self.cursors.merge_killfeed(&id, run_cursor);
                if is_connection_fault(&err) {
                    lease.invalidate();
                }
                error!(source = %id, events = stats.events, error = %err, "killfeed replay failed");
                Err(err)
            }
        }
    }

    /// 제거된 소스의 커서, 접속 현황, 헬스를 지우고 세션을 닫습니다.
    ///
    /// `remaining`은 제거 후에도 설정에 남아 있는 소스 목록입니다.
    pub async fn forget_source(&self, source: &SourceConfig, remaining: &[SourceConfig]) {
        let id = source.source_id();
        self.cursors.forget(&id);
        self.presence.forget(&id);
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        self.step_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(source_id, _), _| source_id != &id);
        self.release_session(&SessionKey::for_source(source), remaining)
            .await;
        info!(source = %id, "source forgotten");
    }

    /// 더 쓰지 않는 세션 키를 정리합니다.
    ///
    /// 남은 소스 중 같은 키를 쓰는 것이 있으면 세션만 닫고 슬롯은 남깁니다.
    pub async fn release_session(&self, key: &SessionKey, remaining: &[SourceConfig]) {
        if remaining.iter().any(|s| &SessionKey::for_source(s) == key) {
            self.pool.evict(key).await;
        } else {
            self.pool.forget(key).await;
        }
    }

    /// 소스 헬스 (기록이 없으면 healthy)
    pub fn source_health(&self, id: &SourceId) -> SourceHealth {
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// 기록이 있는 모든 소스의 헬스 (id 순)
    pub fn health_report(&self) -> Vec<(SourceId, SourceHealth)> {
        let mut report: Vec<(SourceId, SourceHealth)> = self
            .health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, health)| (id.clone(), health.clone()))
            .collect();
        report.sort_by(|a, b| a.0.cmp(&b.0));
        report
    }

    fn unhealthy_sources(&self) -> usize {
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|h| h.status != SourceStatus::Healthy)
            .count()
    }

    fn try_lock_step(&self, source: &SourceId, kind: ArtifactKind) -> Option<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.step_locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry((source.clone(), kind)).or_default())
        };
        lock.try_lock_owned().ok()
    }

    fn count_skipped(&self, source: &SourceId, kind: ArtifactKind) {
        metrics::counter!(
            kf_metrics::STEPS_SKIPPED_TOTAL,
            kf_metrics::LABEL_SOURCE => source.to_string(),
            kf_metrics::LABEL_ARTIFACT => kind.as_str()
        )
        .increment(1);
        debug!(source = %source, artifact = %kind, "previous step still running, skipping");
    }

    async fn sweep_source(&self, source: &SourceConfig) -> SourceReport {
        let id = source.source_id();

        let killfeed_guard = self.try_lock_step(&id, ArtifactKind::Killfeed);
        let log_guard = if source.log_enabled {
            self.try_lock_step(&id, ArtifactKind::ServerLog)
        } else {
            None
        };

        let mut killfeed = killfeed_guard.is_none().then(|| {
            self.count_skipped(&id, ArtifactKind::Killfeed);
            StepOutcome::Skipped
        });
        let mut server_log = if !source.log_enabled {
            Some(StepOutcome::Disabled)
        } else if log_guard.is_none() {
            self.count_skipped(&id, ArtifactKind::ServerLog);
            Some(StepOutcome::Skipped)
        } else {
            None
        };

        if killfeed.is_none() || server_log.is_none() {
            let key = SessionKey::for_source(source);
            match self.pool.acquire(&key, &source.password).await {
                Ok(lease) => {
                    let mut lease = Some(lease);
                    if killfeed.is_none() {
                        let result = match lease.as_ref() {
                            Some(session) => self.killfeed_step(session, source).await,
                            None => Err(SessionError::Closed.into()),
                        };
                        killfeed = Some(self.settle(&id, ArtifactKind::Killfeed, &mut lease, result));
                    }
                    if server_log.is_none() {
                        let result = match lease.as_ref() {
                            Some(session) => self.log_step(session, source).await,
                            None => Err(SessionError::Closed.into()),
                        };
                        server_log =
                            Some(self.settle(&id, ArtifactKind::ServerLog, &mut lease, result));
                    }
                }
                Err(err) => {
                    if matches!(err, SessionError::Auth { .. }) {
                        error!(source = %id, key = %key, error = %err, "authentication failed, source unavailable this sweep");
                    } else {
                        error!(source = %id, key = %key, error = %err, "could not connect, source skipped this sweep");
                    }
                    metrics::counter!(
                        kf_metrics::SOURCE_FAILURES_TOTAL,
                        kf_metrics::LABEL_SOURCE => id.to_string(),
                        kf_metrics::LABEL_REASON => err.label()
                    )
                    .increment(1);
                    let failed = StepOutcome::Failed(err.to_string());
                    killfeed.get_or_insert_with(|| failed.clone());
                    server_log.get_or_insert(failed);
                }
            }
        }

        let report = SourceReport {
            source_id: id,
            killfeed: killfeed.unwrap_or(StepOutcome::Skipped),
            server_log: server_log.unwrap_or(StepOutcome::Skipped),
        };
        self.record_health(&report);
        debug!(
            source = %report.source_id,
            killfeed = %report.killfeed,
            server_log = %report.server_log,
            "source swept"
        );
        report
    }

    /// 스텝 결과를 보고서 값으로 바꿉니다. 연결 장애면 세션을 버립니다.
    fn settle(
        &self,
        id: &SourceId,
        kind: ArtifactKind,
        lease: &mut Option<SessionLease<C::Session>>,
        result: Result<StepStats, IngestError>,
    ) -> StepOutcome {
        match result {
            Ok(stats) => stats.outcome(),
            Err(err) => {
                if is_connection_fault(&err) {
                    if let Some(lease) = lease.take() {
                        lease.invalidate();
                    }
                }
                error!(source = %id, artifact = %kind, error = %err, "sweep step failed");
                metrics::counter!(
                    kf_metrics::SOURCE_FAILURES_TOTAL,
                    kf_metrics::LABEL_SOURCE => id.to_string(),
                    kf_metrics::LABEL_REASON => err.label()
                )
                .increment(1);
                StepOutcome::Failed(err.to_string())
            }
        }
    }

    fn record_health(&self, report: &SourceReport) {
        let succeeded = report.killfeed.is_completed() || report.server_log.is_completed();
        let mut health = self.health.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = health.entry(report.source_id.clone()).or_default();
        let previous = entry.status;

        if let Some(reason) = report.first_failure() {
            entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
            entry.last_error = Some(reason.to_owned());
            entry.status = if entry.consecutive_failures >= self.config.unreachable_after_failures {
                SourceStatus::Unreachable
            } else if entry.consecutive_failures >= self.config.degraded_after_failures {
                SourceStatus::Degraded
            } else {
                SourceStatus::Healthy
            };
        } else if succeeded {
            entry.consecutive_failures = 0;
            entry.status = SourceStatus::Healthy;
            entry.last_success = Some(Utc::now());
        }

        if entry.status != previous {
            if entry.status == SourceStatus::Healthy {
                info!(source = %report.source_id, previous = %previous, "source recovered");
            } else {
                warn!(
                    source = %report.source_id,
                    status = %entry.status,
                    failures = entry.consecutive_failures,
                    "source health changed"
                );
            }
        }
    }

    async fn killfeed_step(
        &self,
        session: &C::Session,
        source: &SourceConfig,
    ) -> Result<StepStats, IngestError> {
        let id = source.source_id();
        let mut stats = StepStats::default();

        let candidates = self
            .locator
            .list_candidates(session, source, ArtifactKind::Killfeed)
            .await?;
        let Some(latest) = candidates.last() else {
            debug!(source = %id, "no killfeed files this sweep");
            return Ok(stats);
        };
        let selected = self.cursors.select_killfeed_files(&id, &candidates);

        let mut current_ids = HashSet::new();
        for file in &selected {
            let still_written = file.path == latest.path;
            let Some(lines) = self
                .read_killfeed_file(session, &id, file, still_written, &mut stats)
                .await?
            else {
                continue;
            };
            current_ids.extend(lines.iter().map(|(lid, _)| *lid));

            let unseen = self.cursors.unseen_lines(&id, lines);
            let mut accepted = Vec::with_capacity(unseen.len());
            for (lid, line) in unseen {
                if let Err(err) = self.emit_kill_row(&id, &line, &mut stats).await {
                    self.cursors.commit_lines(&id, accepted);
                    return Err(err);
                }
                accepted.push(lid);
            }
            self.cursors.commit_lines(&id, accepted);
            self.cursors.mark_killfeed_read(&id, file.modified);
        }

        let pruned = self
            .cursors
            .prune_lines(&id, &current_ids, self.config.max_tracked_lines);
        if pruned > 0 {
            debug!(source = %id, pruned, "killfeed line cursor pruned");
        }
        Ok(stats)
    }

    async fn replay_files(
        &self,
        session: &C::Session,
        source: &SourceConfig,
        cursor: &mut LineSetCursor,
        stats: &mut StepStats,
    ) -> Result<usize, IngestError> {
        let id = source.source_id();
        let candidates = self
            .locator
            .list_candidates(session, source, ArtifactKind::Killfeed)
            .await?;

        let mut files = 0;
        let mut latest_ids = HashSet::new();
        for (idx, file) in candidates.iter().enumerate() {
            let still_written = idx + 1 == candidates.len();
            let Some(lines) = self
                .read_killfeed_file(session, &id, file, still_written, stats)
                .await?
            else {
                continue;
            };
            files += 1;
            if still_written {
                latest_ids.extend(lines.iter().map(|(lid, _)| *lid));
            }
            for (lid, line) in cursor.unseen(lines) {
                self.emit_kill_row(&id, &line, stats).await?;
                cursor.commit([lid]);
            }
            cursor.mark_read(file.modified);
        }

        cursor.prune(&latest_ids, self.config.max_tracked_lines);
        Ok(files)
    }

    /// CSV 파일 하나를 읽어 `(줄 식별자, 줄)` 목록을 만듭니다. 파일이 사라졌으면 `None`.
    ///
    /// 아직 쓰이는 중인 파일은 줄바꿈으로 끝나지 않은 마지막 줄을 다음 스윕으로 미룹니다.
    async fn read_killfeed_file(
        &self,
        session: &C::Session,
        id: &SourceId,
        file: &FileCandidate,
        still_written: bool,
        stats: &mut StepStats,
    ) -> Result<Option<Vec<(u64, String)>>, IngestError> {
        let mut buf = match read_whole(session, &file.path, file.size, self.config.max_read_bytes)
            .await
        {
            Ok(buf) => buf,
            Err(err) if err.is_missing() => {
                debug!(source = %id, path = %file.path, error = %err, "killfeed file vanished before read");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        metrics::counter!(
            kf_metrics::BYTES_READ_TOTAL,
            kf_metrics::LABEL_ARTIFACT => ArtifactKind::Killfeed.as_str()
        )
        .increment(buf.len() as u64);

        if !still_written && !buf.is_empty() && !buf.ends_with(b"\n") {
            buf.push(b'\n');
        }

        let mut lines = Vec::new();
        for raw in complete_lines(&buf, false) {
            let Some(text) = decode_text(id, &file.path, raw.bytes, stats) else {
                continue;
            };
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            lines.push((line_id(text), text.to_owned()));
        }
        Ok(Some(lines))
    }

    async fn emit_kill_row(
        &self,
        id: &SourceId,
        line: &str,
        stats: &mut StepStats,
    ) -> Result<(), IngestError> {
        match self.killfeed_parser.parse(line) {
            KillRowOutcome::Parsed(row) => {
                let event = normalize(row);
                trace!(source = %id, event = %event, "kill event");
                self.sink.on_kill_event(id, event).await?;
                metrics::counter!(kf_metrics::KILL_EVENTS_TOTAL, kf_metrics::LABEL_SOURCE => id.to_string())
                    .increment(1);
                stats.events += 1;
            }
            KillRowOutcome::Malformed(reason) => {
                debug!(source = %id, reason = %reason, line, "skipping malformed killfeed row");
                metrics::counter!(
                    kf_metrics::MALFORMED_LINES_TOTAL,
                    kf_metrics::LABEL_REASON => reason.label()
                )
                .increment(1);
                stats.malformed += 1;
            }
        }
        Ok(())
    }

    async fn log_step(
        &self,
        session: &C::Session,
        source: &SourceConfig,
    ) -> Result<StepStats, IngestError> {
        let id = source.source_id();
        let mut stats = StepStats::default();

        let candidates = self
            .locator
            .list_candidates(session, source, ArtifactKind::ServerLog)
            .await?;
        let Some(file) = candidates.into_iter().next() else {
            debug!(source = %id, "no server log this sweep");
            return Ok(stats);
        };

        let cursor = self.cursors.offset(&id);
        let window = cursor.window_for(&file, self.config.max_read_bytes);
        if window.rotated {
            warn!(
                source = %id,
                path = %file.path,
                offset = cursor.byte_offset,
                previous_size = cursor.last_known_size,
                size = file.size,
                "server log rotated, reading from start"
            );
            metrics::counter!(kf_metrics::LOG_ROTATIONS_TOTAL, kf_metrics::LABEL_SOURCE => id.to_string())
                .increment(1);
        }
        if window.is_empty() {
            self.cursors
                .commit_offset(&id, OffsetCursor::advanced(&window, 0, &file));
            return Ok(stats);
        }

        let len = usize::try_from(window.len()).unwrap_or(usize::MAX);
        let bytes = match session.read_range(&file.path, window.start, len).await {
            Ok(bytes) => bytes,
            Err(err) if err.is_missing() => {
                debug!(source = %id, path = %file.path, error = %err, "server log vanished before read");
                return Ok(stats);
            }
            Err(err) => return Err(err.into()),
        };
        metrics::counter!(
            kf_metrics::BYTES_READ_TOTAL,
            kf_metrics::LABEL_ARTIFACT => ArtifactKind::ServerLog.as_str()
        )
        .increment(bytes.len() as u64);
        if window.truncated {
            debug!(source = %id, start = window.start, end = window.end, size = file.size, "read capped, remainder next sweep");
        }

        let mut consumed = 0u64;
        for raw in complete_lines(&bytes, window.truncated) {
            if let Some(text) = decode_text(&id, &file.path, raw.bytes, &mut stats) {
                if let Some(event) = self.log_parser.parse(&text) {
                    if let Err(err) = self.emit_log_event(&id, event, &mut stats).await {
                        self.cursors
                            .commit_offset(&id, OffsetCursor::advanced(&window, consumed, &file));
                        self.presence.invalidate_emitted(&id);
                        return Err(err);
                    }
                }
            }
            consumed = raw.end as u64;
        }

        self.cursors
            .commit_offset(&id, OffsetCursor::advanced(&window, consumed, &file));
        Ok(stats)
    }

    async fn emit_log_event(
        &self,
        id: &SourceId,
        event: LogEvent,
        stats: &mut StepStats,
    ) -> Result<(), IngestError> {
        let update = self.presence.apply(id, &event);
        let event_type = event.kind.name();

        self.sink.on_log_event(id, event).await?;
        metrics::counter!(kf_metrics::LOG_EVENTS_TOTAL, kf_metrics::LABEL_EVENT_TYPE => event_type)
            .increment(1);
        stats.events += 1;

        if let Some(snapshot) = update.snapshot {
            self.sink.on_presence_changed(id, snapshot).await?;
            metrics::counter!(kf_metrics::PRESENCE_UPDATES_TOTAL, kf_metrics::LABEL_SOURCE => id.to_string())
                .increment(1);
            debug!(source = %id, presence = %snapshot, "presence changed");
        }
        if let Some(session) = update.playtime {
            self.sink.on_playtime_session(id, session).await?;
        }
        Ok(())
    }
}

fn is_connection_fault(err: &IngestError) -> bool {
    matches!(err, IngestError::Session(session) if session.is_connection_fault())
}

/// 줄을 텍스트로 디코딩합니다. 바이너리로 보이면 버리고 `None`.
fn decode_text<'a>(
    id: &SourceId,
    path: &str,
    bytes: &'a [u8],
    stats: &mut StepStats,
) -> Option<Cow<'a, str>> {
    match decode_line(bytes) {
        Decoded::Utf8(text) => Some(Cow::Borrowed(text)),
        Decoded::Latin1(text) => {
            warn!(source = %id, path, "line is not valid UTF-8, decoded as Latin-1");
            Some(Cow::Owned(text))
        }
        Decoded::Binary => {
            warn!(source = %id, path, len = bytes.len(), "dropping undecodable line");
            metrics::counter!(kf_metrics::UNDECODABLE_LINES_TOTAL, kf_metrics::LABEL_SOURCE => id.to_string())
                .increment(1);
            stats.undecodable += 1;
            None
        }
    }
}

/// 파일 전체를 `chunk` 단위로 읽습니다.
async fn read_whole<R: RemoteSession>(
    session: &R,
    path: &str,
    size: u64,
    chunk: usize,
) -> Result<Vec<u8>, SessionError> {
    let mut buf = Vec::with_capacity(usize::try_from(size).unwrap_or(0).min(chunk));
    loop {
        let bytes = session.read_range(path, buf.len() as u64, chunk).await?;
        buf.extend_from_slice(&bytes);
        if bytes.len() < chunk || buf.len() as u64 >= size {
            break;
        }
    }
    Ok(buf)
}
