//! 수집 서비스 -- 주기적 스윕과 운영 도구용 진입점을 관리합니다.
//!
//! [`IngestService`]는 core의 [`Pipeline`](killfeed_core::pipeline::Pipeline) trait을 구현하여
//! `killfeed-daemon`에서 start/stop/health_check 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! interval tick -> IngestOrchestrator::run_incremental_sweep -> ChannelSink -> mpsc -> downstream
//! ```
//!
//! 스윕이 주기보다 오래 걸리면 밀린 tick은 건너뜁니다. 같은 서비스에서 스윕이
//! 겹쳐 실행되는 일은 없습니다.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use killfeed_core::config::SourceConfig;
use killfeed_core::error::{KillfeedError, PipelineError};
use killfeed_core::event::IngestEvent;
use killfeed_core::pipeline::{HealthStatus, Pipeline};
use killfeed_core::types::SourceId;

use crate::config::SweepConfig;
use crate::error::IngestError;
use crate::orchestrator::{
    IngestOrchestrator, ReplayReport, SourceHealth, SourceStatus, SweepReport,
};
use crate::parser::ServerLogParser;
use crate::session::{SessionConnector, SessionKey};
use crate::sink::ChannelSink;

/// 서비스 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum ServiceState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

type SharedSources = Arc<RwLock<Vec<SourceConfig>>>;

/// 수집 서비스
///
/// # 사용 예시
/// ```ignore
/// use killfeed_ingest::{IngestServiceBuilder, SftpConnector, SweepConfig};
///
/// let (mut service, event_rx) = IngestServiceBuilder::new()
///     .config(SweepConfig::from_core(&config.ingest)?)
///     .connector(SftpConnector::new(timeout))
///     .sources(config.sources.clone())
///     .build()?;
///
/// service.start().await?;
/// ```
pub struct IngestService<C: SessionConnector> {
    /// 수집기 설정
    config: SweepConfig,
    /// 현재 소스 목록 (tick마다 복사해서 사용)
    sources: SharedSources,
    /// 스윕 실행기
    orchestrator: Arc<IngestOrchestrator<C, ChannelSink>>,
    /// 현재 상태
    state: ServiceState,
    /// 스윕 루프 중단 토큰
    cancel: CancellationToken,
    /// 스윕 루프 태스크
    task: Option<JoinHandle<()>>,
}

impl<C: SessionConnector> IngestService<C> {
    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            ServiceState::Initialized => "initialized",
            ServiceState::Running => "running",
            ServiceState::Stopped => "stopped",
        }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<IngestOrchestrator<C, ChannelSink>> {
        &self.orchestrator
    }

    /// 현재 소스 목록의 복사본
    pub fn sources(&self) -> Vec<SourceConfig> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 주기와 무관하게 스윕을 한 번 실행합니다.
    pub async fn run_once(&self) -> SweepReport {
        let sources = self.sources();
        self.orchestrator.run_incremental_sweep(&sources).await
    }

    /// 소스 하나의 킬피드 이력 전체를 다시 처리합니다.
    ///
    /// # Errors
    ///
    /// 설정에 없는 소스면 `IngestError::UnknownSource`, 그 밖에는
    /// [`IngestOrchestrator::run_replay`]의 에러.
    pub async fn replay(&self, source_id: &str) -> Result<ReplayReport, IngestError> {
        let source = self
            .sources()
            .into_iter()
            .find(|s| s.id == source_id)
            .ok_or_else(|| IngestError::UnknownSource(source_id.to_owned()))?;
        self.orchestrator.run_replay(&source).await
    }

    /// 소스 목록을 교체합니다 (설정 재적재).
    ///
    /// 빠진 소스는 커서/접속 현황/헬스를 지우고, 접속 정보가 바뀐 소스는
    /// 풀에 있던 이전 세션을 닫습니다. 남아 있는 소스의 커서는 유지됩니다.
    pub async fn update_sources(&self, sources: Vec<SourceConfig>) {
        let (removed, rekeyed, remaining) = {
            let mut current = self.sources.write().unwrap_or_else(PoisonError::into_inner);
            let removed: Vec<SourceConfig> = current
                .iter()
                .filter(|old| !sources.iter().any(|s| s.id == old.id))
                .cloned()
                .collect();
            let rekeyed: Vec<SessionKey> = current
                .iter()
                .filter_map(|old| {
                    let new = sources.iter().find(|s| s.id == old.id)?;
                    let old_key = SessionKey::for_source(old);
                    (old_key != SessionKey::for_source(new)).then_some(old_key)
                })
                .collect();
            *current = sources;
            (removed, rekeyed, current.clone())
        };

        for source in &removed {
            self.orchestrator.forget_source(source, &remaining).await;
        }
        for key in &rekeyed {
            self.orchestrator.release_session(key, &remaining).await;
        }
        info!(
            sources = self.sources.read().unwrap_or_else(PoisonError::into_inner).len(),
            removed = removed.len(),
            reconnecting = rekeyed.len(),
            "source list updated"
        );
    }
}

impl<C: SessionConnector> Pipeline for IngestService<C> {
    async fn start(&mut self) -> Result<(), KillfeedError> {
        if self.state == ServiceState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        info!(
            sources = self.sources().len(),
            interval_secs = self.config.sweep_interval_secs,
            "starting ingest service"
        );

        self.cancel = CancellationToken::new();
        self.task = Some(tokio::spawn(sweep_loop(
            Arc::clone(&self.orchestrator),
            Arc::clone(&self.sources),
            self.config.sweep_interval(),
            self.cancel.clone(),
        )));

        self.state = ServiceState::Running;
        info!("ingest service started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), KillfeedError> {
        if self.state != ServiceState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping ingest service");
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                error!(error = %err, "sweep loop terminated abnormally");
            }
        }

        self.state = ServiceState::Stopped;
        info!("ingest service stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            ServiceState::Running => {
                let configured = self.sources().len();
                aggregate_health(&self.orchestrator.health_report(), configured)
            }
            ServiceState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ServiceState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 소스별 헬스를 서비스 헬스로 합칩니다.
///
/// - 모든 소스가 healthy -> `Healthy`
/// - 설정된 소스가 전부 unreachable -> `Unhealthy`
/// - 그 밖에 하나라도 degraded/unreachable -> `Degraded`
pub fn aggregate_health(report: &[(SourceId, SourceHealth)], configured: usize) -> HealthStatus {
    let failing: Vec<String> = report
        .iter()
        .filter(|(_, health)| health.status != SourceStatus::Healthy)
        .map(|(id, health)| format!("{id}: {}", health.status))
        .collect();
    if failing.is_empty() {
        return HealthStatus::Healthy;
    }

    let unreachable = report
        .iter()
        .filter(|(_, health)| health.status == SourceStatus::Unreachable)
        .count();
    if configured > 0 && unreachable >= configured {
        HealthStatus::Unhealthy(format!("all sources unreachable ({})", failing.join(", ")))
    } else {
        HealthStatus::Degraded(failing.join(", "))
    }
}

async fn sweep_loop<C: SessionConnector>(
    orchestrator: Arc<IngestOrchestrator<C, ChannelSink>>,
    sources: SharedSources,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("sweep loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                let snapshot = sources
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                if snapshot.is_empty() {
                    debug!("no sources configured, nothing to sweep");
                    continue;
                }
                tokio::select! {
                    report = orchestrator.run_incremental_sweep(&snapshot) => {
                        if orchestrator.sink().is_closed() {
                            warn!(trace_id = %report.trace_id, "event receiver closed, stopping sweeps");
                            break;
                        }
                    }
                    () = cancel.cancelled() => {
                        info!("sweep interrupted by shutdown");
                        break;
                    }
                }
            }
        }
    }
}

/// 수집 서비스 빌더
///
/// 서비스를 구성하고 출력 채널을 생성합니다.
pub struct IngestServiceBuilder<C: SessionConnector> {
    config: SweepConfig,
    connector: Option<C>,
    sources: Vec<SourceConfig>,
    event_tx: Option<mpsc::Sender<IngestEvent>>,
    log_parser: Option<ServerLogParser>,
}

impl<C: SessionConnector> IngestServiceBuilder<C> {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: SweepConfig::default(),
            connector: None,
            sources: Vec::new(),
            event_tx: None,
            log_parser: None,
        }
    }

    /// 수집기 설정을 지정합니다.
    pub fn config(mut self, config: SweepConfig) -> Self {
        self.config = config;
        self
    }

    /// 원격 세션 커넥터를 지정합니다 (필수).
    pub fn connector(mut self, connector: C) -> Self {
        self.connector = Some(connector);
        self
    }

    /// 폴링할 소스 목록을 지정합니다.
    pub fn sources(mut self, sources: Vec<SourceConfig>) -> Self {
        self.sources = sources;
        self
    }

    /// 외부 이벤트 전송 채널을 설정합니다.
    ///
    /// 설정하지 않으면 빌더가 `event_channel_capacity` 크기의 새 채널을 생성합니다.
    pub fn event_sender(mut self, tx: mpsc::Sender<IngestEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// 기본 서버 로그 문법 대신 사용할 파서를 지정합니다.
    pub fn log_parser(mut self, parser: ServerLogParser) -> Self {
        self.log_parser = Some(parser);
        self
    }

    /// 서비스를 빌드합니다.
    ///
    /// # Returns
    /// - `IngestService`: 서비스 인스턴스
    /// - `Option<mpsc::Receiver<IngestEvent>>`: 이벤트 수신 채널
    ///   (외부 event_sender를 설정한 경우 None)
    pub fn build(
        self,
    ) -> Result<(IngestService<C>, Option<mpsc::Receiver<IngestEvent>>), IngestError> {
        let connector = self.connector.ok_or_else(|| IngestError::Config {
            field: "connector".to_owned(),
            reason: "a session connector is required".to_owned(),
        })?;

        let (sink, event_rx) = match self.event_tx {
            Some(tx) => (ChannelSink::new(tx), None),
            None => {
                let (sink, rx) = ChannelSink::with_capacity(self.config.event_channel_capacity);
                (sink, Some(rx))
            }
        };

        let mut orchestrator =
            IngestOrchestrator::new(self.config.clone(), connector, Arc::new(sink))?;
        if let Some(parser) = self.log_parser {
            orchestrator = orchestrator.with_log_parser(parser);
        }

        let service = IngestService {
            config: self.config,
            sources: Arc::new(RwLock::new(self.sources)),
            orchestrator: Arc::new(orchestrator),
            state: ServiceState::Initialized,
            cancel: CancellationToken::new(),
            task: None,
        };

        Ok((service, event_rx))
    }
}

impl<C: SessionConnector> Default for IngestServiceBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use killfeed_core::event::EventPayload;

    use super::*;
    use crate::config::SweepConfigBuilder;
    use crate::error::SessionError;
    use crate::session::LocalConnector;
    use crate::session::testing::ScriptedConnector;

    fn source(id: &str, host: &str) -> SourceConfig {
        killfeed_core::config::KillfeedConfig::parse(&format!(
            "[[sources]]\nid = \"{id}\"\nhost = \"{host}\"\nserver_id = \"7020\"\nusername = \"ftp\"\n"
        ))
        .unwrap()
        .sources
        .remove(0)
    }

    fn write_kills(root: &Path, host: &str) {
        let dir = root.join(format!("{host}_7020/actual1/deathlogs"));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("2025.04.30-00.00.00.csv"),
            "2025.04.30-00.16.49;Alice;1;Bob;2;AK-74;150.0;STEAM;STEAM\n",
        )
        .unwrap();
    }

    fn fast_config() -> SweepConfig {
        SweepConfigBuilder::new().sweep_interval_secs(1).build().unwrap()
    }

    fn healthy(id: &str) -> (SourceId, SourceHealth) {
        (SourceId::from(id), SourceHealth::default())
    }

    fn with_status(id: &str, status: SourceStatus) -> (SourceId, SourceHealth) {
        (
            SourceId::from(id),
            SourceHealth {
                status,
                consecutive_failures: 3,
                ..SourceHealth::default()
            },
        )
    }

    #[test]
    fn builder_requires_connector() {
        let result = IngestServiceBuilder::<LocalConnector>::new().build();
        assert!(matches!(result, Err(IngestError::Config { .. })));
    }

    #[test]
    fn builder_creates_receiver_unless_sender_given() {
        let dir = tempfile::tempdir().unwrap();
        let (service, rx) = IngestServiceBuilder::new()
            .connector(LocalConnector::new(dir.path()))
            .build()
            .unwrap();
        assert_eq!(service.state_name(), "initialized");
        assert!(rx.is_some());

        let (tx, _rx) = mpsc::channel(4);
        let (_service, rx) = IngestServiceBuilder::new()
            .connector(LocalConnector::new(dir.path()))
            .event_sender(tx)
            .build()
            .unwrap();
        assert!(rx.is_none());
    }

    #[test]
    fn builder_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SweepConfig::default();
        config.max_concurrent_sources = 0;

        let result = IngestServiceBuilder::new()
            .config(config)
            .connector(LocalConnector::new(dir.path()))
            .build();

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let (mut service, _rx) = IngestServiceBuilder::new()
            .config(fast_config())
            .connector(LocalConnector::new(dir.path()))
            .build()
            .unwrap();

        // Before start
        assert!(service.health_check().await.is_unhealthy());
        assert!(service.stop().await.is_err());

        // Running
        service.start().await.unwrap();
        assert!(service.start().await.is_err(), "double start must fail");
        assert!(service.health_check().await.is_healthy());

        // Stopped
        service.stop().await.unwrap();
        assert_eq!(service.state_name(), "stopped");
        assert_eq!(
            service.health_check().await,
            HealthStatus::Unhealthy("stopped".to_owned())
        );

        // Restartable
        service.start().await.unwrap();
        service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn started_service_sweeps_immediately() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        write_kills(dir.path(), "10.0.0.5");
        let (mut service, rx) = IngestServiceBuilder::new()
            .config(fast_config())
            .connector(LocalConnector::new(dir.path()))
            .sources(vec![source("eu-1", "10.0.0.5")])
            .build()
            .unwrap();
        let mut rx = rx.unwrap();

        // When
        service.start().await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        service.stop().await.unwrap();

        // Then
        assert_eq!(event.source_id, SourceId::from("eu-1"));
        assert!(matches!(event.payload, EventPayload::Kill(ref k) if k.weapon == "AK-74"));
    }

    #[tokio::test]
    async fn run_once_and_replay_share_cursor() {
        let dir = tempfile::tempdir().unwrap();
        write_kills(dir.path(), "10.0.0.5");
        let (service, rx) = IngestServiceBuilder::new()
            .connector(LocalConnector::new(dir.path()))
            .sources(vec![source("eu-1", "10.0.0.5")])
            .build()
            .unwrap();
        let mut rx = rx.unwrap();

        let replay = service.replay("eu-1").await.unwrap();
        let sweep = service.run_once().await;

        assert_eq!(replay.events, 1);
        assert_eq!(sweep.events(), 0);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.metadata.trace_id, replay.trace_id);
    }

    #[tokio::test]
    async fn replay_of_unknown_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _rx) = IngestServiceBuilder::new()
            .connector(LocalConnector::new(dir.path()))
            .build()
            .unwrap();

        let err = service.replay("nope").await.unwrap_err();

        assert!(matches!(err, IngestError::UnknownSource(ref id) if id == "nope"));
    }

    #[tokio::test]
    async fn removed_source_is_forgotten() {
        // Given: two sources, both swept once
        let dir = tempfile::tempdir().unwrap();
        write_kills(dir.path(), "10.0.0.5");
        write_kills(dir.path(), "10.0.0.6");
        let (service, _rx) = IngestServiceBuilder::new()
            .connector(LocalConnector::new(dir.path()))
            .sources(vec![source("eu-1", "10.0.0.5"), source("us-1", "10.0.0.6")])
            .build()
            .unwrap();
        service.run_once().await;
        let us = SourceId::from("us-1");
        assert_eq!(service.orchestrator().cursors().tracked_lines(&us), 1);

        // When
        service.update_sources(vec![source("eu-1", "10.0.0.5")]).await;

        // Then
        assert_eq!(service.sources().len(), 1);
        assert_eq!(service.orchestrator().cursors().tracked_lines(&us), 0);
        let eu = SourceId::from("eu-1");
        assert_eq!(service.orchestrator().cursors().tracked_lines(&eu), 1);
        assert_eq!(service.orchestrator().pool().slot_count(), 1);
    }

    #[tokio::test]
    async fn persistent_auth_failure_degrades_health() {
        let dir = tempfile::tempdir().unwrap();
        let auth = SessionError::Auth {
            host: "10.0.0.5".to_owned(),
            user: "ftp".to_owned(),
            reason: "bad password".to_owned(),
        };
        let connector = ScriptedConnector::new(dir.path()).with_connect_errors(vec![auth; 64]);
        let (mut service, _rx) = IngestServiceBuilder::new()
            .config(fast_config())
            .connector(connector)
            .sources(vec![source("eu-1", "10.0.0.5"), source("us-1", "10.0.0.6")])
            .build()
            .unwrap();

        service.start().await.unwrap();
        let status = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let status = service.health_check().await;
                if !status.is_healthy() {
                    return status;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        service.stop().await.unwrap();

        assert!(matches!(status, HealthStatus::Degraded(_) | HealthStatus::Unhealthy(_)));
    }

    #[test]
    fn aggregate_all_healthy() {
        let report = [healthy("eu-1"), healthy("us-1")];
        assert_eq!(aggregate_health(&report, 2), HealthStatus::Healthy);
        assert_eq!(aggregate_health(&[], 0), HealthStatus::Healthy);
    }

    #[test]
    fn aggregate_partial_failure_is_degraded() {
        let report = [healthy("eu-1"), with_status("us-1", SourceStatus::Unreachable)];
        assert_eq!(
            aggregate_health(&report, 2),
            HealthStatus::Degraded("us-1: unreachable".to_owned())
        );
    }

    #[test]
    fn aggregate_all_unreachable_is_unhealthy() {
        let report = [
            with_status("eu-1", SourceStatus::Unreachable),
            with_status("us-1", SourceStatus::Unreachable),
        ];
        assert!(aggregate_health(&report, 2).is_unhealthy());
    }
}
