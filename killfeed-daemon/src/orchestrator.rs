//! Daemon orchestration -- assembly, output wiring, and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `killfeed-daemon`.
//! It takes the loaded configuration, builds the ingest service, connects
//! its event channel to the JSON-lines writer, and runs one of three modes:
//!
//! - [`Orchestrator::run`]: long-running daemon until SIGTERM/SIGINT,
//!   reloading `[[sources]]` on SIGHUP
//! - [`Orchestrator::run_once`]: one incremental sweep, then exit
//! - [`Orchestrator::replay`]: full kill-feed history of one source, then exit
//!
//! # Shutdown Order (producer first)
//!
//! 1. Ingest service (cancel the sweep loop)
//! 2. Event writer (drain what the last sweep queued, flush)
//! 3. Background tasks (uptime updater)

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use killfeed_core::config::KillfeedConfig;
use killfeed_core::event::IngestEvent;
use killfeed_core::pipeline::{HealthStatus, Pipeline};
use killfeed_ingest::{
    IngestService, IngestServiceBuilder, ReplayReport, SessionConnector, SweepConfig, SweepReport,
};

use crate::health::{ComponentHealth, DaemonHealth, SourceHealthReport, aggregate_status};
use crate::metrics_server;
use crate::output::spawn_event_writer;

/// How often the run loop logs aggregated health.
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// How often the uptime gauge is refreshed.
const UPTIME_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// Control signals delivered to the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonSignal {
    /// Stop the daemon; carries the signal name for logging.
    Shutdown(&'static str),
    /// Re-read the configuration file and apply source changes.
    Reload,
}

/// The main daemon orchestrator.
pub struct Orchestrator<C: SessionConnector> {
    /// Loaded and validated configuration.
    config: KillfeedConfig,
    /// Configuration file, re-read on reload.
    config_path: Option<PathBuf>,
    /// Ingest service (`None` when `[ingest] enabled = false`).
    service: Option<IngestService<C>>,
    /// Event receiver, moved into the writer task when output starts.
    event_rx: Option<mpsc::Receiver<IngestEvent>>,
    /// Event writer task.
    writer_task: Option<JoinHandle<u64>>,
    /// Shutdown broadcast sender (signals all background tasks).
    shutdown_tx: broadcast::Sender<()>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl<C: SessionConnector> Orchestrator<C> {
    /// Build from an already-loaded configuration.
    ///
    /// Installs the metrics recorder when enabled, then builds the ingest
    /// service with the given session connector.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails, the metrics endpoint cannot be
    /// installed, or the ingest service cannot be built.
    pub fn build_from_config(config: KillfeedConfig, connector: C) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        let (service, event_rx) = if config.ingest.enabled {
            tracing::info!(sources = config.sources.len(), "initializing ingest service");
            let sweep_config = SweepConfig::from_core(&config.ingest)
                .map_err(|e| anyhow::anyhow!("invalid ingest config: {}", e))?;
            let (service, event_rx) = IngestServiceBuilder::new()
                .config(sweep_config)
                .connector(connector)
                .sources(config.sources.clone())
                .build()
                .map_err(|e| anyhow::anyhow!("failed to build ingest service: {}", e))?;
            (Some(service), event_rx)
        } else {
            tracing::warn!("ingest disabled in configuration, no sources will be polled");
            (None, None)
        };

        let (shutdown_tx, _) = broadcast::channel(16);

        if config.metrics.enabled {
            record_daemon_metrics(config.sources.len());
        }

        tracing::info!(
            ingest_enabled = service.is_some(),
            sources = config.sources.len(),
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            config_path: None,
            service,
            event_rx,
            writer_task: None,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Remember the configuration file so SIGHUP can re-read it.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Run as a daemon, writing events to stdout, until SIGTERM or SIGINT.
    ///
    /// # Errors
    ///
    /// Returns an error if signal handlers cannot be installed, the PID file
    /// cannot be written, or the ingest service fails to start.
    pub async fn run(&mut self) -> Result<()> {
        let signals = spawn_signal_listener()?;
        self.run_with(std::io::stdout(), signals).await
    }

    /// Run the daemon loop with an explicit output and signal source.
    ///
    /// The PID file (if configured) exists exactly for the duration of this call.
    pub async fn run_with<W>(
        &mut self,
        writer: W,
        mut signals: mpsc::Receiver<DaemonSignal>,
    ) -> Result<()>
    where
        W: Write + Send + 'static,
    {
        let pid_file = self.pid_file();
        if let Some(path) = &pid_file {
            write_pid_file(path)?;
        }

        let result = self.serve(writer, &mut signals).await;

        if let Some(path) = &pid_file {
            remove_pid_file(path);
        }
        result
    }

    async fn serve<W>(&mut self, writer: W, signals: &mut mpsc::Receiver<DaemonSignal>) -> Result<()>
    where
        W: Write + Send + 'static,
    {
        if let Some(event_rx) = self.event_rx.take() {
            self.writer_task = Some(spawn_event_writer(
                event_rx,
                writer,
                self.shutdown_tx.subscribe(),
            ));
        }

        if let Some(service) = self.service.as_mut() {
            if let Err(e) = service.start().await {
                tracing::error!(error = %e, "ingest service failed to start");
                let _ = self.shutdown_tx.send(());
                if let Some(task) = self.writer_task.take() {
                    let _ = task.await;
                }
                return Err(anyhow::anyhow!("failed to start ingest service: {}", e));
            }
        }

        let uptime_task = self
            .config
            .metrics
            .enabled
            .then(|| spawn_uptime_updater(self.start_time, self.shutdown_tx.subscribe()));

        let mut health_ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + HEALTH_LOG_INTERVAL,
            HEALTH_LOG_INTERVAL,
        );
        health_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!("entering main event loop");
        let reason = loop {
            tokio::select! {
                signal = signals.recv() => match signal {
                    Some(DaemonSignal::Shutdown(name)) => break name,
                    Some(DaemonSignal::Reload) => {
                        if let Err(e) = self.reload().await {
                            tracing::error!(error = %e, "configuration reload failed, keeping current sources");
                        }
                    }
                    None => break "signal listener closed",
                },
                _ = health_ticker.tick() => self.log_health().await,
            }
        };
        tracing::info!(signal = reason, "shutdown signal received");

        self.shutdown().await;
        if let Some(task) = uptime_task {
            let _ = task.await;
        }
        Ok(())
    }

    /// Stop the service, then drain and stop the writer.
    async fn shutdown(&mut self) {
        if let Some(service) = self.service.as_mut() {
            if let Err(e) = service.stop().await {
                tracing::error!(error = %e, "failed to stop ingest service");
            }
        }

        tracing::info!("broadcasting shutdown signal to all tasks");
        let _ = self.shutdown_tx.send(());

        if let Some(task) = self.writer_task.take() {
            match task.await {
                Ok(written) => tracing::info!(written, "event output drained"),
                Err(e) => tracing::error!(error = %e, "event writer terminated abnormally"),
            }
        }
    }

    /// Run one incremental sweep over all sources and write its events.
    ///
    /// Consumes the event output; call at most once per orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if ingest is disabled or the output was already used.
    pub async fn run_once<W>(&mut self, writer: W) -> Result<SweepReport>
    where
        W: Write + Send + 'static,
    {
        let service = self
            .service
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("ingest is disabled in configuration"))?;
        let event_rx = self
            .event_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("event output already consumed"))?;
        let writer_task = spawn_event_writer(event_rx, writer, self.shutdown_tx.subscribe());

        let report = service.run_once().await;

        let _ = self.shutdown_tx.send(());
        let written = writer_task
            .await
            .map_err(|e| anyhow::anyhow!("event writer failed: {}", e))?;

        tracing::info!(
            trace_id = %report.trace_id,
            events = report.events(),
            written,
            failed_sources = report.failed_sources().len(),
            duration_ms = report.duration.as_millis() as u64,
            "single sweep finished"
        );
        Ok(report)
    }

    /// Re-ingest the full kill-feed history of one source and write its events.
    ///
    /// Consumes the event output; call at most once per orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if ingest is disabled, the output was already used,
    /// the source is unknown, or the replay itself fails.
    pub async fn replay<W>(&mut self, source_id: &str, writer: W) -> Result<ReplayReport>
    where
        W: Write + Send + 'static,
    {
        let service = self
            .service
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("ingest is disabled in configuration"))?;
        let event_rx = self
            .event_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("event output already consumed"))?;
        let writer_task = spawn_event_writer(event_rx, writer, self.shutdown_tx.subscribe());

        let result = service.replay(source_id).await;

        let _ = self.shutdown_tx.send(());
        let written = writer_task
            .await
            .map_err(|e| anyhow::anyhow!("event writer failed: {}", e))?;

        let report = result.map_err(|e| anyhow::anyhow!("replay of '{}' failed: {}", source_id, e))?;
        tracing::info!(
            source = %report.source_id,
            trace_id = %report.trace_id,
            files = report.files,
            events = report.events,
            malformed = report.malformed,
            written,
            "replay finished"
        );
        Ok(report)
    }

    /// Re-read the configuration file and apply `[[sources]]` changes.
    ///
    /// Other sections only take effect after a restart.
    ///
    /// # Errors
    ///
    /// Returns an error if no configuration file is known or the new file
    /// fails to load or validate. The current sources stay in place.
    pub async fn reload(&mut self) -> Result<()> {
        let path = self
            .config_path
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no configuration file to reload"))?;
        tracing::info!(path = %path.display(), "reloading configuration");

        let fresh = KillfeedConfig::load(path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to reload config: {}", e))?;

        if let Some(service) = &self.service {
            service.update_sources(fresh.sources.clone()).await;
        }
        if self.config.metrics.enabled {
            #[allow(clippy::cast_precision_loss)]
            metrics::gauge!(killfeed_core::metrics::DAEMON_SOURCES_CONFIGURED)
                .set(fresh.sources.len() as f64);
        }
        self.config.sources = fresh.sources;
        Ok(())
    }

    /// Get the current aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        let mut components = Vec::with_capacity(2);
        let mut sources = Vec::new();

        match &self.service {
            Some(service) => {
                components.push(ComponentHealth {
                    name: "ingest".to_owned(),
                    enabled: true,
                    status: service.health_check().await,
                });
                sources = service
                    .orchestrator()
                    .health_report()
                    .iter()
                    .map(|(id, health)| SourceHealthReport::new(id, health))
                    .collect();
            }
            None => components.push(ComponentHealth {
                name: "ingest".to_owned(),
                enabled: false,
                status: HealthStatus::Unhealthy("disabled".to_owned()),
            }),
        }

        let writer_status = match &self.writer_task {
            Some(task) if !task.is_finished() => HealthStatus::Healthy,
            Some(_) => HealthStatus::Unhealthy("event output stopped".to_owned()),
            None => HealthStatus::Unhealthy("not started".to_owned()),
        };
        components.push(ComponentHealth {
            name: "event-writer".to_owned(),
            enabled: self.service.is_some(),
            status: writer_status,
        });

        let uptime_secs = self.start_time.elapsed().as_secs();
        if self.config.metrics.enabled {
            #[allow(clippy::cast_precision_loss)]
            metrics::gauge!(killfeed_core::metrics::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
        }

        DaemonHealth {
            status: aggregate_status(&components),
            uptime_secs,
            components,
            sources,
        }
    }

    async fn log_health(&self) {
        let health = self.health().await;
        match &health.status {
            HealthStatus::Healthy => {
                tracing::debug!(uptime_secs = health.uptime_secs, "daemon healthy");
            }
            status => {
                let sources = serde_json::to_string(&health.sources).unwrap_or_default();
                tracing::warn!(status = %status, sources = %sources, "daemon health check");
            }
        }
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &KillfeedConfig {
        &self.config
    }

    /// The ingest service, if enabled.
    pub fn service(&self) -> Option<&IngestService<C>> {
        self.service.as_ref()
    }

    fn pid_file(&self) -> Option<PathBuf> {
        let path = &self.config.general.pid_file;
        (!path.is_empty()).then(|| PathBuf::from(path))
    }
}

/// Install SIGTERM/SIGINT/SIGHUP handlers and forward them as [`DaemonSignal`]s.
///
/// The forwarding task ends after the first shutdown signal.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
pub fn spawn_signal_listener() -> Result<mpsc::Receiver<DaemonSignal>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;
    let mut sighup = signal(SignalKind::hangup())
        .map_err(|e| anyhow::anyhow!("failed to install SIGHUP handler: {}", e))?;

    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        loop {
            let signal = tokio::select! {
                _ = sigterm.recv() => DaemonSignal::Shutdown("SIGTERM"),
                _ = sigint.recv() => DaemonSignal::Shutdown("SIGINT"),
                _ = sighup.recv() => DaemonSignal::Reload,
            };
            let last = matches!(signal, DaemonSignal::Shutdown(_));
            if tx.send(signal).await.is_err() || last {
                break;
            }
        }
    });
    Ok(rx)
}

/// Write the current process PID to a file.
///
/// Used to prevent duplicate daemon instances.
///
/// # Security
///
/// - `create_new(true)` creates the file atomically, so an existing file is never overwritten
/// - The created file must be a regular file
/// - The parent directory is created with mode 0o700, the file with 0o600
///
/// # Errors
///
/// Returns an error if the PID file already exists or cannot be written.
pub fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::ErrorKind;

    if let Some(parent) = path.parent() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            fs::DirBuilder::new()
                .mode(0o700)
                .recursive(true)
                .create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    if !file.metadata()?.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    let pid = std::process::id();
    writeln!(file, "{pid}")?;

    tracing::info!(pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on daemon shutdown.
///
/// Logs a warning but does not fail if the file cannot be removed.
pub fn remove_pid_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::info!(path = %path.display(), "PID file removed"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file"),
    }
}

/// Record daemon-level metrics (build info, configured sources).
fn record_daemon_metrics(source_count: usize) {
    use killfeed_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    #[allow(clippy::cast_precision_loss)]
    metrics::gauge!(m::DAEMON_SOURCES_CONFIGURED).set(source_count as f64);

    tracing::debug!(
        source_count,
        version = env!("CARGO_PKG_VERSION"),
        "daemon metrics recorded"
    );
}

/// Spawn a background task that periodically updates the uptime gauge.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    use killfeed_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_UPDATE_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
