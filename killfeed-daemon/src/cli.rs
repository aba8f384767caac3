//! CLI argument definitions for killfeed-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use killfeed_core::config::KillfeedConfig;

/// Game-server telemetry ingestion daemon.
///
/// Polls every configured server for new kill-feed rows and server-log
/// lines and writes the resulting events to stdout as JSON lines.
#[derive(Parser, Debug, Default)]
#[command(name = "killfeed-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to killfeed.toml configuration file.
    #[arg(short, long, default_value = "/etc/killfeed/killfeed.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Run a single incremental sweep over all sources, print the events and exit.
    #[arg(long, conflicts_with = "replay")]
    pub once: bool,

    /// Re-ingest the full kill-feed history of one source, print the events and exit.
    #[arg(long, value_name = "SOURCE_ID")]
    pub replay: Option<String>,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,
}

/// What the process should do after configuration is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Long-running daemon until SIGTERM/SIGINT.
    Daemon,
    /// One incremental sweep.
    Once,
    /// Full kill-feed replay of one source.
    Replay(String),
}

impl DaemonCli {
    /// Apply command-line overrides on top of file and environment values.
    pub fn apply_overrides(&self, config: &mut KillfeedConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            config.general.log_format.clone_from(format);
        }
        if let Some(pid_file) = &self.pid_file {
            config.general.pid_file.clone_from(pid_file);
        }
    }

    pub fn run_mode(&self) -> RunMode {
        match (&self.replay, self.once) {
            (Some(source_id), _) => RunMode::Replay(source_id.clone()),
            (None, true) => RunMode::Once,
            (None, false) => RunMode::Daemon,
        }
    }
}

/// Load `killfeed.toml` with the full precedence chain:
/// file, then `KILLFEED_*` environment variables, then CLI flags.
/// Secrets referenced through `password_env` are resolved last, before validation.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, a referenced secret
/// is missing, or validation fails.
pub async fn load_config(cli: &DaemonCli) -> anyhow::Result<KillfeedConfig> {
    let mut config = KillfeedConfig::from_file(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);
    config
        .resolve_secrets()
        .map_err(|e| anyhow::anyhow!("failed to resolve secrets: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
    Ok(config)
}
