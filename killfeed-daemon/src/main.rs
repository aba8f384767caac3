use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use killfeed_daemon::cli::{self, DaemonCli, RunMode};
use killfeed_daemon::logging;
use killfeed_daemon::orchestrator::Orchestrator;
use killfeed_ingest::{LocalConnector, SessionConnector, SftpConnector};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();
    let config = cli::load_config(&cli).await?;

    if cli.validate {
        eprintln!(
            "configuration OK: {} ({} sources)",
            cli.config.display(),
            config.sources.len()
        );
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "killfeed-daemon starting"
    );

    // dev_data_dir swaps SFTP for the local-directory connector
    if config.general.dev_data_dir.is_empty() {
        let connector = SftpConnector::new(Duration::from_secs(config.ingest.connect_timeout_secs));
        run(Orchestrator::build_from_config(config, connector)?, &cli).await
    } else {
        tracing::warn!(
            dir = %config.general.dev_data_dir,
            "development mode: serving remote paths from a local directory"
        );
        let connector = LocalConnector::new(&config.general.dev_data_dir);
        run(Orchestrator::build_from_config(config, connector)?, &cli).await
    }
}

async fn run<C: SessionConnector>(orchestrator: Orchestrator<C>, cli: &DaemonCli) -> Result<()> {
    let mut orchestrator = orchestrator.with_config_path(&cli.config);

    match cli.run_mode() {
        RunMode::Daemon => orchestrator.run().await?,
        RunMode::Once => {
            let report = orchestrator.run_once(std::io::stdout()).await?;
            let failed = report.failed_sources();
            if !failed.is_empty() {
                let ids: Vec<String> = failed.iter().map(ToString::to_string).collect();
                anyhow::bail!("{} source(s) failed: {}", ids.len(), ids.join(", "));
            }
        }
        RunMode::Replay(source_id) => {
            orchestrator.replay(&source_id, std::io::stdout()).await?;
        }
    }

    tracing::info!("killfeed-daemon shut down");
    Ok(())
}
