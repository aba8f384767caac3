//! Test environment: a data directory standing in for the remote servers
//! and a `killfeed.toml` pointing at it.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use killfeed_core::config::KillfeedConfig;
use killfeed_daemon::cli::{self, DaemonCli};
use killfeed_daemon::orchestrator::Orchestrator;
use killfeed_ingest::LocalConnector;

pub const ALICE_KILLS_BOB: &str = "2025.04.30-00.16.49;Alice;1;Bob;2;AK-74;150.0;STEAM;STEAM\n";
pub const CAROL_RELOCATES: &str =
    "2025.04.30-00.17.00;Carol;3;Carol;3;suicide_by_relocation;0;STEAM;STEAM\n";

/// One remote source entry for the generated config.
pub struct TestSource {
    pub id: &'static str,
    pub host: &'static str,
    pub log_enabled: bool,
}

impl TestSource {
    pub fn new(id: &'static str, host: &'static str) -> Self {
        Self {
            id,
            host,
            log_enabled: false,
        }
    }

    pub fn with_log(mut self) -> Self {
        self.log_enabled = true;
        self
    }

    fn to_toml(&self) -> String {
        format!(
            "\n[[sources]]\nid = \"{}\"\nhost = \"{}\"\nserver_id = \"7020\"\nusername = \"ftp\"\npassword = \"secret\"\nlog_enabled = {}\n",
            self.id, self.host, self.log_enabled
        )
    }
}

pub struct TestEnv {
    root: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("should create temp dir");
        std::fs::create_dir_all(root.path().join("data")).expect("should create data dir");
        Self { root }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.path().join("data")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.path().join("killfeed.toml")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.root.path().join("run").join("killfeed.pid")
    }

    /// Write a kill-feed CSV for `host` under the default kill-feed path.
    pub fn write_kills(&self, host: &str, file: &str, content: &str) {
        self.write(&format!("{host}_7020/actual1/deathlogs/{file}"), content);
    }

    /// Write the server log for `host`.
    pub fn write_log(&self, host: &str, content: &str) {
        self.write(&format!("{host}_7020/Logs/Deadside.log"), content);
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.data_dir().join(rel);
        std::fs::create_dir_all(path.parent().expect("relative path has a parent"))
            .expect("should create remote dirs");
        std::fs::write(path, content).expect("should write remote file");
    }

    /// Write `killfeed.toml` with a 1 s sweep interval, a PID file and the given sources.
    pub fn write_config(&self, sources: &[TestSource]) {
        let mut toml = format!(
            "[general]\nlog_format = \"pretty\"\npid_file = \"{}\"\ndev_data_dir = \"{}\"\n\n[ingest]\nsweep_interval_secs = 1\nmax_connect_attempts = 1\n",
            self.pid_path().display(),
            self.data_dir().display()
        );
        for source in sources {
            toml.push_str(&source.to_toml());
        }
        std::fs::write(self.config_path(), toml).expect("should write config");
    }

    pub fn cli(&self) -> DaemonCli {
        DaemonCli {
            config: self.config_path(),
            ..DaemonCli::default()
        }
    }

    pub async fn load_config(&self) -> KillfeedConfig {
        cli::load_config(&self.cli()).await.expect("config should load")
    }

    /// Build the orchestrator the way the binary does in development mode.
    pub async fn orchestrator(&self) -> Orchestrator<LocalConnector> {
        let config = self.load_config().await;
        let connector = LocalConnector::new(Path::new(&config.general.dev_data_dir));
        Orchestrator::build_from_config(config, connector)
            .expect("orchestrator should build")
            .with_config_path(self.config_path())
    }
}
