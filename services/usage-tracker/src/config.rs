use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use model_quota_ledger::shortest_period;

#[derive(Debug, Clone)]
pub struct UsageTrackerConfig {
    pub server_host: String,
    pub server_port: u16,
    pub data_dir: PathBuf,
    pub sweep_interval_secs: u64,
    pub change_poll_interval_secs: u64,
    pub log_level: String,
}

impl Default for UsageTrackerConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 8184,
            data_dir: PathBuf::from("data/usage"),
            sweep_interval_secs: 60,
            change_poll_interval_secs: 5,
            log_level: "info".to_string(),
        }
    }
}

impl UsageTrackerConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(host) = env::var("USAGE_HOST") {
            cfg.server_host = host;
        }
        if let Ok(port) = env::var("USAGE_PORT") {
            cfg.server_port = port.parse().context("USAGE_PORT must be a valid u16")?;
        }
        if let Ok(dir) = env::var("USAGE_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Ok(interval) = env::var("SWEEP_INTERVAL_SECS") {
            cfg.sweep_interval_secs = interval
                .parse()
                .context("SWEEP_INTERVAL_SECS must be a positive integer")?;
        }
        if let Ok(interval) = env::var("CHANGE_POLL_INTERVAL_SECS") {
            cfg.change_poll_interval_secs = interval
                .parse()
                .context("CHANGE_POLL_INTERVAL_SECS must be a positive integer")?;
        }
        if let Ok(level) = env::var("LOG_LEVEL") {
            cfg.log_level = level;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ensure_directory(&self.data_dir)?;

        if self.sweep_interval_secs == 0 {
            anyhow::bail!("SWEEP_INTERVAL_SECS must be greater than zero");
        }
        if self.change_poll_interval_secs == 0 {
            anyhow::bail!("CHANGE_POLL_INTERVAL_SECS must be greater than zero");
        }

        let shortest = shortest_period().num_seconds().max(0) as u64;
        if self.sweep_interval_secs >= shortest {
            anyhow::bail!(
                "SWEEP_INTERVAL_SECS must be shorter than the shortest quota period ({shortest}s)"
            );
        }

        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn change_poll_interval(&self) -> Duration {
        Duration::from_secs(self.change_poll_interval_secs)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn ensure_directory(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            anyhow::bail!("{} exists but is not a directory", path.display());
        }
    } else {
        fs::create_dir_all(path)
            .with_context(|| format!("unable to create data directory {}", path.display()))?;
    }
    Ok(())
}
