use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;

use crate::feed::{default_backfill_step, DEFAULT_BACKFILL_ROUNDS, DEFAULT_SCROLL_THRESHOLD};
use crate::relay::DEFAULT_CONNECT_ATTEMPTS;

/// One year.
const MAX_BACKFILL_STEP_MINUTES: i64 = 60 * 24 * 366;

const DEFAULT_NODE_URL: &str = "http://127.0.0.1:4000";
const DEFAULT_DIRECTORY_URL: &str = "https://docs.google.com/spreadsheets/d/e/2PACX-1vRDDE0x6LttdW13zLUwodMcVBsqk8fpnUsv-5SIJifZKWRehFpSKuJZawhswGMHSI2fZJDuENQ8SX1v/pub?output=csv";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the local node daemon.
    pub node_url: String,
    /// Published CSV sheet listing relay multiaddrs.
    pub directory_url: String,
    pub community: String,
    pub connect_attempts: u32,
    pub retry_delay_ms: u64,
    pub backfill_rounds: u32,
    pub backfill_step_minutes: i64,
    pub scroll_threshold: u32,
    pub sort_by_newest: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_url: DEFAULT_NODE_URL.to_string(),
            directory_url: DEFAULT_DIRECTORY_URL.to_string(),
            community: "0".to_string(),
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            retry_delay_ms: 1000,
            backfill_rounds: DEFAULT_BACKFILL_ROUNDS,
            backfill_step_minutes: 60,
            scroll_threshold: DEFAULT_SCROLL_THRESHOLD,
            sort_by_newest: true,
        }
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("librx").join("config.toml"))
    }

    /// Read `path`, or the default location when `None`. A missing file
    /// means defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => return Ok(Self::default()),
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_BACKFILL_STEP_MINUTES).contains(&self.backfill_step_minutes) {
            bail!(
                "backfill_step_minutes must be between 1 and {}, got {}",
                MAX_BACKFILL_STEP_MINUTES,
                self.backfill_step_minutes
            );
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Clamped to the range `validate` accepts.
    pub fn backfill_step(&self) -> TimeDelta {
        let minutes = self
            .backfill_step_minutes
            .clamp(1, MAX_BACKFILL_STEP_MINUTES);
        TimeDelta::try_minutes(minutes).unwrap_or_else(default_backfill_step)
    }
}
