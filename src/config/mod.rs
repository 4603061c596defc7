// ABOUTME: Configuration types and parsing for keel.yml.
// ABOUTME: Handles YAML parsing, discovery and validation of controller settings.

mod deserialize;
mod init;

pub use init::init_config;

use crate::controller::Backoff;
use crate::error::{Error, Result};
use crate::store::memory::DEFAULT_WATCH_BUFFER;
use crate::types::HashWidth;
use deserialize::deserialize_hash_width;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "keel.yml";
pub const CONFIG_FILENAME_ALT: &str = "keel.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".keel/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub workers: WorkersConfig,

    #[serde(default)]
    pub backoff: BackoffConfig,

    #[serde(default, deserialize_with = "deserialize_hash_width")]
    pub content_hash_width: HashWidth,

    /// In-place retries of a conflicting claim write before backing off.
    #[serde(default = "default_claim_retries")]
    pub claim_retries: u32,

    /// Consecutive failures of one key before it is reported.
    #[serde(default = "default_failure_alert_threshold")]
    pub failure_alert_threshold: u32,

    /// Events buffered per watch subscriber before it lags.
    #[serde(default = "default_watch_buffer")]
    pub watch_buffer: usize,
}

/// Worker pool size per controller.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_workers")]
    pub builds: usize,
    #[serde(default = "default_workers")]
    pub systems: usize,
    #[serde(default = "default_workers")]
    pub deploys: usize,
    #[serde(default = "default_workers")]
    pub teardowns: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            builds: default_workers(),
            systems: default_workers(),
            deploys: default_workers(),
            teardowns: default_workers(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_base", with = "humantime_serde")]
    pub base: Duration,
    #[serde(default = "default_backoff_max", with = "humantime_serde")]
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: default_backoff_base(),
            max: default_backoff_max(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_backoff_base() -> Duration {
    Duration::from_millis(5)
}

fn default_backoff_max() -> Duration {
    Duration::from_secs(300)
}

fn default_claim_retries() -> u32 {
    3
}

fn default_failure_alert_threshold() -> u32 {
    5
}

fn default_watch_buffer() -> usize {
    DEFAULT_WATCH_BUFFER
}

impl Default for Config {
    fn default() -> Self {
        Config {
            workers: WorkersConfig::default(),
            backoff: BackoffConfig::default(),
            content_hash_width: HashWidth::default(),
            claim_retries: default_claim_retries(),
            failure_alert_threshold: default_failure_alert_threshold(),
            watch_buffer: default_watch_buffer(),
        }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty file means "all defaults".
        if yaml.trim().is_empty() {
            return Ok(Config::default());
        }
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Load from `explicit` if given, else discover in `dir`, else defaults.
    pub fn resolve(explicit: Option<&Path>, dir: &Path) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => match Self::discover(dir) {
                Err(Error::ConfigNotFound(_)) => Ok(Config::default()),
                other => other,
            },
        }
    }

    fn validate(&self) -> Result<()> {
        let workers = [
            ("builds", self.workers.builds),
            ("systems", self.workers.systems),
            ("deploys", self.workers.deploys),
            ("teardowns", self.workers.teardowns),
        ];
        for (name, count) in workers {
            if count == 0 {
                return Err(Error::InvalidConfig(format!(
                    "workers.{name} must be at least 1"
                )));
            }
        }
        if self.backoff.base.is_zero() {
            return Err(Error::InvalidConfig("backoff.base must be positive".into()));
        }
        if self.backoff.base > self.backoff.max {
            return Err(Error::InvalidConfig(
                "backoff.base must not exceed backoff.max".into(),
            ));
        }
        if self.watch_buffer == 0 {
            return Err(Error::InvalidConfig("watch_buffer must be at least 1".into()));
        }
        Ok(())
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.backoff.base, self.backoff.max)
    }
}
