//! Configuration for loyalty-core.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Login challenge settings.
    #[serde(default)]
    pub challenge: ChallengeConfig,

    /// Trial lifecycle settings.
    #[serde(default)]
    pub trial: TrialConfig,

    /// JSON snapshot backing the bundled subscription store.
    #[serde(default = "default_subscriptions_path")]
    pub subscriptions_path: PathBuf,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Login challenge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeConfig {
    /// Challenge lifetime in seconds.
    #[serde(default = "default_challenge_ttl")]
    pub ttl_secs: u64,

    /// Sweep period in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Number of lock shards in the challenge map.
    #[serde(default = "default_shards")]
    pub shards: usize,
}

/// Trial lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialConfig {
    /// Run the warning and expiry batches on a timer.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Hours between scheduled runs.
    #[serde(default = "default_run_interval")]
    pub run_interval_hours: u64,

    /// Plan tier applied when a trial expires.
    #[serde(default = "default_downgrade_plan")]
    pub downgrade_plan: String,

    /// Records processed concurrently within a run.
    #[serde(default = "default_max_concurrent_sends")]
    pub max_concurrent_sends: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            challenge: ChallengeConfig::default(),
            trial: TrialConfig::default(),
            subscriptions_path: default_subscriptions_path(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_challenge_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            shards: default_shards(),
        }
    }
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            run_interval_hours: default_run_interval(),
            downgrade_plan: default_downgrade_plan(),
            max_concurrent_sends: default_max_concurrent_sends(),
        }
    }
}

impl ChallengeConfig {
    /// Challenge lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Sweep period (at least one second).
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl TrialConfig {
    /// Period between scheduled runs (at least one hour).
    #[must_use]
    pub fn run_interval(&self) -> Duration {
        Duration::from_secs(self.run_interval_hours.max(1) * 3600)
    }
}

fn default_subscriptions_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "loyalty")
        .map(|dirs| dirs.data_dir().join("subscriptions.json"))
        .unwrap_or_else(|| PathBuf::from(".loyalty/subscriptions.json"))
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_challenge_ttl() -> u64 {
    300 // 5 minutes
}

const fn default_sweep_interval() -> u64 {
    300 // 5 minutes
}

const fn default_shards() -> usize {
    16
}

const fn default_true() -> bool {
    true
}

const fn default_run_interval() -> u64 {
    24 // daily
}

fn default_downgrade_plan() -> String {
    crate::trial::DEFAULT_DOWNGRADE_PLAN.to_string()
}

const fn default_max_concurrent_sends() -> usize {
    8
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
