//! Command-line interface definition.

use clap::{Parser, ValueEnum};
use loyalty_core::config::{ServiceConfig, TrialConfig};
use std::path::PathBuf;

/// Background worker for loyalty login challenges and trial subscriptions.
#[derive(Parser, Debug)]
#[command(name = "loyalty-worker")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// JSON snapshot of subscription records.
    #[arg(long, env = "LOYALTY_SUBSCRIPTIONS")]
    pub subscriptions: Option<PathBuf>,

    /// Login challenge lifetime in seconds.
    #[arg(long, env = "LOYALTY_CHALLENGE_TTL_SECS")]
    pub challenge_ttl_secs: Option<u64>,

    /// Seconds between challenge sweeps.
    #[arg(long, env = "LOYALTY_SWEEP_INTERVAL_SECS")]
    pub sweep_interval_secs: Option<u64>,

    /// Hours between scheduled trial runs.
    #[arg(long, env = "LOYALTY_TRIAL_INTERVAL_HOURS")]
    pub trial_interval_hours: Option<u64>,

    /// Plan tier applied when a trial expires.
    #[arg(long, env = "LOYALTY_DOWNGRADE_PLAN")]
    pub downgrade_plan: Option<String>,

    /// Disable the trial scheduler (challenge sweeping still runs).
    #[arg(long)]
    pub no_trial_schedule: bool,

    /// Run a single trial batch, print its JSON summary and exit.
    #[arg(long, value_enum)]
    pub once: Option<Batch>,

    /// Log level.
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Emit logs as JSON.
    #[arg(long, env = "LOYALTY_JSON_LOGS")]
    pub json_logs: bool,

    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

/// Trial batch selectable with `--once`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Batch {
    /// Send outstanding trial expiry warnings.
    Warnings,
    /// Downgrade expired trials.
    Expiry,
}

impl Cli {
    /// Convert CLI arguments into a ServiceConfig.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn to_config(&self) -> color_eyre::Result<ServiceConfig> {
        // Start with default config or load from file
        let mut config = if let Some(ref path) = self.config {
            ServiceConfig::from_file(path)?
        } else {
            ServiceConfig::default()
        };

        // Override with CLI arguments
        if let Some(ref path) = self.subscriptions {
            config.subscriptions_path = path.clone();
        }
        if let Some(ttl) = self.challenge_ttl_secs {
            config.challenge.ttl_secs = ttl;
        }
        if let Some(interval) = self.sweep_interval_secs {
            config.challenge.sweep_interval_secs = interval;
        }
        config.log_level = self.log_level.clone();

        config.trial = TrialConfig {
            enabled: config.trial.enabled && !self.no_trial_schedule,
            run_interval_hours: self
                .trial_interval_hours
                .unwrap_or(config.trial.run_interval_hours),
            downgrade_plan: self
                .downgrade_plan
                .clone()
                .unwrap_or(config.trial.downgrade_plan),
            ..config.trial
        };

        Ok(config)
    }
}
