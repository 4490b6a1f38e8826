//! CLI argument definitions for the holdoff harness.
//!
//! Uses `clap` with derive macros.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use holdoff_core::types::DurationUnit;

/// holdoff: hold mutating device-management calls behind a delay.
#[derive(Parser, Debug)]
#[command(name = "holdoff", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for the database and the simulated device.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run the scheduler in the foreground until interrupted.
    Run,
    /// Apply every change that is due right now, then exit.
    Tick,
    /// Show the delay policy and the queue summary.
    Status,
    /// Turn the delay on. Takes effect immediately.
    Enable,
    /// Queue turning the delay off behind the current delay.
    Disable,
    /// Change the delay duration (queued while the delay is on).
    SetDelay {
        value: u32,
        /// seconds, minutes or hours
        unit: DurationUnit,
    },
    /// List pending changes.
    List {
        /// Show failed changes instead.
        #[arg(long)]
        failed: bool,
        /// Print records as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Cancel a pending or failed change.
    Cancel { id: i64 },
    /// Submit a management command, e.g. `apply setCameraDisabled '[true]'`.
    Apply {
        action_type: String,
        /// JSON array of positional parameters.
        #[arg(default_value = "[]")]
        params: String,
    },
    /// Print the simulated device state.
    Device,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > HOLDOFF_CONFIG env var > ~/.holdoff/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("HOLDOFF_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the data directory. `None` means use the config value.
    pub fn resolve_data_dir(&self) -> Option<PathBuf> {
        self.data_dir.clone()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value. `RUST_LOG`, when set,
    /// overrides both at filter construction.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

fn default_config_path() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".holdoff").join("config.toml");
    }
    PathBuf::from("config.toml")
}
