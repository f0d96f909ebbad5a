//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// notifycond - wake-up dispatcher for pub/sub notification topics
#[derive(Parser, Debug)]
#[command(
    name = "notifycond",
    author,
    version,
    about = "Per-topic wake-up dispatcher over a pub/sub notification source",
    long_about = "Multiplexes one notification connection into coalescing per-topic \n\
                  condition channels. The `run` command drives a dispatcher against \n\
                  the built-in scripted source and reports what consumers observed."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "NOTIFYCOND_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "NOTIFYCOND_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a dispatcher session against the scripted source
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "notifycond.toml",
        env = "NOTIFYCOND_CONFIG"
    )]
    pub config: PathBuf,

    /// Session length in seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "0", env = "NOTIFYCOND_DURATION")]
    pub duration: u64,

    /// Override the keepalive interval in milliseconds (0 = disabled)
    #[arg(long, env = "NOTIFYCOND_KEEPALIVE_MS")]
    pub keepalive_ms: Option<u64>,

    /// Override the notification rate of the scripted source
    #[arg(long)]
    pub rate_hz: Option<f64>,

    /// Prometheus metrics port (overrides the configuration file)
    #[arg(long, env = "NOTIFYCOND_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "notifycond.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "notifycond.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// List every configured topic
    #[arg(long)]
    pub topics: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}
