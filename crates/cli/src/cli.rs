//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Firehose - checkpointed micro-batch ingestion of a status stream
#[derive(Parser, Debug)]
#[command(
    name = "firehose",
    author,
    version,
    about = "Checkpointed micro-batch stream ingestion",
    long_about = "Pulls raw status records from a live feed or a replay directory, \n\
                  groups them into fixed-interval micro-batches, hands each batch to the \n\
                  configured sinks and checkpoints progress after every acknowledged batch."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "FIREHOSE_VERBOSE")]
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
        env = "FIREHOSE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default filter directive when `RUST_LOG` is unset
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the ingestion pipeline
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),

    /// Inspect or reset the checkpoint
    Checkpoint(CheckpointArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "config.toml", env = "FIREHOSE_CONFIG")]
    pub config: PathBuf,

    /// Override the batch interval from configuration (seconds)
    #[arg(long, env = "FIREHOSE_BATCH_INTERVAL")]
    pub batch_interval: Option<u64>,

    /// Override the checkpoint directory from configuration
    #[arg(long, env = "FIREHOSE_CHECKPOINT_DIR")]
    pub checkpoint_dir: Option<PathBuf>,

    /// Stop after this many committed batches (0 = unlimited)
    #[arg(long, default_value = "0", env = "FIREHOSE_MAX_BATCHES")]
    pub max_batches: u64,

    /// Stop after this many seconds, committing the open window (0 = no timeout)
    #[arg(long, default_value = "0", env = "FIREHOSE_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without running pipeline
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "FIREHOSE_METRICS_PORT")]
    pub metrics_port: u16,

    #[command(flatten)]
    pub credentials: CredentialArgs,
}

/// Live-feed credentials; override the configuration file when set
#[derive(Args, Debug, Clone, Default)]
pub struct CredentialArgs {
    #[arg(long, env = "FIREHOSE_CONSUMER_KEY", hide_env_values = true)]
    pub consumer_key: Option<String>,

    #[arg(long, env = "FIREHOSE_CONSUMER_SECRET", hide_env_values = true)]
    pub consumer_secret: Option<String>,

    #[arg(long, env = "FIREHOSE_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    #[arg(long, env = "FIREHOSE_ACCESS_TOKEN_SECRET", hide_env_values = true)]
    pub access_token_secret: Option<String>,
}

impl CredentialArgs {
    pub fn is_empty(&self) -> bool {
        self.consumer_key.is_none()
            && self.consumer_secret.is_none()
            && self.access_token.is_none()
            && self.access_token_secret.is_none()
    }
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml", env = "FIREHOSE_CONFIG")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", env = "FIREHOSE_CONFIG")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show sink configuration
    #[arg(long)]
    pub sinks: bool,
}

/// Arguments for the `checkpoint` command
#[derive(Parser, Debug)]
pub struct CheckpointArgs {
    /// Path to configuration file (locates the checkpoint directory)
    #[arg(short, long, default_value = "config.toml", env = "FIREHOSE_CONFIG")]
    pub config: PathBuf,

    /// Use this checkpoint directory instead of the configured one
    #[arg(long)]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub action: CheckpointAction,
}

#[derive(Subcommand, Debug)]
pub enum CheckpointAction {
    /// Print the stored checkpoint and whether it matches the configured source
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete the stored checkpoint so the next run starts fresh
    Reset {
        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },
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
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
