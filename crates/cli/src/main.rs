//! # firehose
//!
//! 微批次流式接入的命令行入口：`run` / `validate` / `info` / `checkpoint`。
//!
//! 任何致命错误 (source 不可用、sink 重试耗尽、checkpoint 写失败、
//! adapter 不匹配) 都以非零退出码结束进程。

mod cli;
mod commands;
mod pipeline;

use clap::Parser;
use observability::ObservabilityConfig;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Credentials may live in .env
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // The Prometheus exporter belongs to `run` and starts after the config is loaded
    observability::init_with_config(ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port: None,
        default_log_level: cli.log_level().to_string(),
    })?;
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "firehose starting");

    let outcome = match &cli.command {
        Commands::Run(args) => commands::run_pipeline(args).await,
        Commands::Validate(args) => commands::run_validate(args),
        Commands::Info(args) => commands::run_info(args),
        Commands::Checkpoint(args) => commands::run_checkpoint(args).await,
    };

    outcome.inspect_err(|e| tracing::error!(error = ?e, "firehose failed"))
}
