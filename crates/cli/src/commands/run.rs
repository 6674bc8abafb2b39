//! `run` command implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use contracts::{SourceKind, StreamBlueprint};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::load_blueprint;
use crate::cli::{CredentialArgs, RunArgs};
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let mut blueprint = load_blueprint(&args.config)?;
    apply_overrides(&mut blueprint, args);
    // Overrides must satisfy the same rules as the file
    config_loader::ConfigLoader::validate(&blueprint)
        .context("Configuration invalid after command-line overrides")?;

    info!(
        source = %blueprint.source.kind.tag(),
        batch_interval_secs = blueprint.streaming.batch_interval_secs,
        checkpoint_dir = %blueprint.checkpoint.directory.display(),
        sinks = blueprint.sinks.len(),
        "Configuration loaded"
    );

    if !blueprint.streaming.enabled {
        info!("streaming.enabled = false; configuration is valid, nothing to run");
        return Ok(());
    }

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline = Pipeline::new(PipelineConfig {
        blueprint,
        max_batches: (args.max_batches > 0).then_some(args.max_batches),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    });

    let cancel = CancellationToken::new();
    spawn_shutdown_watch(cancel.clone());
    if args.timeout > 0 {
        spawn_timeout(cancel.clone(), Duration::from_secs(args.timeout));
    }

    info!("Starting pipeline...");
    let stats = pipeline
        .run(cancel)
        .await
        .context("Pipeline execution failed")?;

    info!(
        batches = stats.run.batches_committed,
        records = stats.run.records_delivered,
        stop_reason = ?stats.run.stop_reason,
        duration_secs = stats.duration.as_secs_f64(),
        "Pipeline completed successfully"
    );
    stats.print_summary();

    info!("Firehose finished");
    Ok(())
}

fn apply_overrides(blueprint: &mut StreamBlueprint, args: &RunArgs) {
    if let Some(secs) = args.batch_interval {
        info!(batch_interval_secs = secs, "Overriding batch interval from CLI");
        blueprint.streaming.batch_interval_secs = secs;
    }
    if let Some(ref dir) = args.checkpoint_dir {
        info!(dir = %dir.display(), "Overriding checkpoint directory from CLI");
        blueprint.checkpoint.directory = dir.clone();
    }
    apply_credentials(blueprint, &args.credentials);
}

/// Environment / flag credentials replace the file's values field by field
fn apply_credentials(blueprint: &mut StreamBlueprint, creds: &CredentialArgs) {
    if creds.is_empty() {
        return;
    }
    let Some(live) = blueprint.source.live.as_mut() else {
        if blueprint.source.kind == SourceKind::Live {
            warn!("credentials supplied but source.live is not configured");
        }
        return;
    };

    let target = &mut live.credentials;
    for (value, slot) in [
        (&creds.consumer_key, &mut target.consumer_key),
        (&creds.consumer_secret, &mut target.consumer_secret),
        (&creds.access_token, &mut target.access_token),
        (&creds.access_token_secret, &mut target.access_token_secret),
    ] {
        if let Some(v) = value {
            *slot = v.clone();
        }
    }
    info!(complete = target.is_complete(), "Live-feed credentials taken from environment");
}

/// Cancel on Ctrl+C or SIGTERM
fn spawn_shutdown_watch(cancel: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Received shutdown signal, committing the open window...");
        cancel.cancel();
    });
}

fn spawn_timeout(cancel: CancellationToken, timeout: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                warn!(timeout_secs = timeout.as_secs(), "Run timeout reached, stopping");
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &StreamBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Streaming:");
    println!("  Batch interval: {}s", blueprint.streaming.batch_interval_secs);
    println!("  Remember: {}s", blueprint.streaming.remember_secs);
    println!("  Max sink attempts: {}", blueprint.streaming.max_sink_attempts);
    println!("  Checkpoint: {}", blueprint.checkpoint.directory.display());

    println!("\nSource ({}):", blueprint.source.kind.tag());
    if let Some(live) = &blueprint.source.live {
        println!("  Live endpoint: {}", live.endpoint);
        println!("  Track: {}", live.normalized_track().join(", "));
    }
    if let Some(replay) = &blueprint.source.replay {
        println!("  Replay directory: {}", replay.directory.display());
    }
    println!("  Adapter hash: {}", blueprint.source.fingerprint().hash());

    if !blueprint.sinks.is_empty() {
        println!("\nSinks ({}):", blueprint.sinks.len());
        for sink in &blueprint.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!();
}
