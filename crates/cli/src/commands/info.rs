//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::StreamBlueprint;
use serde::Serialize;
use tracing::info;

use super::load_blueprint;
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    streaming: StreamingInfo,
    checkpoint_dir: String,
    source: SourceInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct StreamingInfo {
    enabled: bool,
    batch_interval_secs: u64,
    remember_secs: u64,
    max_sink_attempts: u32,
    retry_backoff_ms: u64,
    channel_capacity: usize,
}

#[derive(Serialize)]
struct SourceInfo {
    kind: String,
    adapter_config_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    track: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    credentials_complete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    replay_directory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    replay_watch: Option<bool>,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
    #[serde(skip_serializing_if = "std::collections::HashMap::is_empty")]
    params: std::collections::HashMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let blueprint = load_blueprint(&args.config)?;
    let info = build_config_info(&blueprint, args);

    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info(blueprint: &StreamBlueprint, args: &InfoArgs) -> ConfigInfo {
    let streaming = &blueprint.streaming;
    let live = blueprint.source.live.as_ref();
    let replay = blueprint.source.replay.as_ref();

    let sinks = if args.sinks {
        blueprint
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: s.sink_type.to_string(),
                queue_capacity: s.queue_capacity,
                params: s.params.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        streaming: StreamingInfo {
            enabled: streaming.enabled,
            batch_interval_secs: streaming.batch_interval_secs,
            remember_secs: streaming.remember_secs,
            max_sink_attempts: streaming.max_sink_attempts,
            retry_backoff_ms: streaming.retry_backoff_ms,
            channel_capacity: streaming.channel_capacity,
        },
        checkpoint_dir: blueprint.checkpoint.directory.display().to_string(),
        source: SourceInfo {
            kind: blueprint.source.kind.tag().to_string(),
            adapter_config_hash: blueprint.source.fingerprint().hash().to_string(),
            endpoint: live.map(|l| l.endpoint.clone()),
            track: live.map(|l| l.normalized_track()).unwrap_or_default(),
            credentials_complete: live.map(|l| l.credentials.is_complete()),
            replay_directory: replay.map(|r| r.directory.display().to_string()),
            replay_watch: replay.map(|r| r.watch),
        },
        sinks,
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("=== Firehose Configuration ({}) ===\n", info.version);

    let s = &info.streaming;
    println!("Streaming");
    println!("   ├─ Enabled: {}", s.enabled);
    println!("   ├─ Batch interval: {}s", s.batch_interval_secs);
    println!("   ├─ Remember: {}s", s.remember_secs);
    println!(
        "   ├─ Sink attempts: {} (backoff {} ms)",
        s.max_sink_attempts, s.retry_backoff_ms
    );
    println!("   ├─ Channel capacity: {}", s.channel_capacity);
    println!("   └─ Checkpoint: {}", info.checkpoint_dir);

    let src = &info.source;
    println!("\nSource ({})", src.kind);
    if let Some(ref endpoint) = src.endpoint {
        println!("   ├─ Endpoint: {}", endpoint);
        println!("   ├─ Track: {}", src.track.join(", "));
        println!(
            "   ├─ Credentials: {}",
            if src.credentials_complete == Some(true) { "complete" } else { "incomplete" }
        );
    }
    if let Some(ref dir) = src.replay_directory {
        println!("   ├─ Directory: {}", dir);
        println!("   ├─ Watch: {}", src.replay_watch.unwrap_or(false));
    }
    println!("   └─ Adapter hash: {}", src.adapter_config_hash);

    if !info.sinks.is_empty() {
        println!("\nSinks ({})", info.sinks.len());
        for (i, sink) in info.sinks.iter().enumerate() {
            let prefix = if i == info.sinks.len() - 1 { "└─" } else { "├─" };
            println!(
                "   {} {} ({}, queue {})",
                prefix, sink.name, sink.sink_type, sink.queue_capacity
            );
        }
    }

    println!();
}
