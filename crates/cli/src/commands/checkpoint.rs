//! `checkpoint` command implementation.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use checkpoint::{CheckpointStore, FileCheckpointStore};
use contracts::{CheckpointRecord, StreamBlueprint};
use serde::Serialize;
use tracing::{info, warn};

use super::load_blueprint;
use crate::cli::{CheckpointAction, CheckpointArgs};

/// Checkpoint report for JSON output
#[derive(Serialize)]
struct CheckpointReport {
    path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    checkpoint: Option<CheckpointRecord>,
    /// None when no configuration was available to compare against
    #[serde(skip_serializing_if = "Option::is_none")]
    matches_config: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mismatch: Option<String>,
}

/// Execute the `checkpoint` command
pub async fn run_checkpoint(args: &CheckpointArgs) -> Result<()> {
    let blueprint = match (&args.dir, args.config.exists()) {
        (Some(_), false) => None,
        _ => Some(load_blueprint(&args.config)?),
    };
    let dir = resolve_dir(args.dir.as_ref(), blueprint.as_ref());
    let mut store = FileCheckpointStore::new(dir);

    match args.action {
        CheckpointAction::Show { json } => show(&store, blueprint.as_ref(), json).await,
        CheckpointAction::Reset { yes } => reset(&mut store, yes).await,
    }
}

fn resolve_dir(dir: Option<&PathBuf>, blueprint: Option<&StreamBlueprint>) -> PathBuf {
    match (dir, blueprint) {
        (Some(dir), _) => dir.clone(),
        (None, Some(bp)) => bp.checkpoint.directory.clone(),
        (None, None) => PathBuf::from("."),
    }
}

async fn load_report(
    store: &FileCheckpointStore,
    blueprint: Option<&StreamBlueprint>,
) -> Result<CheckpointReport> {
    let record = store
        .load()
        .await
        .with_context(|| format!("Failed to read checkpoint at {}", store.path().display()))?;

    let verdict = match (&record, blueprint) {
        (Some(cp), Some(bp)) => Some(cp.verify_adapter(&bp.source.fingerprint())),
        _ => None,
    };
    Ok(CheckpointReport {
        path: store.path().to_path_buf(),
        matches_config: verdict.as_ref().map(Result::is_ok),
        mismatch: verdict.and_then(|v| v.err()).map(|e| e.to_string()),
        checkpoint: record,
    })
}

async fn show(
    store: &FileCheckpointStore,
    blueprint: Option<&StreamBlueprint>,
    json: bool,
) -> Result<()> {
    let report = load_report(store, blueprint).await?;

    if json {
        let json =
            serde_json::to_string_pretty(&report).context("Failed to serialize checkpoint")?;
        println!("{}", json);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &CheckpointReport) {
    println!("Checkpoint: {}", report.path.display());
    let Some(ref cp) = report.checkpoint else {
        println!("   └─ none (next run starts fresh)");
        return;
    };

    println!("   ├─ Sequence number: {}", cp.sequence_number);
    println!("   ├─ Last batch end: {} ms", cp.last_batch_end_time);
    println!("   ├─ Written at: {} ms", cp.written_at_ms);
    if let Some(s) = cp.scheduler {
        println!(
            "   ├─ Scheduler: interval {} ms, remember {} ms, {} attempts",
            s.batch_interval_ms, s.remember_ms, s.max_sink_attempts
        );
    }
    if !cp.replay_progress.is_empty() {
        println!("   ├─ Replay progress: {} files", cp.replay_progress.len());
        for (file, progress) in cp.replay_progress.iter() {
            println!("   │    {} ({} lines)", file, progress.lines);
        }
    }
    println!("   ├─ Adapter hash: {}", cp.adapter_config_hash);
    match (report.matches_config, &report.mismatch) {
        (Some(true), _) => println!("   └─ Matches configured source: yes"),
        (Some(false), Some(why)) => {
            println!("   └─ Matches configured source: NO ({})", why);
            println!("\n   Run `firehose checkpoint reset` to start over with the new source.");
        }
        _ => println!("   └─ Matches configured source: unknown (no configuration)"),
    }
}

async fn reset(store: &mut FileCheckpointStore, yes: bool) -> Result<()> {
    let path = store.path().display().to_string();
    if !yes && !confirm(&format!("Delete checkpoint at {}?", path))? {
        info!("Checkpoint reset aborted");
        println!("Aborted.");
        return Ok(());
    }

    let removed = store
        .clear()
        .await
        .with_context(|| format!("Failed to remove checkpoint at {}", path))?;

    if removed {
        warn!(path = %path, "Checkpoint removed; next run starts fresh");
        println!("✓ Checkpoint removed: {}", path);
    } else {
        println!("No checkpoint at {}", path);
    }
    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
