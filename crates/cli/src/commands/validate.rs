//! `firehose validate`: load, validate and lint a configuration file

use anyhow::{Context, Result};
use contracts::{SinkType, SourceKind, StreamBlueprint};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::ValidateArgs;

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Report {
    Valid {
        config: String,
        source: String,
        adapter_config_hash: String,
        streaming_enabled: bool,
        batch_interval_secs: u64,
        sinks: Vec<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        lints: Vec<Lint>,
    },
    Invalid {
        config: String,
        error: String,
    },
}

/// Non-fatal finding, keyed by config path
#[derive(Debug, Serialize)]
struct Lint {
    field: String,
    message: String,
}

impl Lint {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "validating configuration");

    let report = build_report(args);
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("cannot encode report")?
        );
    } else {
        print_report(&report);
    }

    match report {
        Report::Valid { .. } => Ok(()),
        Report::Invalid { error, .. } => anyhow::bail!("invalid configuration: {error}"),
    }
}

fn build_report(args: &ValidateArgs) -> Report {
    let config = args.config.display().to_string();
    let blueprint = match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(bp) => bp,
        Err(e) => {
            return Report::Invalid {
                config,
                error: e.to_string(),
            }
        }
    };

    let lints = lint(&blueprint);
    for l in &lints {
        warn!(field = %l.field, "{}", l.message);
    }

    Report::Valid {
        config,
        source: blueprint.source.kind.tag().to_string(),
        adapter_config_hash: blueprint.source.fingerprint().hash().to_string(),
        streaming_enabled: blueprint.streaming.enabled,
        batch_interval_secs: blueprint.streaming.batch_interval_secs,
        sinks: blueprint
            .sinks
            .iter()
            .map(|s| format!("{} ({})", s.name, s.sink_type))
            .collect(),
        lints,
    }
}

fn lint(bp: &StreamBlueprint) -> Vec<Lint> {
    let mut lints = Vec::new();
    let streaming = &bp.streaming;

    if !streaming.enabled {
        lints.push(Lint::new("streaming.enabled", "false, `run` exits without ingesting"));
    }
    if streaming.remember_secs < streaming.batch_interval_secs {
        lints.push(Lint::new(
            "streaming.remember_secs",
            format!(
                "{}s is shorter than one batch interval ({}s)",
                streaming.remember_secs, streaming.batch_interval_secs
            ),
        ));
    }

    match bp.source.kind {
        SourceKind::Live => {
            if let Some(live) = bp.source.live.as_ref().filter(|l| !l.credentials.is_complete()) {
                lints.push(Lint::new(
                    "source.live.credentials",
                    format!(
                        "incomplete for {}, expected from FIREHOSE_* environment at run time",
                        live.endpoint
                    ),
                ));
            }
        }
        SourceKind::Replay => {
            if let Some(replay) = bp.source.replay.as_ref().filter(|r| !r.directory.is_dir()) {
                lints.push(Lint::new(
                    "source.replay.directory",
                    format!("{} does not exist yet", replay.directory.display()),
                ));
            }
        }
    }

    if bp.sinks.is_empty() {
        lints.push(Lint::new("sinks", "none configured, batches go to a default log sink"));
    }
    for sink in bp
        .sinks
        .iter()
        .filter(|s| s.sink_type == SinkType::File && !s.params.contains_key("base_path"))
    {
        lints.push(Lint::new(
            format!("sinks[{}].params.base_path", sink.name),
            "unset, writing to ./output",
        ));
    }

    lints
}

fn print_report(report: &Report) {
    match report {
        Report::Valid {
            config,
            source,
            adapter_config_hash,
            streaming_enabled,
            batch_interval_secs,
            sinks,
            lints,
        } => {
            println!("✓ {config} is valid");
            println!("  source:    {source} ({adapter_config_hash})");
            println!("  streaming: {}", if *streaming_enabled { "enabled" } else { "disabled" });
            println!("  interval:  {batch_interval_secs}s");
            if !sinks.is_empty() {
                println!("  sinks:     {}", sinks.join(", "));
            }
            for l in lints {
                println!("  ⚠ {}: {}", l.field, l.message);
            }
        }
        Report::Invalid { config, error } => {
            println!("✗ {config} is invalid");
            println!("  {error}");
        }
    }
}
