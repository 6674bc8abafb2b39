//! Pipeline statistics and metrics.

use std::time::Duration;

use batch_engine::RunSummary;
use ingestion::PumpSummary;

/// Statistics from a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineStats {
    /// Scheduler outcome and batch metrics
    pub run: RunSummary,

    /// Ingestion pump outcome
    pub pump: PumpSummary,

    /// Source-side counters
    pub ingestion: ingestion::MetricsSnapshot,

    /// Records rejected by the normalizer
    pub records_dropped: u64,

    /// Per-sink counters
    pub sinks: Vec<(String, dispatcher::MetricsSnapshot)>,

    /// Total duration of the pipeline run
    pub duration: Duration,
}

impl PipelineStats {
    /// Delivered records per second
    pub fn records_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.run.records_delivered as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Pipeline Statistics ===\n");

        println!("Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Stop reason: {:?}", self.run.stop_reason);
        println!("   ├─ Batches committed: {}", self.run.batches_committed);
        println!("   ├─ Records delivered: {}", self.run.records_delivered);
        if self.run.records_abandoned > 0 {
            println!("   ├─ Left uncommitted: {}", self.run.records_abandoned);
        }
        println!("   ├─ Records/s: {:.2}", self.records_per_sec());
        match &self.run.last_committed {
            Some(w) => println!(
                "   └─ Last committed: seq {} [{}, {})",
                w.sequence_number, w.start_ms, w.end_ms
            ),
            None => println!("   └─ Last committed: none"),
        }

        println!("\nSource ({})", self.pump.source);
        println!("   ├─ Records pulled: {}", self.ingestion.records_pulled);
        println!("   ├─ Records forwarded: {}", self.pump.forwarded);
        if self.pump.unsent > 0 {
            println!("   ├─ Records pulled but unsent: {}", self.pump.unsent);
        }
        println!("   ├─ Malformed dropped: {}", self.records_dropped);
        println!("   ├─ Keep-alives: {}", self.ingestion.keepalives);
        println!("   ├─ Reconnects: {}", self.ingestion.reconnects);
        println!(
            "   └─ Files completed / lines skipped: {}/{}",
            self.ingestion.files_completed, self.ingestion.lines_skipped
        );

        if !self.sinks.is_empty() {
            println!("\nSinks ({})", self.sinks.len());
            for (i, (name, m)) in self.sinks.iter().enumerate() {
                let prefix = if i == self.sinks.len() - 1 { "└─" } else { "├─" };
                println!(
                    "   {} {}: {} batches, {} records, {} failures",
                    prefix, name, m.acked_batches, m.acked_records, m.rejected_batches
                );
            }
        }

        println!("\n{}", self.run.metrics);
    }
}
