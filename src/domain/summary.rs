//! Run and trial summaries surfaced to the caller

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Aggregated totals for one engine run.
///
/// A run always completes with a summary; failed items are reported but are
/// not by themselves a fatal outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_bytes_transferred: u64,
    pub completed_batches: u64,
    pub abandoned_batches: u64,
    /// Item name -> last error detail, for every permanently failed item.
    pub failed_items: BTreeMap<String, String>,
    pub elapsed: Duration,
    /// True when the run stopped early (cancellation or disk-guard denial)
    /// with pending work left for a future resume.
    pub stopped_early: bool,
}

impl RunSummary {
    pub fn failed_item_count(&self) -> usize {
        self.failed_items.len()
    }
}

/// One (concurrency level, workload) pairing run by the performance harness.
/// Created and discarded per trial; only the report outlives it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceTrial {
    pub concurrency: usize,
    pub target_bytes: u64,
    pub duration: Duration,
    pub bytes_transferred: u64,
    pub failed_item_count: usize,
    pub throughput_mb_per_s: f64,
}

impl PerformanceTrial {
    pub fn new(
        concurrency: usize,
        target_bytes: u64,
        duration: Duration,
        bytes_transferred: u64,
        failed_item_count: usize,
    ) -> Self {
        let secs = duration.as_secs_f64();
        let throughput_mb_per_s = if secs > 0.0 {
            bytes_transferred as f64 / (1024.0 * 1024.0) / secs
        } else {
            0.0
        };
        Self {
            concurrency,
            target_bytes,
            duration,
            bytes_transferred,
            failed_item_count,
            throughput_mb_per_s,
        }
    }
}

/// Human-readable byte count for log lines, e.g. `3.42 GB`.
pub fn format_bytes(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", size, UNITS[unit])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}
