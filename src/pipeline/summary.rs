//! Run summary accounting and reporting
//!
//! Every counter that used to live in a module-level global in ad hoc
//! scraper scripts lives here instead, scoped to one run. The printed report
//! enumerates failures per error kind so a noisy partial run is diagnosable
//! without re-running at higher verbosity.

use crate::storage::IndexStatistics;
use std::collections::BTreeMap;
use std::time::Duration;

/// Phases of one harvest run
///
/// Transitions only move forward: Seeding -> Draining -> Cancelling ->
/// Finished, with Cancelling skipped on an undisturbed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Expanding configured seeds into initial fetch tasks
    Seeding,

    /// Working the task set down to empty
    Draining,

    /// Cancellation fired; in-flight tasks get a grace period
    Cancelling,

    /// Terminal
    Finished,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Seeding => "seeding",
            Self::Draining => "draining",
            Self::Cancelling => "cancelling",
            Self::Finished => "finished",
        };
        write!(f, "{}", s)
    }
}

/// A task that needed at least one retry
#[derive(Debug, Clone)]
pub struct RetriedTask {
    pub url: String,

    /// Retry count at finalization (0 means first-try success)
    pub attempts: u32,

    pub succeeded: bool,
}

/// Counters for one harvest run
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Pages fetched and parsed successfully
    pub pages_fetched: u64,

    /// Records written for the first time
    pub records_written: u64,

    /// Records merged into an existing entry
    pub records_updated: u64,

    /// New image files written
    pub images_stored: u64,

    /// Downloads whose bytes were already on disk
    pub images_deduplicated: u64,

    /// Refs resolved to the degraded fallback candidate
    pub images_degraded: u64,

    /// Refs that could not be resolved or downloaded at all
    pub images_failed: u64,

    /// Pages an adapter could not extract structure from
    pub parse_mismatches: u64,

    /// Input rows/items skipped for missing essentials
    pub items_skipped: u64,

    /// Terminal task failures keyed by error kind label
    pub failures_by_kind: BTreeMap<&'static str, u64>,

    /// Tasks that needed retries, with their final attempt counts
    pub retried_tasks: Vec<RetriedTask>,

    /// Whether the run was cut short by cancellation or deadline
    pub cancelled: bool,

    /// Whether finalize rewrote the dataset to fold merges in
    pub compacted: bool,

    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn record_failure(&mut self, kind_label: &'static str) {
        *self.failures_by_kind.entry(kind_label).or_insert(0) += 1;
    }

    pub fn record_retry(&mut self, url: String, attempts: u32, succeeded: bool) {
        self.retried_tasks.push(RetriedTask {
            url,
            attempts,
            succeeded,
        });
    }

    /// Total terminal task failures across all kinds
    pub fn total_failures(&self) -> u64 {
        self.failures_by_kind.values().sum()
    }
}

/// Prints the run summary to stdout in a formatted manner
pub fn print_run_summary(summary: &RunSummary) {
    println!("=== Harvest Summary ===\n");

    println!("Records:");
    println!("  Written: {}", summary.records_written);
    println!("  Updated: {}", summary.records_updated);
    println!();

    println!("Images:");
    println!("  Stored: {}", summary.images_stored);
    println!("  Deduplicated: {}", summary.images_deduplicated);
    println!("  Degraded resolution: {}", summary.images_degraded);
    println!("  Failed: {}", summary.images_failed);
    println!();

    println!("Fetching:");
    println!("  Pages fetched: {}", summary.pages_fetched);
    println!("  Parse mismatches: {}", summary.parse_mismatches);
    println!("  Items skipped: {}", summary.items_skipped);
    println!();

    if !summary.failures_by_kind.is_empty() {
        println!("Task Failures:");
        for (kind, count) in &summary.failures_by_kind {
            println!("  {}: {}", kind, count);
        }
        println!();
    }

    if !summary.retried_tasks.is_empty() {
        println!("Retried Tasks ({}):", summary.retried_tasks.len());
        for task in &summary.retried_tasks {
            println!(
                "  - {} (attempts: {}, {})",
                task.url,
                task.attempts,
                if task.succeeded { "succeeded" } else { "failed" }
            );
        }
        println!();
    }

    if summary.cancelled {
        println!("Run was cancelled before draining completed.");
    }
    if summary.compacted {
        println!("Dataset was compacted to fold merged records in.");
    }
    println!("Elapsed: {:.1}s", summary.elapsed.as_secs_f64());
}

/// Prints index statistics to stdout (the --stats mode)
pub fn print_index_statistics(stats: &IndexStatistics) {
    println!("=== Harvest Index Statistics ===\n");

    println!("Overview:");
    println!("  Runs: {}", stats.runs);
    println!("  Records: {}", stats.records);
    println!("  Images: {}", stats.images);
    println!(
        "  Image bytes: {:.1} MiB",
        stats.image_bytes as f64 / (1024.0 * 1024.0)
    );
    println!();

    if !stats.records_by_archive.is_empty() {
        println!("Records by Archive:");
        for (archive, count) in &stats.records_by_archive {
            println!("  {}: {}", archive, count);
        }
        println!();
    }

    if let Some((started_at, status)) = &stats.last_run {
        println!("Last run: started {} ({})", started_at, status);
    }
}
