//! Live crawl statistics
//!
//! Counters are atomics so workers update them without locking and
//! observers can read them at any time.

use crate::crawler::SessionReport;
use crate::state::{FailureCategory, FetchOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters for one session
#[derive(Debug, Default)]
pub struct CrawlStats {
    discovered: AtomicU64,
    fetched_success: AtomicU64,
    fetched_failed: AtomicU64,
    /// Finished with a redirect left to the frontier
    fetched_redirect: AtomicU64,
    in_progress: AtomicU64,
    /// Redirect hops followed inline
    redirects: AtomicU64,
    malformed_content: AtomicU64,
    duplicates_rejected: AtomicU64,
    depth_rejected: AtomicU64,
    robots_fetched: AtomicU64,
    records_emitted: AtomicU64,
    bytes_downloaded: AtomicU64,
    failures: [AtomicU64; 6],
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_discovered(&self) {
        self.discovered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_depth_rejection(&self) {
        self.depth_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_robots_fetch(&self) {
        self.robots_fetched.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts an emitted record and returns the new total
    pub fn record_emitted(&self) -> u64 {
        self.records_emitted.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn start_fetch(&self) {
        self.in_progress.fetch_add(1, Ordering::Relaxed);
    }

    /// Ends a fetch started with [`CrawlStats::start_fetch`]
    pub fn finish_fetch(&self) {
        // Never wraps below zero even if a caller finishes twice
        let _ = self
            .in_progress
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn record_redirects(&self, hops: u32) {
        if hops > 0 {
            self.redirects.fetch_add(u64::from(hops), Ordering::Relaxed);
        }
    }

    pub fn record_malformed(&self) {
        self.malformed_content.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a final outcome as a success, a failure, or a redirect
    pub fn record_outcome(&self, outcome: &FetchOutcome) {
        match outcome {
            FetchOutcome::Success { body, .. } => {
                self.fetched_success.fetch_add(1, Ordering::Relaxed);
                self.bytes_downloaded
                    .fetch_add(body.len() as u64, Ordering::Relaxed);
            }
            FetchOutcome::Redirect { .. } => {
                self.fetched_redirect.fetch_add(1, Ordering::Relaxed);
            }
            other => {
                if let Some(category) = other.failure_category() {
                    self.fetched_failed.fetch_add(1, Ordering::Relaxed);
                    self.failures[category.index()].fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    pub fn in_progress(&self) -> u64 {
        self.in_progress.load(Ordering::Relaxed)
    }

    pub fn records_emitted(&self) -> u64 {
        self.records_emitted.load(Ordering::Relaxed)
    }

    /// Reads every counter
    ///
    /// Counters are read one by one, so a snapshot taken mid-crawl may be
    /// slightly inconsistent across fields.
    pub fn snapshot(&self) -> StatsSnapshot {
        let failures_by_category = FailureCategory::all()
            .into_iter()
            .filter_map(|category| {
                let count = self.failures[category.index()].load(Ordering::Relaxed);
                (count > 0).then_some((category, count))
            })
            .collect();

        StatsSnapshot {
            discovered: self.discovered.load(Ordering::Relaxed),
            fetched_success: self.fetched_success.load(Ordering::Relaxed),
            fetched_failed: self.fetched_failed.load(Ordering::Relaxed),
            fetched_redirect: self.fetched_redirect.load(Ordering::Relaxed),
            in_progress: self.in_progress.load(Ordering::Relaxed),
            redirects: self.redirects.load(Ordering::Relaxed),
            malformed_content: self.malformed_content.load(Ordering::Relaxed),
            duplicates_rejected: self.duplicates_rejected.load(Ordering::Relaxed),
            depth_rejected: self.depth_rejected.load(Ordering::Relaxed),
            robots_fetched: self.robots_fetched.load(Ordering::Relaxed),
            records_emitted: self.records_emitted.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            failures_by_category,
        }
    }
}

/// Plain copy of [`CrawlStats`] at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub discovered: u64,
    pub fetched_success: u64,
    pub fetched_failed: u64,
    #[serde(default)]
    pub fetched_redirect: u64,
    pub in_progress: u64,
    pub redirects: u64,
    pub malformed_content: u64,
    pub duplicates_rejected: u64,
    pub depth_rejected: u64,
    pub robots_fetched: u64,
    pub records_emitted: u64,
    pub bytes_downloaded: u64,
    pub failures_by_category: BTreeMap<FailureCategory, u64>,
}

impl StatsSnapshot {
    /// Addresses that reached a final outcome; equals the records emitted
    /// once the session has finished
    pub fn total_fetched(&self) -> u64 {
        self.fetched_success + self.fetched_failed + self.fetched_redirect
    }

    /// Success rate as a percentage of finished addresses
    pub fn success_rate(&self) -> f64 {
        let total = self.total_fetched();
        if total == 0 {
            return 0.0;
        }
        (self.fetched_success as f64 / total as f64) * 100.0
    }

    pub fn failures(&self, category: FailureCategory) -> u64 {
        self.failures_by_category.get(&category).copied().unwrap_or(0)
    }
}

/// Prints a session report to stdout in a formatted manner
pub fn print_statistics(report: &SessionReport) {
    let stats = &report.stats;

    println!("=== Crawl Statistics ===\n");

    println!("Session:");
    println!("  ID: {}", report.session_id);
    println!("  Status: {}", report.status);
    println!("  Duration: {:.1}s", report.duration_ms as f64 / 1000.0);
    println!();

    println!("Overview:");
    println!("  Addresses discovered: {}", stats.discovered);
    println!("  Fetched successfully: {}", stats.fetched_success);
    println!("  Failed: {}", stats.fetched_failed);
    println!("  Ended in redirect: {}", stats.fetched_redirect);
    println!("  Redirect hops followed: {}", stats.redirects);
    println!("  Malformed content: {}", stats.malformed_content);
    println!("  Duplicates rejected: {}", stats.duplicates_rejected);
    println!("  Beyond max depth: {}", stats.depth_rejected);
    println!("  Origins contacted: {}", report.origins.len());
    println!();

    if !stats.failures_by_category.is_empty() {
        println!("Failures by Category:");
        let mut counts: Vec<_> = stats.failures_by_category.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1));

        for (category, count) in counts {
            println!("  {}: {}", category, count);
        }
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} addresses fetched successfully)",
        stats.success_rate(),
        stats.fetched_success,
        stats.total_fetched()
    );
}
