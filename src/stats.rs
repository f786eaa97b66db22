// src/stats.rs
//! Per-run crawl counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Thread-safe crawl statistics
#[derive(Clone)]
pub struct CrawlStats {
    processed: Arc<AtomicU64>,
    inserted: Arc<AtomicU64>,
    updated: Arc<AtomicU64>,
    irrelevant: Arc<AtomicU64>,
    decode_failures: Arc<AtomicU64>,
    parse_failures: Arc<AtomicU64>,
    precerts_skipped: Arc<AtomicU64>,
    export_failures: Arc<AtomicU64>,
    start_time: Instant,
}

/// Snapshot of statistics at a point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub inserted: u64,
    pub updated: u64,
    pub irrelevant: u64,
    pub decode_failures: u64,
    pub parse_failures: u64,
    pub precerts_skipped: u64,
    pub export_failures: u64,
    pub entries_per_minute: f64,
    pub elapsed_secs: u64,
}

impl StatsSnapshot {
    pub fn persisted(&self) -> u64 {
        self.inserted + self.updated
    }
}

impl CrawlStats {
    pub fn new() -> Self {
        Self {
            processed: Arc::new(AtomicU64::new(0)),
            inserted: Arc::new(AtomicU64::new(0)),
            updated: Arc::new(AtomicU64::new(0)),
            irrelevant: Arc::new(AtomicU64::new(0)),
            decode_failures: Arc::new(AtomicU64::new(0)),
            parse_failures: Arc::new(AtomicU64::new(0)),
            precerts_skipped: Arc::new(AtomicU64::new(0)),
            export_failures: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn increment_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_inserted(&self) {
        self.inserted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_updated(&self) {
        self.updated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_irrelevant(&self) {
        self.irrelevant.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_decode_failures(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_parse_failures(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_precerts_skipped(&self) {
        self.precerts_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_export_failures(&self) {
        self.export_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let elapsed = self.start_time.elapsed();
        let processed = self.processed.load(Ordering::Relaxed);

        let rate = if elapsed.as_secs() > 0 {
            (processed as f64 / elapsed.as_secs() as f64) * 60.0
        } else {
            0.0
        };

        StatsSnapshot {
            processed,
            inserted: self.inserted.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            irrelevant: self.irrelevant.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            precerts_skipped: self.precerts_skipped.load(Ordering::Relaxed),
            export_failures: self.export_failures.load(Ordering::Relaxed),
            entries_per_minute: rate,
            elapsed_secs: elapsed.as_secs(),
        }
    }

    /// One-line progress message
    pub fn format_stats(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            "{} processed | {} stored | {:.1} entries/min | elapsed: {}",
            snapshot.processed,
            snapshot.persisted(),
            snapshot.entries_per_minute,
            Self::format_uptime(snapshot.elapsed_secs)
        )
    }

    pub fn format_uptime(secs: u64) -> String {
        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        let seconds = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }
}

impl Default for CrawlStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let snapshot = CrawlStats::new().snapshot();
        assert_eq!(snapshot.processed, 0);
        assert_eq!(snapshot.persisted(), 0);
    }

    #[test]
    fn test_counters() {
        let stats = CrawlStats::new();

        stats.increment_processed();
        stats.increment_processed();
        stats.increment_processed();
        stats.increment_inserted();
        stats.increment_updated();
        stats.increment_decode_failures();
        stats.increment_precerts_skipped();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.processed, 3);
        assert_eq!(snapshot.persisted(), 2);
        assert_eq!(snapshot.decode_failures, 1);
        assert_eq!(snapshot.precerts_skipped, 1);
        assert_eq!(snapshot.irrelevant, 0);
    }

    #[test]
    fn test_clone_shares_state() {
        let stats1 = CrawlStats::new();
        let stats2 = stats1.clone();

        stats1.increment_irrelevant();
        stats2.increment_irrelevant();

        assert_eq!(stats1.snapshot().irrelevant, 2);
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(CrawlStats::format_uptime(30), "30s");
        assert_eq!(CrawlStats::format_uptime(90), "1m 30s");
        assert_eq!(CrawlStats::format_uptime(3661), "1h 1m 1s");
    }

    #[test]
    fn test_format_stats() {
        let stats = CrawlStats::new();
        stats.increment_processed();
        assert!(stats.format_stats().starts_with("1 processed | 0 stored"));
    }
}
