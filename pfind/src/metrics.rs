use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Counters shared by every member of one process pool
#[derive(Debug, Default)]
pub struct PoolMetrics {
    crawls: AtomicU64,
    directories_read: AtomicU64,
    unreadable_directories: AtomicU64,
    vanished_entries: AtomicU64,
}

impl PoolMetrics {
    /// Creates a new PoolMetrics instance
    pub fn new() -> Self {
        Default::default()
    }

    /// Records the start of a collective crawl (counted once, by the coordinator)
    pub fn record_crawl(&self) {
        let total = self.crawls.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Crawl {} started", total);
    }

    /// Records a directory whose entries were listed
    pub fn record_directory(&self) {
        self.directories_read.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a directory that could not be listed
    pub fn record_unreadable_directory(&self) {
        self.unreadable_directories.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an entry that disappeared between listing and `lstat`
    pub fn record_vanished_entry(&self) {
        self.vanished_entries.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets the current counter values
    pub fn get_stats(&self) -> PoolStats {
        PoolStats {
            crawls: self.crawls.load(Ordering::Relaxed),
            directories_read: self.directories_read.load(Ordering::Relaxed),
            unreadable_directories: self.unreadable_directories.load(Ordering::Relaxed),
            vanished_entries: self.vanished_entries.load(Ordering::Relaxed),
        }
    }

    /// Logs current statistics
    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Pool stats:\n\
             Crawls: {}\n\
             Directories read: {}\n\
             Unreadable directories: {}\n\
             Vanished entries: {}",
            stats.crawls,
            stats.directories_read,
            stats.unreadable_directories,
            stats.vanished_entries
        );
    }
}

/// Snapshot of `PoolMetrics`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub crawls: u64,
    pub directories_read: u64,
    pub unreadable_directories: u64,
    pub vanished_entries: u64,
}
