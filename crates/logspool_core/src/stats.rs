//! Journal statistics.
//!
//! Provides counters for monitoring journal throughput and housekeeping.
//!
//! # Usage
//!
//! ```rust,ignore
//! let stats = journal.stats();
//! println!("Written: {}", stats.entries_written);
//! println!("Dropped: {}", stats.entries_dropped);
//! println!("Segments removed: {}", stats.segments_removed);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Journal statistics and metrics.
///
/// All counters are atomic and can be read while operations are in progress.
/// Values are monotonically increasing.
#[derive(Debug, Default)]
pub struct JournalStats {
    /// Entries appended.
    entries_written: AtomicU64,
    /// Entries dropped for exceeding the size limit.
    entries_dropped: AtomicU64,
    /// Entries handed out by cursor reads.
    entries_read: AtomicU64,
    /// Framed bytes appended.
    bytes_written: AtomicU64,
    /// Segments closed by rolling.
    segments_rolled: AtomicU64,
    /// Segments deleted by retention.
    segments_removed: AtomicU64,
    /// Flushes that synced at least one segment.
    flushes: AtomicU64,
}

impl JournalStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_write(&self, bytes: u64) {
        self.entries_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_drop(&self) {
        self.entries_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_read(&self, entries: u64) {
        self.entries_read.fetch_add(entries, Ordering::Relaxed);
    }

    pub(crate) fn record_roll(&self) {
        self.segments_rolled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_removal(&self, segments: u64) {
        self.segments_removed.fetch_add(segments, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of entries appended.
    pub fn entries_written(&self) -> u64 {
        self.entries_written.load(Ordering::Relaxed)
    }

    /// Returns the number of oversized entries dropped.
    pub fn entries_dropped(&self) -> u64 {
        self.entries_dropped.load(Ordering::Relaxed)
    }

    /// Returns the number of entries handed out by cursor reads.
    pub fn entries_read(&self) -> u64 {
        self.entries_read.load(Ordering::Relaxed)
    }

    /// Returns the total framed bytes appended.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Returns the number of segment rolls.
    pub fn segments_rolled(&self) -> u64 {
        self.segments_rolled.load(Ordering::Relaxed)
    }

    /// Returns the number of segments deleted by retention.
    pub fn segments_removed(&self) -> u64 {
        self.segments_removed.load(Ordering::Relaxed)
    }

    /// Returns the number of flushes that synced data.
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            entries_written: self.entries_written(),
            entries_dropped: self.entries_dropped(),
            entries_read: self.entries_read(),
            bytes_written: self.bytes_written(),
            segments_rolled: self.segments_rolled(),
            segments_removed: self.segments_removed(),
            flushes: self.flushes(),
        }
    }
}

/// A point-in-time snapshot of journal statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Entries appended.
    pub entries_written: u64,
    /// Entries dropped for exceeding the size limit.
    pub entries_dropped: u64,
    /// Entries handed out by cursor reads.
    pub entries_read: u64,
    /// Framed bytes appended.
    pub bytes_written: u64,
    /// Segments closed by rolling.
    pub segments_rolled: u64,
    /// Segments deleted by retention.
    pub segments_removed: u64,
    /// Flushes that synced data.
    pub flushes: u64,
}
