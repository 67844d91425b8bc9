//! The journal facade.
//!
//! ```text
//! CREATED ──open──▶ RUNNING ──trigger_shutdown──▶ SHUTTING_DOWN ──close──▶ STOPPED
//! ```
//!
//! Inputs call [`Journal::write`] / [`Journal::write_batch`]; processing
//! threads call [`Journal::read`] and acknowledge with
//! [`Journal::mark_journal_offset_committed`]. Retention and flushing run
//! periodically, usually from [`Maintenance`](crate::Maintenance).

use crate::activity::{Activity, ActivityWriter, LogActivityWriter};
use crate::clock::{duration_millis, Clock, SystemClock};
use crate::config::JournalConfig;
use crate::dir::JournalDir;
use crate::error::{CoreError, CoreResult};
use crate::lifecycle::{Lifecycle, ServerStatus};
use crate::log::{Appended, SegmentLog};
use crate::retention::{RetentionEngine, RetentionPolicy};
use crate::stats::{JournalStats, StatsSnapshot};
use crate::throttle::{uncommitted_entries, utilization, ThrottleMonitor, ThrottleState};
use crate::types::{Entry, JournalState, ReadEntry, SegmentInfo};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;

/// Committed offset value meaning "nothing committed yet".
const NOT_COMMITTED: i64 = -1;

/// Options for opening a [`Journal`] beyond its configuration.
///
/// # Example
///
/// ```rust,ignore
/// let status = Arc::new(ServerStatus::with_lifecycle(Lifecycle::Running));
/// let journal = Journal::builder(config)
///     .server_status(Arc::clone(&status))
///     .open()?;
/// ```
#[derive(Debug)]
pub struct JournalBuilder {
    config: JournalConfig,
    clock: Arc<dyn Clock>,
    server_status: Arc<ServerStatus>,
    activity_writer: Arc<dyn ActivityWriter>,
}

impl JournalBuilder {
    /// Sets the time source for record timestamps, segment ages and
    /// retention.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the lifecycle status the throttle signal drives.
    #[must_use]
    pub fn server_status(mut self, status: Arc<ServerStatus>) -> Self {
        self.server_status = status;
        self
    }

    /// Sets where retention activity records go.
    #[must_use]
    pub fn activity_writer(mut self, writer: Arc<dyn ActivityWriter>) -> Self {
        self.activity_writer = writer;
        self
    }

    /// Opens the journal.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidConfig`] if the configuration is invalid
    /// - [`CoreError::JournalLocked`] if the directory is already open
    /// - [`CoreError::CorruptSegment`] if a segment is damaged and the
    ///   recovery mode is fail-fast
    /// - I/O errors
    pub fn open(self) -> CoreResult<Journal> {
        Journal::open_with(self)
    }
}

/// A segmented, crash-tolerant local message journal.
///
/// All methods take `&self`; share the journal between threads with an
/// `Arc`.
pub struct Journal {
    config: JournalConfig,
    log: SegmentLog,
    clock: Arc<dyn Clock>,
    state: AtomicU8,
    /// Highest committed offset, or [`NOT_COMMITTED`].
    committed: AtomicI64,
    /// Committed offset last written to disk.
    persisted_committed: AtomicI64,
    /// Next offset handed out by [`read`](Self::read). Serializes readers.
    read_cursor: Mutex<u64>,
    throttle: ThrottleMonitor,
    activity_writer: Arc<dyn ActivityWriter>,
    stats: JournalStats,
}

impl Journal {
    /// Starts building a journal with non-default collaborators.
    ///
    /// Defaults: the system clock, a fresh [`ServerStatus`] in
    /// [`Lifecycle::Running`] and activities logged through `tracing`.
    #[must_use]
    pub fn builder(config: JournalConfig) -> JournalBuilder {
        JournalBuilder {
            config,
            clock: Arc::new(SystemClock),
            server_status: Arc::new(ServerStatus::with_lifecycle(Lifecycle::Running)),
            activity_writer: Arc::new(LogActivityWriter),
        }
    }

    /// Opens a journal with default collaborators.
    ///
    /// # Errors
    ///
    /// See [`JournalBuilder::open`].
    pub fn open(config: JournalConfig) -> CoreResult<Self> {
        Self::builder(config).open()
    }

    fn open_with(builder: JournalBuilder) -> CoreResult<Self> {
        let JournalBuilder {
            config,
            clock,
            server_status,
            activity_writer,
        } = builder;
        config.validate()?;

        let dir = JournalDir::open(&config.directory)?;
        let committed = dir.load_committed_offset()?;
        let log = SegmentLog::open(dir, &config, Arc::clone(&clock))?;

        let start = log.log_start_offset();
        let end = log.log_end_offset();
        let cursor = committed
            .map_or(start, |c| c.saturating_add(1))
            .clamp(start, end);
        let committed = committed.map_or(NOT_COMMITTED, to_signed);

        let journal = Self {
            throttle: ThrottleMonitor::new(config.throttle_threshold_percent, server_status),
            config,
            log,
            clock,
            state: AtomicU8::new(JournalState::Created.as_u8()),
            committed: AtomicI64::new(committed),
            persisted_committed: AtomicI64::new(committed),
            read_cursor: Mutex::new(cursor),
            activity_writer,
            stats: JournalStats::new(),
        };
        journal.set_state(JournalState::Running);

        tracing::info!(
            path = %journal.config.directory.display(),
            segments = journal.log.number_of_segments(),
            log_start_offset = start,
            log_end_offset = end,
            next_read_offset = cursor,
            "opened journal"
        );
        Ok(journal)
    }

    // === State ===

    /// Returns the journal state.
    #[must_use]
    pub fn state(&self) -> JournalState {
        JournalState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: JournalState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn is_running(&self) -> bool {
        self.state() == JournalState::Running
    }

    fn ensure_writable(&self) -> CoreResult<()> {
        match self.state() {
            JournalState::Running | JournalState::ShuttingDown => Ok(()),
            JournalState::Created | JournalState::Stopped => Err(CoreError::JournalClosed),
        }
    }

    // === Writing ===

    /// Writes one entry.
    ///
    /// Returns the assigned offset, or `None` if the entry was too large and
    /// was dropped.
    ///
    /// # Errors
    ///
    /// - [`CoreError::JournalClosed`] after [`close`](Self::close)
    /// - I/O errors
    pub fn write(&self, key: &[u8], payload: &[u8]) -> CoreResult<Option<u64>> {
        self.ensure_writable()?;
        let outcomes = self.log.append_batch([(key, payload)])?;
        Ok(outcomes
            .into_iter()
            .find_map(|outcome| self.record_append(outcome)))
    }

    /// Writes a batch of entries in order.
    ///
    /// Returns how many were written; oversized entries are dropped and not
    /// counted.
    ///
    /// # Errors
    ///
    /// - [`CoreError::JournalClosed`] after [`close`](Self::close)
    /// - I/O errors
    pub fn write_batch(&self, entries: &[Entry]) -> CoreResult<usize> {
        self.ensure_writable()?;
        let outcomes = self
            .log
            .append_batch(entries.iter().map(|e| (e.key.as_slice(), e.payload.as_slice())))?;
        Ok(outcomes
            .into_iter()
            .filter_map(|outcome| self.record_append(outcome))
            .count())
    }

    fn record_append(&self, outcome: Appended) -> Option<u64> {
        match outcome {
            Appended::Written { offset, size, rolled } => {
                self.stats.record_write(size);
                if rolled {
                    self.stats.record_roll();
                }
                Some(offset)
            }
            Appended::Dropped { .. } => {
                self.stats.record_drop();
                None
            }
        }
    }

    // === Reading ===

    /// Reads up to `max_entries` entries from the read cursor and advances
    /// it.
    ///
    /// At least one entry is requested even when `max_entries` is zero.
    /// Returns whatever is available without waiting, and nothing at all
    /// once shutdown has been triggered.
    ///
    /// # Errors
    ///
    /// Returns an error if a segment cannot be read.
    pub fn read(&self, max_entries: usize) -> CoreResult<Vec<ReadEntry>> {
        if !self.is_running() {
            return Ok(Vec::new());
        }
        let max = max_entries.max(1);

        let mut cursor = self.read_cursor.lock();
        let read = self.log.read(*cursor, max, || self.is_running())?;
        *cursor = read.next_offset;
        drop(cursor);

        self.stats.record_read(read.entries.len() as u64);
        Ok(read.entries)
    }

    /// Reads up to `max_entries` entries starting at `offset` without
    /// touching the read cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if a segment cannot be read.
    pub fn read_at(&self, offset: u64, max_entries: usize) -> CoreResult<Vec<ReadEntry>> {
        Ok(self.log.read(offset, max_entries.max(1), || true)?.entries)
    }

    // === Commit and retention ===

    /// Records that every entry up to and including `offset` has been
    /// processed. Lower values than the current committed offset are
    /// ignored.
    pub fn mark_journal_offset_committed(&self, offset: u64) {
        let previous = self.committed.fetch_max(to_signed(offset), Ordering::AcqRel);
        if to_signed(offset) > previous {
            tracing::trace!(offset, "committed journal offset");
        }
    }

    /// Highest committed offset, if anything was committed.
    #[must_use]
    pub fn committed_offset(&self) -> Option<u64> {
        from_signed(self.committed.load(Ordering::Acquire))
    }

    /// Deletes closed segments that violate the size, age or commit budget,
    /// then re-evaluates the throttle signal.
    ///
    /// Returns the number of segments removed.
    ///
    /// # Errors
    ///
    /// Returns an error if segment files cannot be removed.
    pub fn run_retention(&self) -> CoreResult<usize> {
        let engine = RetentionEngine::new(RetentionPolicy {
            max_total_size: self.config.max_total_size,
            max_age_ms: duration_millis(self.config.max_total_age),
            committed_offset: self.committed_offset(),
        });
        let removed = self.log.apply_retention(&engine)?;
        let count = removed.len();

        if count > 0 {
            self.stats.record_removal(count as u64);
            tracing::info!(
                removed = count,
                log_start_offset = self.log.log_start_offset(),
                "removed journal segments by retention"
            );
            self.activity_writer.write(&Activity::segments_removed(removed));
        }

        self.evaluate_throttle();
        Ok(count)
    }

    /// Syncs every segment with unsynced appends and persists the committed
    /// offset.
    ///
    /// # Errors
    ///
    /// Returns an error if a sync or the committed offset write fails.
    pub fn flush_dirty_logs(&self) -> CoreResult<()> {
        let synced = self.log.flush()?;
        if synced > 0 {
            self.stats.record_flush();
        }

        let committed = self.committed.load(Ordering::Acquire);
        if committed != self.persisted_committed.load(Ordering::Acquire) {
            if let Some(offset) = from_signed(committed) {
                self.log.dir().save_committed_offset(offset)?;
                self.persisted_committed.fetch_max(committed, Ordering::AcqRel);
            }
        }

        tracing::trace!(synced, "flushed journal");
        Ok(())
    }

    // === Utilization and throttling ===

    /// Fraction of the size budget in use, in `[0, 1]`.
    #[must_use]
    pub fn journal_utilization(&self) -> f64 {
        utilization(self.log.size(), self.config.max_total_size)
    }

    /// Moves the server lifecycle to `Throttled` or back to `Running`
    /// according to the current utilization.
    ///
    /// Returns whether the journal is over its threshold.
    pub fn evaluate_throttle(&self) -> bool {
        self.throttle.evaluate(self.journal_utilization())
    }

    /// Returns the lifecycle status driven by the throttle signal.
    #[must_use]
    pub fn server_status(&self) -> &Arc<ServerStatus> {
        self.throttle.status()
    }

    /// Snapshot of the journal for throttling decisions and monitoring.
    #[must_use]
    pub fn throttle_state(&self) -> ThrottleState {
        let log_start_offset = self.log.log_start_offset();
        let log_end_offset = self.log.log_end_offset();
        let committed_offset = self.committed_offset();
        let journal_size = self.log.size();
        ThrottleState {
            uncommitted_entries: uncommitted_entries(log_start_offset, log_end_offset, committed_offset),
            journal_size,
            journal_size_limit: self.config.max_total_size,
            utilization: utilization(journal_size, self.config.max_total_size),
            log_start_offset,
            log_end_offset,
            next_read_offset: self.next_read_offset(),
            committed_offset,
            segment_count: self.log.number_of_segments(),
        }
    }

    // === Shutdown ===

    /// Starts shutting down. From now on [`read`](Self::read) returns
    /// nothing; writes are still accepted until [`close`](Self::close).
    pub fn trigger_shutdown(&self) {
        let switched = self
            .state
            .compare_exchange(
                JournalState::Running.as_u8(),
                JournalState::ShuttingDown.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if switched {
            tracing::info!(path = %self.config.directory.display(), "journal shutting down");
        }
    }

    /// Shuts down, flushes everything and stops the journal.
    ///
    /// Calling `close` on a stopped journal does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails; the journal is stopped
    /// regardless.
    pub fn close(&self) -> CoreResult<()> {
        if self.state() == JournalState::Stopped {
            return Ok(());
        }
        self.trigger_shutdown();
        let flushed = self.flush_dirty_logs();
        self.set_state(JournalState::Stopped);
        tracing::info!(path = %self.config.directory.display(), "journal stopped");
        flushed
    }

    // === Introspection ===

    /// Returns the configuration the journal was opened with.
    #[must_use]
    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    /// Returns the journal directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.log.dir().path()
    }

    /// Returns the journal clock.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Metadata of every segment, ordered by base offset.
    #[must_use]
    pub fn segments(&self) -> Vec<SegmentInfo> {
        self.log.segments()
    }

    /// Marks a segment as reopened by external tooling, shielding it from
    /// size and age retention. Returns `false` if no such segment exists.
    pub fn set_segment_reopened(&self, base_offset: u64, reopened: bool) -> bool {
        self.log.set_segment_reopened(base_offset, reopened)
    }

    /// Oldest offset still stored.
    #[must_use]
    pub fn log_start_offset(&self) -> u64 {
        self.log.log_start_offset()
    }

    /// Offset the next written entry will receive.
    #[must_use]
    pub fn log_end_offset(&self) -> u64 {
        self.log.log_end_offset()
    }

    /// Offset the next [`read`](Self::read) starts at.
    #[must_use]
    pub fn next_read_offset(&self) -> u64 {
        *self.read_cursor.lock()
    }

    /// Total bytes stored across all segments.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.log.size()
    }

    /// Number of segments.
    #[must_use]
    pub fn number_of_segments(&self) -> usize {
        self.log.number_of_segments()
    }

    /// Returns a snapshot of the journal counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        if self.state() != JournalState::Stopped {
            if let Err(e) = self.close() {
                tracing::warn!(error = %e, "failed to close journal cleanly");
            }
        }
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("path", &self.config.directory)
            .field("state", &self.state())
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}

fn to_signed(offset: u64) -> i64 {
    i64::try_from(offset).unwrap_or(i64::MAX)
}

fn from_signed(offset: i64) -> Option<u64> {
    u64::try_from(offset).ok()
}
