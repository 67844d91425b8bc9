//! The segment log.
//!
//! Owns the ordered set of segments in one journal directory, assigns
//! offsets, rolls segments and reads across segment boundaries.
//!
//! # Locking
//!
//! - `append_lock` serializes appends, rolls and retention, so offsets are
//!   assigned without gaps or duplicates
//! - `segments` guards the ordered map; readers take short read locks to
//!   find a segment and then read it without holding the map
//! - each [`Segment`] guards its own files

use crate::clock::Clock;
use crate::config::{JournalConfig, RecoveryMode};
use crate::dir::JournalDir;
use crate::error::{CoreError, CoreResult};
use crate::retention::{RetentionCandidate, RetentionEngine};
use crate::segment::{JournalRecord, ScanEnd, Segment};
use crate::types::{ReadEntry, SegmentInfo};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Outcome of appending one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appended {
    /// Stored at `offset`.
    Written {
        /// Assigned offset.
        offset: u64,
        /// Framed size in bytes.
        size: u64,
        /// Whether a new segment was started for this entry.
        rolled: bool,
    },
    /// Too large to store.
    Dropped {
        /// Framed size in bytes, saturated at `u64::MAX`.
        size: u64,
    },
}

/// Entries returned by [`SegmentLog::read`].
#[derive(Debug, Default)]
pub struct LogRead {
    /// Entries in offset order.
    pub entries: Vec<ReadEntry>,
    /// Where the next read should start.
    pub next_offset: u64,
}

/// The ordered set of segments of one journal.
pub struct SegmentLog {
    dir: JournalDir,
    segments: RwLock<BTreeMap<u64, Arc<Segment>>>,
    append_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
    max_segment_size: u64,
    max_segment_age_ms: u64,
    max_entry_size: u64,
    index_interval_bytes: u64,
}

impl SegmentLog {
    /// Opens the segment log in `dir`, recovering every segment on disk.
    ///
    /// The segment with the highest base offset becomes the active segment.
    /// An empty directory gets a fresh segment at offset 0.
    ///
    /// # Errors
    ///
    /// - [`CoreError::CorruptSegment`] if a segment other than the newest
    ///   fails validation and `config.recovery_mode` is
    ///   [`RecoveryMode::FailFast`]. Damage at the end of the newest segment
    ///   is a torn write and is always trimmed.
    /// - I/O errors
    pub fn open(dir: JournalDir, config: &JournalConfig, clock: Arc<dyn Clock>) -> CoreResult<Self> {
        dir.clean_deleted_files()?;

        let offsets = dir.segment_offsets()?;
        let last = offsets.last().copied();
        let mut segments = BTreeMap::new();
        let mut previous_end: Option<u64> = None;

        for base in offsets {
            let is_last = Some(base) == last;
            if let Some(end) = previous_end {
                if base < end {
                    return Err(CoreError::corrupt_segment(
                        base,
                        format!("overlaps the previous segment, which ends at offset {end}"),
                    ));
                }
            }

            let (log, index) = dir.open_segment_files(base)?;
            let scan = Segment::scan(base, &log)?;
            match &scan.end {
                ScanEnd::Clean => {}
                ScanEnd::Truncated { position } | ScanEnd::Corrupt { position, .. } if is_last => {
                    tracing::warn!(
                        base_offset = base,
                        position,
                        discarded_bytes = scan.file_len - scan.valid_len,
                        damage = %describe_damage(&scan.end),
                        "truncating torn write at the end of the journal"
                    );
                }
                damage => match config.recovery_mode {
                    RecoveryMode::FailFast => {
                        return Err(CoreError::corrupt_segment(base, describe_damage(damage)));
                    }
                    RecoveryMode::BestEffort => {
                        tracing::warn!(
                            base_offset = base,
                            next_offset = scan.next_offset,
                            discarded_bytes = scan.file_len - scan.valid_len,
                            damage = %describe_damage(damage),
                            "cutting damaged segment back to its last valid record"
                        );
                    }
                },
            }

            let fallback = dir
                .log_modified_ms(base)
                .unwrap_or_else(|| clock.now_millis());
            let segment = Segment::recover(
                base,
                Box::new(log),
                Box::new(index),
                scan,
                config.index_interval_bytes,
                fallback,
            )?;
            if !is_last {
                segment.close();
            }
            previous_end = Some(segment.next_offset());
            segments.insert(base, Arc::new(segment));
        }

        let log = Self {
            dir,
            segments: RwLock::new(segments),
            append_lock: Mutex::new(()),
            clock,
            max_segment_size: config.max_segment_size,
            max_segment_age_ms: crate::clock::duration_millis(config.max_segment_age),
            max_entry_size: config.max_entry_size(),
            index_interval_bytes: config.index_interval_bytes,
        };

        if log.segments.read().is_empty() {
            log.create_segment(0)?;
        }

        tracing::debug!(
            segments = log.number_of_segments(),
            log_start_offset = log.log_start_offset(),
            log_end_offset = log.log_end_offset(),
            "opened segment log"
        );
        Ok(log)
    }

    /// Returns the journal directory.
    #[must_use]
    pub fn dir(&self) -> &JournalDir {
        &self.dir
    }

    fn create_segment(&self, base_offset: u64) -> CoreResult<Arc<Segment>> {
        let (log, index) = self.dir.open_segment_files(base_offset)?;
        self.dir.sync_segments_directory()?;
        let segment = Arc::new(Segment::create(
            base_offset,
            Box::new(log),
            Box::new(index),
            self.index_interval_bytes,
            self.clock.now_millis(),
        ));
        self.segments.write().insert(base_offset, Arc::clone(&segment));
        Ok(segment)
    }

    /// Returns the segment receiving appends.
    ///
    /// # Errors
    ///
    /// Returns an error only if the log has no segments, which `open`
    /// prevents.
    pub fn active_segment(&self) -> CoreResult<Arc<Segment>> {
        self.segments
            .read()
            .values()
            .next_back()
            .cloned()
            .ok_or_else(|| CoreError::invalid_format("segment log has no segments"))
    }

    /// Returns all segments, ordered by base offset.
    #[must_use]
    pub fn segments_ordered(&self) -> Vec<Arc<Segment>> {
        self.segments.read().values().cloned().collect()
    }

    /// Returns metadata for all segments, ordered by base offset.
    #[must_use]
    pub fn segments(&self) -> Vec<SegmentInfo> {
        self.segments_ordered().iter().map(|s| s.info()).collect()
    }

    /// Closes the active segment and starts a new one at its next offset.
    ///
    /// An empty active segment is kept as is.
    ///
    /// # Errors
    ///
    /// Returns an error if the new segment files cannot be created.
    pub fn roll_segment(&self) -> CoreResult<Arc<Segment>> {
        let _guard = self.append_lock.lock();
        let active = self.active_segment()?;
        if active.is_empty() {
            return Ok(active);
        }
        self.roll(&active)
    }

    fn roll(&self, active: &Segment) -> CoreResult<Arc<Segment>> {
        let base_offset = active.next_offset();
        let segment = self.create_segment(base_offset)?;
        active.close();
        tracing::debug!(
            base_offset,
            previous_base_offset = active.base_offset(),
            previous_size = active.size(),
            "rolled new journal segment"
        );
        Ok(segment)
    }

    fn needs_roll(&self, active: &Segment, len: u64, now_ms: u64) -> bool {
        if active.is_empty() {
            return false;
        }
        active.size().saturating_add(len) > self.max_segment_size
            || now_ms.saturating_sub(active.created_at()) > self.max_segment_age_ms
    }

    /// Appends entries in order.
    ///
    /// An entry whose framed size exceeds the smaller of the segment size
    /// and message size limits is dropped. A segment is rolled before an
    /// entry that would overflow it, or when it has outlived the segment
    /// age limit.
    ///
    /// # Errors
    ///
    /// Returns an error if a write or roll fails. Entries before the failing
    /// one stay written.
    pub fn append_batch<'e, I>(&self, entries: I) -> CoreResult<Vec<Appended>>
    where
        I: IntoIterator<Item = (&'e [u8], &'e [u8])>,
    {
        let _guard = self.append_lock.lock();
        let mut active = self.active_segment()?;
        let mut outcomes = Vec::new();

        for (key, payload) in entries {
            let Some(size) = JournalRecord::encoded_len_for(key.len(), payload.len())
                .filter(|size| *size <= self.max_entry_size)
            else {
                let size = JournalRecord::encoded_len_for(key.len(), payload.len())
                    .unwrap_or(u64::MAX);
                tracing::debug!(
                    size,
                    max_entry_size = self.max_entry_size,
                    "dropping entry larger than the maximum entry size"
                );
                outcomes.push(Appended::Dropped { size });
                continue;
            };

            let now = self.clock.now_millis();
            let rolled = self.needs_roll(&active, size, now);
            if rolled {
                active = self.roll(&active)?;
            }
            let offset = active.append(key, payload, now)?;
            outcomes.push(Appended::Written {
                offset,
                size,
                rolled,
            });
        }
        Ok(outcomes)
    }

    /// Reads up to `max` entries starting at `from`, crossing segment
    /// boundaries.
    ///
    /// `keep_going` is consulted before every step; returning `false` ends
    /// the read with whatever was collected. A non-active segment that ends
    /// before its recorded end offset is skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if a segment cannot be read.
    pub fn read<F>(&self, from: u64, max: usize, keep_going: F) -> CoreResult<LogRead>
    where
        F: Fn() -> bool,
    {
        let mut entries = Vec::new();
        let mut cursor = from;

        while entries.len() < max && keep_going() {
            let (segment, next_base) = {
                let segments = self.segments.read();
                let Some(segment) = segments.range(..=cursor).next_back().map(|(_, s)| Arc::clone(s))
                else {
                    match segments.keys().next() {
                        Some(&start) => {
                            tracing::warn!(
                                read_offset = cursor,
                                log_start_offset = start,
                                "read offset is below the log start, resuming at the log start"
                            );
                            cursor = start;
                            continue;
                        }
                        None => break,
                    }
                };
                let next_base = segments
                    .range(cursor.saturating_add(1)..)
                    .next()
                    .map(|(base, _)| *base);
                (segment, next_base)
            };

            let read = segment.read(cursor, max - entries.len())?;
            if let Some(last) = read.entries.last() {
                cursor = last.offset + 1;
            }
            entries.extend(read.entries);

            let Some(end) = read.end else {
                continue;
            };
            if cursor < read.next_offset {
                let Some(next_base) = next_base else {
                    tracing::warn!(
                        base_offset = segment.base_offset(),
                        read_offset = cursor,
                        expected_end = read.next_offset,
                        damage = %describe_damage(&end),
                        "active segment ends before its last written offset"
                    );
                    break;
                };
                tracing::warn!(
                    base_offset = segment.base_offset(),
                    read_offset = cursor,
                    expected_end = read.next_offset,
                    skip_to = next_base,
                    damage = %describe_damage(&end),
                    "segment ends early, skipping to the next segment"
                );
                cursor = next_base;
            } else {
                match next_base {
                    Some(next_base) => cursor = cursor.max(next_base),
                    None => break,
                }
            }
        }

        Ok(LogRead {
            entries,
            next_offset: cursor,
        })
    }

    /// Applies a retention plan under the append lock.
    ///
    /// The plan is computed from a snapshot taken after the lock is
    /// acquired. Returns the removed segments, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if a segment's files cannot be removed. Segments
    /// removed before the failure stay removed.
    pub fn apply_retention(&self, engine: &RetentionEngine) -> CoreResult<Vec<RetentionCandidate>> {
        let _guard = self.append_lock.lock();
        let plan = engine.plan(&self.segments(), self.clock.now_millis());

        let mut removed = Vec::with_capacity(plan.len());
        for candidate in plan {
            self.remove_segment_locked(candidate.base_offset)?;
            removed.push(candidate);
        }
        Ok(removed)
    }

    /// Removes one closed segment and its files.
    ///
    /// Returns `false` if no such segment exists or it is the active
    /// segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the files cannot be removed; the segment is then
    /// left in place.
    pub fn remove_segment(&self, base_offset: u64) -> CoreResult<bool> {
        let _guard = self.append_lock.lock();
        self.remove_segment_locked(base_offset)
    }

    fn remove_segment_locked(&self, base_offset: u64) -> CoreResult<bool> {
        let is_removable = {
            let segments = self.segments.read();
            segments.contains_key(&base_offset)
                && segments.keys().next_back() != Some(&base_offset)
        };
        if !is_removable {
            return Ok(false);
        }

        let marked = self.dir.mark_segment_deleted(base_offset)?;
        self.segments.write().remove(&base_offset);
        self.dir.remove_marked(&marked)?;
        tracing::debug!(base_offset, "removed journal segment");
        Ok(true)
    }

    /// Syncs every segment with unsynced appends.
    ///
    /// Returns the number of segments synced.
    ///
    /// # Errors
    ///
    /// Returns an error if a sync fails.
    pub fn flush(&self) -> CoreResult<usize> {
        let mut synced = 0;
        for segment in self.segments_ordered() {
            if segment.sync()? {
                synced += 1;
            }
        }
        Ok(synced)
    }

    /// Marks a segment as reopened by external tooling.
    ///
    /// Returns `false` if no such segment exists.
    pub fn set_segment_reopened(&self, base_offset: u64, reopened: bool) -> bool {
        match self.segments.read().get(&base_offset) {
            Some(segment) => {
                segment.set_reopened(reopened);
                true
            }
            None => false,
        }
    }

    /// Oldest offset still stored.
    #[must_use]
    pub fn log_start_offset(&self) -> u64 {
        self.segments.read().keys().next().copied().unwrap_or(0)
    }

    /// Offset the next appended entry will receive.
    #[must_use]
    pub fn log_end_offset(&self) -> u64 {
        self.active_segment().map_or(0, |s| s.next_offset())
    }

    /// Total bytes stored across all segments.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.segments_ordered().iter().map(|s| s.size()).sum()
    }

    /// Number of segments.
    #[must_use]
    pub fn number_of_segments(&self) -> usize {
        self.segments.read().len()
    }
}

impl std::fmt::Debug for SegmentLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentLog")
            .field("path", &self.dir.path())
            .field("segments", &self.number_of_segments())
            .finish_non_exhaustive()
    }
}

fn describe_damage(end: &ScanEnd) -> String {
    match end {
        ScanEnd::Clean => "clean end".to_string(),
        ScanEnd::Truncated { position } => format!("incomplete record at byte {position}"),
        ScanEnd::Corrupt { position, reason } => format!("invalid record at byte {position}: {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::retention::RetentionPolicy;
    use std::time::Duration;
    use tempfile::tempdir;

    // 4-byte key + 67-byte payload + 29 bytes framing = 100 bytes.
    fn entry(i: u64) -> (Vec<u8>, Vec<u8>) {
        (format!("{i:04}").into_bytes(), format!("{i:067}").into_bytes())
    }

    fn config(path: &std::path::Path) -> JournalConfig {
        JournalConfig::new(
            path,
            1000,
            Duration::from_secs(3600),
            100_000,
            Duration::from_secs(3600),
            1_000_000,
            Duration::from_secs(60),
            0,
        )
    }

    fn open(path: &std::path::Path, clock: Arc<ManualClock>) -> SegmentLog {
        SegmentLog::open(JournalDir::open(path).unwrap(), &config(path), clock).unwrap()
    }

    fn append(log: &SegmentLog, range: std::ops::Range<u64>) -> Vec<Appended> {
        let entries: Vec<_> = range.map(entry).collect();
        log.append_batch(entries.iter().map(|(k, p)| (k.as_slice(), p.as_slice())))
            .unwrap()
    }

    #[test]
    fn open_empty_creates_first_segment() {
        let temp = tempdir().unwrap();
        let log = open(temp.path(), Arc::new(ManualClock::new(0)));
        assert_eq!(log.number_of_segments(), 1);
        assert_eq!(log.log_start_offset(), 0);
        assert_eq!(log.log_end_offset(), 0);
        assert!(log.dir().log_path(0).exists());
    }

    #[test]
    fn entries_are_exactly_one_hundred_bytes() {
        let (key, payload) = entry(7);
        assert_eq!(JournalRecord::encoded_len_for(key.len(), payload.len()), Some(100));
    }

    #[test]
    fn rolls_before_overflow() {
        let temp = tempdir().unwrap();
        let log = open(temp.path(), Arc::new(ManualClock::new(0)));

        let outcomes = append(&log, 0..25);
        let rolled: Vec<u64> = outcomes
            .iter()
            .filter_map(|o| match o {
                Appended::Written { offset, rolled: true, .. } => Some(*offset),
                _ => None,
            })
            .collect();
        assert_eq!(rolled, vec![10, 20]);

        let infos = log.segments();
        let bases: Vec<u64> = infos.iter().map(|s| s.base_offset).collect();
        assert_eq!(bases, vec![0, 10, 20]);
        assert_eq!(infos[0].size, 1000);
        assert!(!infos[0].active);
        assert!(infos[2].active);
        assert_eq!(log.size(), 2500);
    }

    #[test]
    fn rolls_on_age() {
        let temp = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(0));
        let log = open(temp.path(), Arc::clone(&clock));

        append(&log, 0..2);
        clock.advance(Duration::from_secs(3601));
        append(&log, 2..3);

        let bases: Vec<u64> = log.segments().iter().map(|s| s.base_offset).collect();
        assert_eq!(bases, vec![0, 2]);
    }

    #[test]
    fn drops_oversized_entries() {
        let temp = tempdir().unwrap();
        let log = open(temp.path(), Arc::new(ManualClock::new(0)));

        let big = vec![0u8; 1000];
        let outcomes = log
            .append_batch([(b"k".as_slice(), b"small".as_slice()), (b"big".as_slice(), big.as_slice())])
            .unwrap();
        assert!(matches!(outcomes[0], Appended::Written { offset: 0, .. }));
        assert!(matches!(outcomes[1], Appended::Dropped { size } if size == 1032));
        assert_eq!(log.log_end_offset(), 1);
    }

    #[test]
    fn read_crosses_segments() {
        let temp = tempdir().unwrap();
        let log = open(temp.path(), Arc::new(ManualClock::new(0)));
        append(&log, 0..25);

        let read = log.read(8, 5, || true).unwrap();
        let offsets: Vec<u64> = read.entries.iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![8, 9, 10, 11, 12]);
        assert_eq!(read.next_offset, 13);

        let rest = log.read(13, 100, || true).unwrap();
        assert_eq!(rest.entries.len(), 12);
        assert_eq!(rest.next_offset, 25);

        assert!(log.read(25, 10, || true).unwrap().entries.is_empty());
    }

    #[test]
    fn read_stops_when_told() {
        let temp = tempdir().unwrap();
        let log = open(temp.path(), Arc::new(ManualClock::new(0)));
        append(&log, 0..5);
        let read = log.read(0, 10, || false).unwrap();
        assert!(read.entries.is_empty());
        assert_eq!(read.next_offset, 0);
    }

    #[test]
    fn reopen_restores_segments() {
        let temp = tempdir().unwrap();
        {
            let log = open(temp.path(), Arc::new(ManualClock::new(5_000)));
            append(&log, 0..25);
            log.flush().unwrap();
        }

        let log = open(temp.path(), Arc::new(ManualClock::new(10_000)));
        let infos = log.segments();
        assert_eq!(infos.len(), 3);
        assert!(!infos[0].active && !infos[1].active && infos[2].active);
        assert_eq!(infos[0].created_at, 5_000);
        assert_eq!(log.log_end_offset(), 25);

        let outcomes = append(&log, 25..26);
        assert!(matches!(outcomes[0], Appended::Written { offset: 25, rolled: false, .. }));
    }

    #[test]
    fn retention_removes_files() {
        let temp = tempdir().unwrap();
        let log = open(temp.path(), Arc::new(ManualClock::new(0)));
        append(&log, 0..30);

        let engine = RetentionEngine::new(RetentionPolicy {
            max_total_size: 1000,
            max_age_ms: u64::MAX,
            committed_offset: None,
        });
        let removed = log.apply_retention(&engine).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(log.log_start_offset(), 20);
        assert!(!log.dir().log_path(0).exists());
        assert!(!log.dir().index_path(10).exists());
    }

    #[test]
    fn active_segment_cannot_be_removed() {
        let temp = tempdir().unwrap();
        let log = open(temp.path(), Arc::new(ManualClock::new(0)));
        append(&log, 0..15);

        assert!(!log.remove_segment(10).unwrap());
        assert!(!log.remove_segment(99).unwrap());
        assert!(log.remove_segment(0).unwrap());
        assert_eq!(log.number_of_segments(), 1);
    }

    #[test]
    fn read_below_start_resumes_at_start() {
        let temp = tempdir().unwrap();
        let log = open(temp.path(), Arc::new(ManualClock::new(0)));
        append(&log, 0..15);
        log.remove_segment(0).unwrap();

        let read = log.read(3, 1, || true).unwrap();
        assert_eq!(read.entries[0].offset, 10);
    }

    #[test]
    fn roll_segment_skips_empty_active() {
        let temp = tempdir().unwrap();
        let log = open(temp.path(), Arc::new(ManualClock::new(0)));
        assert_eq!(log.roll_segment().unwrap().base_offset(), 0);

        append(&log, 0..3);
        assert_eq!(log.roll_segment().unwrap().base_offset(), 3);
        assert_eq!(log.number_of_segments(), 2);
    }
}
