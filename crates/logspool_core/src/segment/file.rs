//! A single journal segment: one data file plus its sparse index.

use crate::error::CoreResult;
use crate::segment::index::OffsetIndex;
use crate::segment::iterator::{RecordScanner, ScanEnd};
use crate::segment::record::JournalRecord;
use crate::types::{ReadEntry, SegmentInfo};
use logspool_storage::StorageBackend;
use parking_lot::Mutex;

/// What a full scan of a segment data file found.
///
/// Produced by [`Segment::scan`] at open time. The caller decides from
/// [`end`](Self::end) whether the segment may be repaired, and
/// [`Segment::recover`] then builds the live segment from it.
#[derive(Debug, Clone)]
pub struct SegmentScan {
    /// Length of the longest well-formed prefix.
    pub valid_len: u64,
    /// Size of the data file when scanned.
    pub file_len: u64,
    /// Offset following the last well-formed record.
    pub next_offset: u64,
    /// Timestamp of the first record, if any.
    pub first_timestamp: Option<u64>,
    /// Timestamp of the last record, if any.
    pub last_timestamp: Option<u64>,
    /// Why the scan stopped.
    pub end: ScanEnd,
    /// `(relative_offset, position, len)` of every record, for the index.
    records: Vec<(u32, u64, u64)>,
}

impl SegmentScan {
    /// Number of well-formed records.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Returns whether bytes past the valid prefix would be discarded.
    #[must_use]
    pub const fn needs_truncation(&self) -> bool {
        self.valid_len < self.file_len
    }
}

/// Records read from one segment.
#[derive(Debug, Default)]
pub struct SegmentRead {
    /// Entries in offset order.
    pub entries: Vec<ReadEntry>,
    /// Set when the data ran out before the requested count was reached.
    pub end: Option<ScanEnd>,
    /// The segment's `next_offset` at the time of the read.
    pub next_offset: u64,
}

struct SegmentInner {
    log: Box<dyn StorageBackend>,
    index: OffsetIndex,
    next_offset: u64,
    size: u64,
    created_at: u64,
    last_modified_at: u64,
    dirty: bool,
    closed: bool,
    reopened: bool,
}

/// One segment of the journal.
///
/// The base offset never changes. Everything else lives behind a mutex
/// shared by the single appender, readers and the flusher.
pub struct Segment {
    base_offset: u64,
    inner: Mutex<SegmentInner>,
}

impl Segment {
    /// Creates a new, empty segment.
    #[must_use]
    pub fn create(
        base_offset: u64,
        log: Box<dyn StorageBackend>,
        index: Box<dyn StorageBackend>,
        index_interval_bytes: u64,
        now_ms: u64,
    ) -> Self {
        Self {
            base_offset,
            inner: Mutex::new(SegmentInner {
                log,
                index: OffsetIndex::new(index, index_interval_bytes),
                next_offset: base_offset,
                size: 0,
                created_at: now_ms,
                last_modified_at: now_ms,
                dirty: false,
                closed: false,
                reopened: false,
            }),
        }
    }

    /// Scans an existing data file.
    ///
    /// Records must carry consecutive offsets starting at `base_offset`; a
    /// record out of sequence ends the scan as corrupt.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file cannot be read.
    pub fn scan(base_offset: u64, log: &dyn StorageBackend) -> CoreResult<SegmentScan> {
        let file_len = log.size()?;
        let mut scanner = RecordScanner::with_limit(log, 0, file_len);
        let mut records = Vec::new();
        let mut next_offset = base_offset;
        let mut first_timestamp = None;
        let mut last_timestamp = None;
        let mut out_of_sequence = None;

        while let Some(scanned) = scanner.next_record()? {
            if scanned.record.offset != next_offset {
                out_of_sequence = Some(ScanEnd::Corrupt {
                    position: scanned.position,
                    reason: format!(
                        "offset {} out of sequence, expected {next_offset}",
                        scanned.record.offset
                    ),
                });
                break;
            }
            let relative = u32::try_from(next_offset - base_offset).unwrap_or(u32::MAX);
            records.push((relative, scanned.position, scanned.len));
            first_timestamp.get_or_insert(scanned.record.timestamp_ms);
            last_timestamp = Some(scanned.record.timestamp_ms);
            next_offset += 1;
        }

        let valid_len = match &out_of_sequence {
            Some(ScanEnd::Corrupt { position, .. }) => *position,
            _ => scanner.position(),
        };
        let end = out_of_sequence
            .or_else(|| scanner.end().cloned())
            .unwrap_or(ScanEnd::Clean);

        Ok(SegmentScan {
            valid_len,
            file_len,
            next_offset,
            first_timestamp,
            last_timestamp,
            end,
            records,
        })
    }

    /// Builds a live segment from a scan, cutting the data file back to
    /// the scanned valid prefix and rebuilding the index.
    ///
    /// `fallback_ms` dates an empty segment, which has no record timestamps.
    ///
    /// # Errors
    ///
    /// Returns an error if the data file cannot be truncated or the index
    /// cannot be rewritten.
    pub fn recover(
        base_offset: u64,
        mut log: Box<dyn StorageBackend>,
        index: Box<dyn StorageBackend>,
        scan: SegmentScan,
        index_interval_bytes: u64,
        fallback_ms: u64,
    ) -> CoreResult<Self> {
        if scan.needs_truncation() {
            log.truncate(scan.valid_len)?;
        }
        let index = OffsetIndex::rebuild(index, index_interval_bytes, scan.records)?;

        Ok(Self {
            base_offset,
            inner: Mutex::new(SegmentInner {
                log,
                index,
                next_offset: scan.next_offset,
                size: scan.valid_len,
                created_at: scan.first_timestamp.unwrap_or(fallback_ms),
                last_modified_at: scan.last_timestamp.unwrap_or(fallback_ms),
                dirty: false,
                closed: false,
                reopened: false,
            }),
        })
    }

    /// Offset of the first entry and the segment's identity.
    #[must_use]
    pub const fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Exclusive upper bound of the stored offsets.
    #[must_use]
    pub fn next_offset(&self) -> u64 {
        self.inner.lock().next_offset
    }

    /// Size of the data file in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    /// Creation time in milliseconds since the epoch.
    #[must_use]
    pub fn created_at(&self) -> u64 {
        self.inner.lock().created_at
    }

    /// Returns whether the segment holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock();
        inner.next_offset == self.base_offset
    }

    /// Returns whether external tooling has the segment open.
    #[must_use]
    pub fn is_reopened(&self) -> bool {
        self.inner.lock().reopened
    }

    /// Marks the segment as opened by external tooling.
    pub fn set_reopened(&self, reopened: bool) {
        self.inner.lock().reopened = reopened;
    }

    /// Stops accepting appends. Called when a newer segment takes over.
    pub fn close(&self) {
        self.inner.lock().closed = true;
    }

    /// Snapshot of the segment's metadata.
    #[must_use]
    pub fn info(&self) -> SegmentInfo {
        let inner = self.inner.lock();
        SegmentInfo {
            base_offset: self.base_offset,
            next_offset: inner.next_offset,
            size: inner.size,
            created_at: inner.created_at,
            last_modified_at: inner.last_modified_at,
            active: !inner.closed,
            reopened: inner.reopened,
        }
    }

    /// Appends one entry and returns its offset.
    ///
    /// Size limits are the caller's concern; the segment stores whatever
    /// it is given.
    ///
    /// Once the record is in the data file the offset is taken. A failed
    /// index write only costs the on-disk index entry, which is rebuilt
    /// from the data file at the next open.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be framed or written to the
    /// data file.
    pub fn append(&self, key: &[u8], payload: &[u8], timestamp_ms: u64) -> CoreResult<u64> {
        let mut inner = self.inner.lock();
        let offset = inner.next_offset;
        let bytes = JournalRecord::new(offset, timestamp_ms, key.to_vec(), payload.to_vec()).encode()?;
        let len = bytes.len() as u64;
        let position = inner.size;

        inner.log.append(&bytes)?;
        inner.size += len;
        inner.next_offset += 1;
        inner.last_modified_at = timestamp_ms;
        inner.dirty = true;

        let relative = u32::try_from(offset - self.base_offset).unwrap_or(u32::MAX);
        if let Err(e) = inner.index.on_append(relative, position, len) {
            tracing::warn!(
                base_offset = self.base_offset,
                offset,
                error = %e,
                "failed to write offset index entry"
            );
        }
        Ok(offset)
    }

    /// Reads up to `max` entries starting at `from`.
    ///
    /// Entries below `from` are skipped. When fewer than `max` entries come
    /// back, [`SegmentRead::end`] says whether the file simply ended or was
    /// found damaged.
    ///
    /// # Errors
    ///
    /// Returns an error if the data file cannot be read.
    pub fn read(&self, from: u64, max: usize) -> CoreResult<SegmentRead> {
        let inner = self.inner.lock();
        let mut result = SegmentRead {
            next_offset: inner.next_offset,
            ..SegmentRead::default()
        };
        if max == 0 {
            return Ok(result);
        }
        if from >= inner.next_offset {
            result.end = Some(ScanEnd::Clean);
            return Ok(result);
        }

        let relative = u32::try_from(from.saturating_sub(self.base_offset)).unwrap_or(u32::MAX);
        let start = inner.index.lookup(relative);
        let mut scanner = RecordScanner::with_limit(inner.log.as_ref(), start.position, inner.size);

        while let Some(scanned) = scanner.next_record()? {
            let record = scanned.record;
            if record.offset < from {
                continue;
            }
            result.entries.push(ReadEntry {
                offset: record.offset,
                key: record.key,
                payload: record.payload,
            });
            if result.entries.len() >= max {
                return Ok(result);
            }
        }

        result.end = scanner.end().cloned();
        Ok(result)
    }

    /// Syncs the data and index files if anything was appended since the
    /// last sync.
    ///
    /// Returns whether a sync happened.
    ///
    /// # Errors
    ///
    /// Returns an error if either sync fails.
    pub fn sync(&self) -> CoreResult<bool> {
        let mut inner = self.inner.lock();
        if !inner.dirty {
            return Ok(false);
        }
        inner.log.sync()?;
        inner.index.sync()?;
        inner.dirty = false;
        Ok(true)
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("base_offset", &self.base_offset)
            .finish_non_exhaustive()
    }
}
