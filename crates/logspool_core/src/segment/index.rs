//! Sparse offset index.
//!
//! Every segment keeps a `.index` file next to its `.log` data file. After
//! each `interval_bytes` of appended data the next record's position is
//! indexed, so a read of offset `o` can start scanning close to `o` instead
//! of at the beginning of the segment.
//!
//! ## Index Entry Format
//!
//! ```text
//! | relative_offset (4) | position (8) |
//! ```
//!
//! `relative_offset` is the record offset minus the segment base offset.

use crate::error::CoreResult;
use logspool_storage::StorageBackend;

/// Size of one index entry on disk.
pub const INDEX_ENTRY_SIZE: usize = 12;

/// One index point: where a given relative offset starts in the data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Offset relative to the segment base offset.
    pub relative_offset: u32,
    /// Byte position of the record in the data file.
    pub position: u64,
}

impl IndexEntry {
    fn encode(self) -> [u8; INDEX_ENTRY_SIZE] {
        let mut buf = [0u8; INDEX_ENTRY_SIZE];
        buf[..4].copy_from_slice(&self.relative_offset.to_le_bytes());
        buf[4..].copy_from_slice(&self.position.to_le_bytes());
        buf
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut rel = [0u8; 4];
        rel.copy_from_slice(&bytes[..4]);
        let mut pos = [0u8; 8];
        pos.copy_from_slice(&bytes[4..INDEX_ENTRY_SIZE]);
        Self {
            relative_offset: u32::from_le_bytes(rel),
            position: u64::from_le_bytes(pos),
        }
    }
}

/// Tracks when the next index entry is due.
///
/// Shared by the live index and by recovery, which replays the same
/// decisions over scanned records to rebuild an index from the data file.
#[derive(Debug, Clone)]
pub struct IndexCadence {
    interval_bytes: u64,
    bytes_since_last: u64,
}

impl IndexCadence {
    /// Creates a cadence that indexes after every `interval_bytes`.
    #[must_use]
    pub fn new(interval_bytes: u64) -> Self {
        Self {
            interval_bytes,
            bytes_since_last: 0,
        }
    }

    /// Observes a record about to be appended at `position`.
    ///
    /// Returns the entry to index, if one is due before this record.
    pub fn observe(
        &mut self,
        relative_offset: u32,
        position: u64,
        record_len: u64,
    ) -> Option<IndexEntry> {
        let due = self.bytes_since_last > self.interval_bytes;
        if due {
            self.bytes_since_last = 0;
        }
        self.bytes_since_last += record_len;
        due.then_some(IndexEntry {
            relative_offset,
            position,
        })
    }
}

/// The sparse index of one segment.
pub struct OffsetIndex {
    backend: Box<dyn StorageBackend>,
    entries: Vec<IndexEntry>,
    cadence: IndexCadence,
}

impl OffsetIndex {
    /// Creates an index over an empty backend.
    #[must_use]
    pub fn new(backend: Box<dyn StorageBackend>, interval_bytes: u64) -> Self {
        Self {
            backend,
            entries: Vec::new(),
            cadence: IndexCadence::new(interval_bytes),
        }
    }

    /// Rebuilds the index of an existing segment from its scanned records.
    ///
    /// `records` yields `(relative_offset, position, record_len)` for every
    /// well-formed record in data-file order. The backend is rewritten only
    /// when its contents differ from the rebuilt entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the index file cannot be read or rewritten.
    pub fn rebuild<I>(
        mut backend: Box<dyn StorageBackend>,
        interval_bytes: u64,
        records: I,
    ) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (u32, u64, u64)>,
    {
        let mut cadence = IndexCadence::new(interval_bytes);
        let entries: Vec<IndexEntry> = records
            .into_iter()
            .filter_map(|(rel, pos, len)| cadence.observe(rel, pos, len))
            .collect();

        let expected: Vec<u8> = entries.iter().flat_map(|e| e.encode()).collect();
        let size = backend.size()?;
        let current = backend.read_up_to(0, size as usize)?;
        if current != expected {
            tracing::debug!(
                stale_entries = current.len() / INDEX_ENTRY_SIZE,
                rebuilt_entries = entries.len(),
                "rewriting offset index"
            );
            backend.truncate(0)?;
            backend.append(&expected)?;
            backend.sync()?;
        }

        Ok(Self {
            backend,
            entries,
            cadence,
        })
    }

    /// Parses whatever complete entries a backend holds.
    ///
    /// A partial trailing entry is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn read_entries(backend: &dyn StorageBackend) -> CoreResult<Vec<IndexEntry>> {
        let size = backend.size()?;
        let data = backend.read_up_to(0, size as usize)?;
        Ok(data
            .chunks_exact(INDEX_ENTRY_SIZE)
            .map(IndexEntry::decode)
            .collect())
    }

    /// Records that a record of `record_len` bytes is about to be appended
    /// at `position`, writing an index entry if one is due.
    ///
    /// # Errors
    ///
    /// Returns an error if the index entry cannot be written.
    pub fn on_append(
        &mut self,
        relative_offset: u32,
        position: u64,
        record_len: u64,
    ) -> CoreResult<()> {
        if let Some(entry) = self.cadence.observe(relative_offset, position, record_len) {
            self.entries.push(entry);
            self.backend.append(&entry.encode())?;
        }
        Ok(())
    }

    /// Finds where to start scanning for `relative_offset`.
    ///
    /// Returns the greatest indexed entry at or below the target, or the
    /// start of the segment.
    #[must_use]
    pub fn lookup(&self, relative_offset: u32) -> IndexEntry {
        let idx = self
            .entries
            .partition_point(|e| e.relative_offset <= relative_offset);
        if idx == 0 {
            IndexEntry {
                relative_offset: 0,
                position: 0,
            }
        } else {
            self.entries[idx - 1]
        }
    }

    /// Returns the in-memory index entries.
    #[must_use]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Syncs the index file.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&mut self) -> CoreResult<()> {
        self.backend.sync()?;
        Ok(())
    }
}

impl std::fmt::Debug for OffsetIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OffsetIndex")
            .field("entries", &self.entries.len())
            .field("cadence", &self.cadence)
            .finish_non_exhaustive()
    }
}
