//! Segment storage for journal entries.
//!
//! The journal is a sequence of segments. Each segment is a pair of files
//! named after the offset of its first entry:
//!
//! ```text
//! 00000000000000000000.log     # framed records
//! 00000000000000000000.index   # sparse offset index
//! ```
//!
//! Only the newest segment receives appends. Older segments are immutable
//! until retention deletes them whole.
//!
//! ## Record Format
//!
//! ```text
//! | record_len (4) | magic (1) | offset (8) | timestamp_ms (8) | key_len (4) | key | payload | crc32 (4) |
//! ```
//!
//! All integers are little-endian. The CRC covers every byte before it.

mod file;
mod index;
mod iterator;
mod record;

pub use file::{Segment, SegmentRead, SegmentScan};
pub use index::{IndexCadence, IndexEntry, OffsetIndex, INDEX_ENTRY_SIZE};
pub use iterator::{RecordScanner, ScanEnd, ScannedRecord};
pub use record::{compute_crc32, JournalRecord, RECORD_HEADER_SIZE, RECORD_MAGIC, RECORD_OVERHEAD};

/// Extension of segment data files.
pub const LOG_FILE_SUFFIX: &str = "log";

/// Extension of segment index files.
pub const INDEX_FILE_SUFFIX: &str = "index";

/// Suffix appended to segment files that are being deleted.
pub const DELETED_FILE_SUFFIX: &str = "deleted";

/// Name of the data file of the segment starting at `base_offset`.
#[must_use]
pub fn log_file_name(base_offset: u64) -> String {
    format!("{base_offset:020}.{LOG_FILE_SUFFIX}")
}

/// Name of the index file of the segment starting at `base_offset`.
#[must_use]
pub fn index_file_name(base_offset: u64) -> String {
    format!("{base_offset:020}.{INDEX_FILE_SUFFIX}")
}

/// Extracts the base offset from a segment data file name.
///
/// Returns `None` for anything that is not `<20 digits>.log`.
#[must_use]
pub fn parse_log_file_name(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(LOG_FILE_SUFFIX)?.strip_suffix('.')?;
    if stem.len() != 20 || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}
