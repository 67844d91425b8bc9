//! CLI command implementations.

pub mod decode;
pub mod show;
pub mod verify;

use logspool_core::dir::{list_segment_offsets, segments_path};
use logspool_core::segment::{index_file_name, log_file_name, ScanEnd};
use logspool_storage::FileBackend;
use std::path::Path;

/// Result type shared by the commands.
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Read-only handles on one segment's files.
pub struct SegmentFiles {
    /// Offset of the segment's first entry.
    pub base_offset: u64,
    /// Data file.
    pub log: FileBackend,
    /// Offset index, if present.
    pub index: Option<FileBackend>,
}

/// Opens every segment of the journal at `root`, oldest first.
pub fn open_segments(root: &Path) -> CliResult<Vec<SegmentFiles>> {
    let dir = segments_path(root);
    if !dir.is_dir() {
        return Err(format!("No journal found at {}", root.display()).into());
    }

    let mut segments = Vec::new();
    for base_offset in list_segment_offsets(&dir)? {
        let log = FileBackend::open_read_only(&dir.join(log_file_name(base_offset)))?;
        let index_path = dir.join(index_file_name(base_offset));
        let index = if index_path.exists() {
            Some(FileBackend::open_read_only(&index_path)?)
        } else {
            None
        };
        segments.push(SegmentFiles {
            base_offset,
            log,
            index,
        });
    }
    Ok(segments)
}

/// One-line description of how a segment scan ended.
pub fn describe_end(end: &ScanEnd) -> String {
    match end {
        ScanEnd::Clean => "ok".to_string(),
        ScanEnd::Truncated { position } => format!("truncated at byte {position}"),
        ScanEnd::Corrupt { position, reason } => format!("corrupt at byte {position}: {reason}"),
    }
}
