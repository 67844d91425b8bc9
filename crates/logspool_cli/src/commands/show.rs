//! Show command implementation.

use super::{describe_end, open_segments, CliResult};
use logspool_core::dir::read_committed_offset;
use logspool_core::segment::{OffsetIndex, Segment};
use serde::Serialize;
use std::path::Path;

/// Journal overview.
#[derive(Debug, Serialize)]
pub struct ShowResult {
    /// Journal directory.
    pub path: String,
    /// Persisted committed read offset.
    pub committed_offset: Option<u64>,
    /// Oldest offset still stored.
    pub log_start_offset: u64,
    /// Offset the next write would get.
    pub log_end_offset: u64,
    /// Sum of all segment data file sizes.
    pub total_size: u64,
    /// Segments, oldest first.
    pub segments: Vec<SegmentSummary>,
}

/// Description of a single segment.
#[derive(Debug, Serialize)]
pub struct SegmentSummary {
    /// Offset of the first entry.
    pub base_offset: u64,
    /// Offset after the last readable entry.
    pub next_offset: u64,
    /// Number of readable entries.
    pub entries: usize,
    /// Data file size in bytes.
    pub size: u64,
    /// Bytes up to the end of the last readable entry.
    pub valid_size: u64,
    /// Timestamp of the first entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_timestamp: Option<u64>,
    /// Timestamp of the last entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_timestamp: Option<u64>,
    /// Number of offset index entries.
    pub index_entries: usize,
    /// How the scan ended.
    pub status: String,
}

/// Runs the show command.
pub fn run(path: &Path, format: &str) -> CliResult<()> {
    let result = collect(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn collect(path: &Path) -> CliResult<ShowResult> {
    let mut segments = Vec::new();
    for files in open_segments(path)? {
        let scan = Segment::scan(files.base_offset, &files.log)?;
        let index_entries = match &files.index {
            Some(index) => OffsetIndex::read_entries(index)?.len(),
            None => 0,
        };
        segments.push(SegmentSummary {
            base_offset: files.base_offset,
            next_offset: scan.next_offset,
            entries: scan.record_count(),
            size: scan.file_len,
            valid_size: scan.valid_len,
            first_timestamp: scan.first_timestamp,
            last_timestamp: scan.last_timestamp,
            index_entries,
            status: describe_end(&scan.end),
        });
    }

    Ok(ShowResult {
        path: path.display().to_string(),
        committed_offset: read_committed_offset(path)?,
        log_start_offset: segments.first().map_or(0, |s| s.base_offset),
        log_end_offset: segments.last().map_or(0, |s| s.next_offset),
        total_size: segments.iter().map(|s| s.size).sum(),
        segments,
    })
}

fn print_text_output(result: &ShowResult) {
    println!("Journal: {}", result.path);
    println!("================");
    println!();
    println!("Log start offset: {}", result.log_start_offset);
    println!("Log end offset:   {}", result.log_end_offset);
    match result.committed_offset {
        Some(offset) => println!("Committed offset: {offset}"),
        None => println!("Committed offset: none"),
    }
    println!("Total size:       {} bytes", result.total_size);
    println!();

    println!("Segments ({} total)", result.segments.len());
    println!("------------------");
    for segment in &result.segments {
        println!(
            "[{:020}] next={} entries={} size={} index={} {}",
            segment.base_offset,
            segment.next_offset,
            segment.entries,
            segment.size,
            segment.index_entries,
            segment.status
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::write_journal;
    use tempfile::tempdir;

    #[test]
    fn collect_describes_segments() {
        let temp = tempdir().unwrap();
        write_journal(temp.path(), 25);

        let result = collect(temp.path()).unwrap();
        assert_eq!(result.committed_offset, Some(4));
        assert_eq!(result.log_start_offset, 0);
        assert_eq!(result.log_end_offset, 25);
        assert_eq!(result.total_size, 2500);

        let bases: Vec<u64> = result.segments.iter().map(|s| s.base_offset).collect();
        assert_eq!(bases, vec![0, 10, 20]);
        assert!(result.segments.iter().all(|s| s.status == "ok"));
        assert_eq!(result.segments[2].entries, 5);
    }

    #[test]
    fn collect_requires_journal() {
        let temp = tempdir().unwrap();
        assert!(collect(temp.path()).is_err());
    }
}
