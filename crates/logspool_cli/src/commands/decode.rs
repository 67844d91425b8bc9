//! Decode command implementation.

use super::{describe_end, open_segments, CliResult, SegmentFiles};
use logspool_core::segment::{RecordScanner, ScanEnd};
use serde::Serialize;
use std::path::Path;

/// Journal entry representation for output.
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    /// Journal offset.
    pub offset: u64,
    /// Segment holding the entry.
    pub segment: u64,
    /// Byte position in the segment data file.
    pub position: u64,
    /// Append time in milliseconds since the epoch.
    pub timestamp_ms: u64,
    /// Key, as text or hex.
    pub key: String,
    /// Payload, as text or hex.
    pub payload: String,
    /// Payload size in bytes.
    pub payload_size: usize,
}

/// Runs the decode command.
pub fn run(
    path: &Path,
    start_offset: u64,
    limit: Option<usize>,
    hex: bool,
    format: &str,
) -> CliResult<()> {
    let entries = collect(path, start_offset, limit.unwrap_or(usize::MAX), hex)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        _ => {
            print_text_output(&entries);
        }
    }

    Ok(())
}

fn collect(path: &Path, start_offset: u64, limit: usize, hex: bool) -> CliResult<Vec<EntryInfo>> {
    let mut entries = Vec::new();
    let segments = open_segments(path)?;
    let first = first_segment_for(&segments, start_offset);

    for files in &segments[first..] {
        if entries.len() >= limit {
            break;
        }

        let mut scanner = RecordScanner::new(&files.log, 0)?;
        while entries.len() < limit {
            let Some(scanned) = scanner.next_record()? else {
                break;
            };
            let record = scanned.record;
            if record.offset < start_offset {
                continue;
            }
            entries.push(EntryInfo {
                offset: record.offset,
                segment: files.base_offset,
                position: scanned.position,
                timestamp_ms: record.timestamp_ms,
                key: render(&record.key, hex),
                payload: render(&record.payload, hex),
                payload_size: record.payload.len(),
            });
        }

        if let Some(end) = scanner.end() {
            if *end != ScanEnd::Clean {
                tracing::warn!(
                    segment = files.base_offset,
                    "segment {}, skipping the rest of it",
                    describe_end(end)
                );
            }
        }
    }

    Ok(entries)
}

/// Index of the segment that may hold `start_offset`.
///
/// A segment is passed over when the next one starts at or before
/// `start_offset`. The newest segment is never passed over.
fn first_segment_for(segments: &[SegmentFiles], start_offset: u64) -> usize {
    segments
        .windows(2)
        .take_while(|pair| pair[1].base_offset <= start_offset)
        .count()
}

fn render(bytes: &[u8], hex: bool) -> String {
    if hex {
        hex_encode(bytes)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

fn print_text_output(entries: &[EntryInfo]) {
    println!("Journal Entries ({} total)", entries.len());
    println!("================");
    println!();

    for entry in entries {
        println!(
            "[{:08}] ts={} key={} payload={} bytes",
            entry.offset, entry.timestamp_ms, entry.key, entry.payload_size
        );
        println!("           {}", entry.payload);
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
