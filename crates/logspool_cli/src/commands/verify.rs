//! Verify command implementation.

use super::{describe_end, open_segments, CliResult};
use logspool_core::segment::{OffsetIndex, RecordScanner, Segment};
use logspool_storage::StorageBackend;
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of segments checked.
    pub segments_checked: usize,
    /// Number of readable records.
    pub valid_records: usize,
    /// Number of index entries checked.
    pub index_entries_checked: usize,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> CliResult<()> {
    println!("Verifying journal at {:?}", path);
    println!();

    let result = verify(path)?;

    println!("Segments checked:      {}", result.segments_checked);
    println!("Valid records:         {}", result.valid_records);
    println!("Index entries checked: {}", result.index_entries_checked);
    for error in &result.errors {
        println!("  - {error}");
    }

    println!();
    if result.is_ok() {
        println!("✓ Journal verification passed");
        Ok(())
    } else {
        println!("✗ Journal verification failed");
        Err("Verification failed".into())
    }
}

fn verify(path: &Path) -> CliResult<VerifyResult> {
    let mut result = VerifyResult::default();
    let mut previous_end: Option<u64> = None;

    for files in open_segments(path)? {
        let base = files.base_offset;
        result.segments_checked += 1;

        let scan = Segment::scan(base, &files.log)?;
        result.valid_records += scan.record_count();
        if !scan.end.is_clean() {
            result
                .errors
                .push(format!("segment {base:020}: {}", describe_end(&scan.end)));
        }

        if let Some(end) = previous_end {
            if base < end {
                result.errors.push(format!(
                    "segment {base:020}: overlaps the previous segment, which ends at offset {end}"
                ));
            }
        }
        previous_end = Some(scan.next_offset);

        if let Some(index) = &files.index {
            verify_index(base, index, &files.log, scan.valid_len, &mut result)?;
        }
    }

    Ok(result)
}

fn verify_index(
    base: u64,
    index: &dyn StorageBackend,
    log: &dyn StorageBackend,
    valid_len: u64,
    result: &mut VerifyResult,
) -> CliResult<()> {
    let entries = match OffsetIndex::read_entries(index) {
        Ok(entries) => entries,
        Err(e) => {
            result.errors.push(format!("index {base:020}: {e}"));
            return Ok(());
        }
    };

    let mut previous = None;
    for entry in entries {
        result.index_entries_checked += 1;

        if let Some((rel, pos)) = previous {
            if entry.relative_offset <= rel || entry.position <= pos {
                result.errors.push(format!(
                    "index {base:020}: entry ({}, {}) is not after ({rel}, {pos})",
                    entry.relative_offset, entry.position
                ));
            }
        }
        previous = Some((entry.relative_offset, entry.position));

        if entry.position >= valid_len {
            result.errors.push(format!(
                "index {base:020}: entry for offset {} points past the valid data at byte {}",
                base + u64::from(entry.relative_offset),
                entry.position
            ));
            continue;
        }

        let mut scanner = RecordScanner::with_limit(log, entry.position, valid_len);
        let expected = base + u64::from(entry.relative_offset);
        match scanner.next_record() {
            Ok(Some(scanned)) if scanned.record.offset == expected => {}
            Ok(Some(scanned)) => result.errors.push(format!(
                "index {base:020}: byte {} holds offset {}, expected {expected}",
                entry.position, scanned.record.offset
            )),
            Ok(None) | Err(_) => result.errors.push(format!(
                "index {base:020}: no record at byte {} for offset {expected}",
                entry.position
            )),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::write_journal;
    use logspool_core::dir::segments_path;
    use logspool_core::segment::log_file_name;
    use std::fs::OpenOptions;
    use tempfile::tempdir;

    #[test]
    fn clean_journal_passes() {
        let temp = tempdir().unwrap();
        write_journal(temp.path(), 25);

        let result = verify(temp.path()).unwrap();
        assert!(result.is_ok(), "{:?}", result.errors);
        assert_eq!(result.segments_checked, 3);
        assert_eq!(result.valid_records, 25);
    }

    #[test]
    fn truncated_segment_fails() {
        let temp = tempdir().unwrap();
        write_journal(temp.path(), 25);

        let log = segments_path(temp.path()).join(log_file_name(10));
        OpenOptions::new()
            .write(true)
            .open(log)
            .unwrap()
            .set_len(550)
            .unwrap();

        let result = verify(temp.path()).unwrap();
        assert!(!result.is_ok());
        assert_eq!(result.valid_records, 20);
        assert!(result.errors[0].contains("truncated at byte 500"));
    }
}
