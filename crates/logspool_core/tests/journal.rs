//! Integration tests for the journal: rolling, retention, throttling and
//! recovery from damaged segment files.

use logspool_core::dir::segments_path;
use logspool_core::segment::log_file_name;
use logspool_core::{
    CoreError, Entry, Journal, JournalConfig, JournalState, Lifecycle, ManualClock,
    RecordingActivityWriter, RecoveryMode, RetentionCause,
};
use proptest::prelude::*;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

/// 4-byte key + 67-byte payload + 29 bytes of framing.
const ENTRY_SIZE: u64 = 100;

fn config(path: &Path) -> JournalConfig {
    JournalConfig::new(
        path,
        1000,
        Duration::from_secs(3600),
        100_000,
        Duration::from_secs(86_400),
        1_000_000,
        Duration::from_secs(60),
        0,
    )
}

fn open(config: JournalConfig, clock: &Arc<ManualClock>) -> Journal {
    Journal::builder(config)
        .clock(Arc::clone(clock) as Arc<dyn logspool_core::Clock>)
        .open()
        .unwrap()
}

fn entry(i: u64) -> Entry {
    Entry::new(format!("{i:04}"), format!("{i:067}"))
}

fn write_entries(journal: &Journal, range: std::ops::Range<u64>) {
    let entries: Vec<Entry> = range.map(entry).collect();
    assert_eq!(journal.write_batch(&entries).unwrap(), entries.len());
}

fn bases(journal: &Journal) -> Vec<u64> {
    journal.segments().iter().map(|s| s.base_offset).collect()
}

fn truncate_log_file(root: &Path, base_offset: u64, len: u64) {
    let path = segments_path(root).join(log_file_name(base_offset));
    let file = OpenOptions::new().write(true).open(path).unwrap();
    file.set_len(len).unwrap();
}

fn offsets(entries: &[logspool_core::ReadEntry]) -> Vec<u64> {
    entries.iter().map(|e| e.offset).collect()
}

#[test]
fn segments_roll_every_ten_entries() {
    let temp = tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    let journal = open(config(temp.path()), &clock);

    write_entries(&journal, 0..25);

    assert_eq!(bases(&journal), vec![0, 10, 20]);
    assert_eq!(journal.size(), 25 * ENTRY_SIZE);
    assert_eq!(journal.log_end_offset(), 25);
    assert_eq!(journal.stats().segments_rolled, 2);

    let segments = journal.segments();
    assert!(segments[..2].iter().all(|s| !s.active && s.size == 1000));
    assert!(segments[2].active);
}

#[test]
fn size_retention_removes_oldest_segments() {
    for (budget, expected) in [(2500, 1), (1000, 2)] {
        let temp = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let mut cfg = config(temp.path());
        cfg.max_total_size = budget;
        let journal = open(cfg, &clock);

        write_entries(&journal, 0..30);
        assert_eq!(journal.number_of_segments(), 3);

        assert_eq!(journal.run_retention().unwrap(), expected, "budget {budget}");
        assert_eq!(journal.number_of_segments(), 3 - expected);
        assert_eq!(journal.log_start_offset(), 10 * expected as u64);
    }
}

#[test]
fn age_retention_removes_closed_segments() {
    let temp = tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    let mut cfg = config(temp.path());
    cfg.max_total_age = Duration::from_secs(600);
    let journal = open(cfg, &clock);

    write_entries(&journal, 0..30);

    clock.advance(Duration::from_secs(599));
    assert_eq!(journal.run_retention().unwrap(), 0);

    clock.advance(Duration::from_secs(2));
    assert_eq!(journal.run_retention().unwrap(), 2);
    assert_eq!(bases(&journal), vec![20]);
}

#[test]
fn commit_retention_follows_committed_offset() {
    let temp = tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    let journal = open(config(temp.path()), &clock);

    write_entries(&journal, 0..30);

    for (committed, expected) in [(5, 0), (10, 1), (25, 1), (1000, 0)] {
        journal.mark_journal_offset_committed(committed);
        assert_eq!(
            journal.run_retention().unwrap(),
            expected,
            "committed {committed}"
        );
    }
    assert_eq!(bases(&journal), vec![20]);
}

#[test]
fn write_read_commit_and_clean_up() {
    let temp = tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    let journal = open(config(temp.path()), &clock);

    write_entries(&journal, 0..25);

    let read = journal.read(16).unwrap();
    assert_eq!(offsets(&read), (0..16).collect::<Vec<_>>());
    assert_eq!(read[3].key, b"0003");
    assert_eq!(read[3].payload, format!("{:067}", 3).into_bytes());

    journal.mark_journal_offset_committed(15);
    assert_eq!(journal.run_retention().unwrap(), 1);
    assert_eq!(bases(&journal), vec![10, 20]);

    let rest = journal.read(100).unwrap();
    assert_eq!(offsets(&rest), (16..25).collect::<Vec<_>>());
    assert!(!segments_path(temp.path())
        .join(log_file_name(0))
        .exists());
}

#[test]
fn throttles_when_full_and_recovers_after_commit() {
    let temp = tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    let mut cfg = config(temp.path());
    cfg.max_total_size = 4000;
    cfg.throttle_threshold_percent = 90;
    let journal = open(cfg, &clock);
    let status = Arc::clone(journal.server_status());
    assert_eq!(status.lifecycle(), Lifecycle::Running);

    write_entries(&journal, 0..40);
    assert_eq!(journal.number_of_segments(), 4);
    assert!((journal.journal_utilization() - 1.0).abs() < f64::EPSILON);

    assert_eq!(journal.run_retention().unwrap(), 0);
    assert_eq!(status.lifecycle(), Lifecycle::Throttled);

    journal.mark_journal_offset_committed(30);
    assert_eq!(journal.run_retention().unwrap(), 3);
    assert_eq!(status.lifecycle(), Lifecycle::Running);
    assert!((journal.journal_utilization() - 0.25).abs() < f64::EPSILON);

    let state = journal.throttle_state();
    assert_eq!(state.uncommitted_entries, 9);
    assert_eq!(state.segment_count, 1);
    assert_eq!(state.committed_offset, Some(30));
}

#[test]
fn reader_skips_damaged_segment_while_running() {
    let temp = tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    let journal = open(config(temp.path()), &clock);

    write_entries(&journal, 0..15);
    truncate_log_file(temp.path(), 0, 850);

    let read = journal.read(100).unwrap();
    let expected: Vec<u64> = (0..8).chain(10..15).collect();
    assert_eq!(offsets(&read), expected);
    assert_eq!(journal.next_read_offset(), 15);
}

#[test]
fn reopen_trims_torn_tail_of_last_segment() {
    let temp = tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    {
        let journal = open(config(temp.path()), &clock);
        write_entries(&journal, 0..15);
        journal.close().unwrap();
    }
    truncate_log_file(temp.path(), 10, 450);

    let journal = open(config(temp.path()), &clock);
    assert_eq!(journal.log_end_offset(), 14);
    assert_eq!(journal.size(), 1400);
    assert_eq!(journal.write(b"0014", b"again").unwrap(), Some(14));

    let read = journal.read_at(10, 100).unwrap();
    assert_eq!(offsets(&read), vec![10, 11, 12, 13, 14]);
    assert_eq!(read[4].payload, b"again");
}

#[test]
fn reopen_trims_corrupt_last_record_of_last_segment() {
    let temp = tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    {
        let journal = open(config(temp.path()), &clock);
        write_entries(&journal, 0..15);
        journal.close().unwrap();
    }
    let path = segments_path(temp.path()).join(log_file_name(10));
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&path, bytes).unwrap();

    let journal = open(config(temp.path()), &clock);
    assert_eq!(journal.log_end_offset(), 14);
    assert_eq!(journal.size(), 1400);
    assert_eq!(journal.write(b"0014", b"again").unwrap(), Some(14));

    let read = journal.read_at(10, 100).unwrap();
    assert_eq!(offsets(&read), vec![10, 11, 12, 13, 14]);
    assert_eq!(read[4].payload, b"again");
}

#[test]
fn damaged_closed_segment_depends_on_recovery_mode() {
    let temp = tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    {
        let journal = open(config(temp.path()), &clock);
        write_entries(&journal, 0..15);
        journal.close().unwrap();
    }
    truncate_log_file(temp.path(), 0, 850);

    let err = Journal::builder(config(temp.path()))
        .clock(Arc::clone(&clock) as Arc<dyn logspool_core::Clock>)
        .open()
        .unwrap_err();
    assert!(matches!(err, CoreError::CorruptSegment { base_offset: 0, .. }));

    let journal = open(
        config(temp.path()).recovery_mode(RecoveryMode::BestEffort),
        &clock,
    );
    assert_eq!(bases(&journal), vec![0, 10]);
    let read = journal.read(100).unwrap();
    let expected: Vec<u64> = (0..8).chain(10..15).collect();
    assert_eq!(offsets(&read), expected);
}

#[test]
fn shutdown_ends_reads() {
    let temp = tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    let journal = open(config(temp.path()), &clock);
    write_entries(&journal, 0..5);

    journal.trigger_shutdown();
    assert_eq!(journal.state(), JournalState::ShuttingDown);
    assert!(journal.read(10).unwrap().is_empty());

    journal.close().unwrap();
    assert_eq!(journal.state(), JournalState::Stopped);
    assert!(matches!(
        journal.write(b"late", b"entry"),
        Err(CoreError::JournalClosed)
    ));
}

#[test]
fn second_open_of_same_directory_is_locked() {
    let temp = tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    let _journal = open(config(temp.path()), &clock);

    let err = Journal::open(config(temp.path())).unwrap_err();
    assert!(err.is_locked());
}

#[test]
fn committed_offset_survives_reopen() {
    let temp = tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    {
        let journal = open(config(temp.path()), &clock);
        write_entries(&journal, 0..15);
        assert_eq!(journal.read(13).unwrap().len(), 13);
        journal.mark_journal_offset_committed(12);
        journal.close().unwrap();
    }

    let journal = open(config(temp.path()), &clock);
    assert_eq!(journal.committed_offset(), Some(12));
    assert_eq!(journal.next_read_offset(), 13);
    assert_eq!(offsets(&journal.read(10).unwrap()), vec![13, 14]);
}

#[test]
fn read_of_zero_entries_returns_one() {
    let temp = tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    let journal = open(config(temp.path()), &clock);
    write_entries(&journal, 0..3);

    assert_eq!(offsets(&journal.read(0).unwrap()), vec![0]);
}

#[test]
fn oversized_entries_are_dropped() {
    let temp = tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    let mut cfg = config(temp.path());
    cfg.max_message_size = 150;
    let journal = open(cfg, &clock);

    assert_eq!(journal.write(b"big", &[7u8; 200]).unwrap(), None);
    assert_eq!(journal.write(b"0000", &[1u8; 67]).unwrap(), Some(0));
    assert_eq!(journal.write(b"huge", &[0u8; 5000]).unwrap(), None);

    let stats = journal.stats();
    assert_eq!(stats.entries_written, 1);
    assert_eq!(stats.entries_dropped, 2);
    assert_eq!(journal.log_end_offset(), 1);
}

#[test]
fn retention_reports_activity() {
    let temp = tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    let writer = Arc::new(RecordingActivityWriter::new());
    let journal = Journal::builder(config(temp.path()))
        .clock(Arc::clone(&clock) as Arc<dyn logspool_core::Clock>)
        .activity_writer(Arc::clone(&writer) as Arc<dyn logspool_core::ActivityWriter>)
        .open()
        .unwrap();

    write_entries(&journal, 0..30);
    assert_eq!(journal.run_retention().unwrap(), 0);
    assert!(writer.activities().is_empty());

    journal.mark_journal_offset_committed(20);
    assert_eq!(journal.run_retention().unwrap(), 2);

    let activities = writer.activities();
    assert_eq!(activities.len(), 1);
    assert_eq!(
        activities[0].message,
        "Removed 2 journal segment(s) by retention: [0, 10]"
    );
    assert!(activities[0]
        .removed
        .iter()
        .all(|c| c.causes.contains(&RetentionCause::Committed)));
}

#[test]
fn reopened_segment_blocks_size_retention_until_committed() {
    let temp = tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    let mut cfg = config(temp.path());
    cfg.max_total_size = 1000;
    let journal = open(cfg, &clock);

    write_entries(&journal, 0..30);
    assert!(journal.set_segment_reopened(0, true));

    assert_eq!(journal.run_retention().unwrap(), 0);
    assert_eq!(bases(&journal), vec![0, 10, 20]);

    journal.mark_journal_offset_committed(10);
    assert_eq!(journal.run_retention().unwrap(), 2);
    assert_eq!(bases(&journal), vec![20]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn entries_read_back_in_write_order(
        batch in prop::collection::vec(
            (
                prop::collection::vec(any::<u8>(), 0..16),
                prop::collection::vec(any::<u8>(), 0..300),
            ),
            1..40,
        )
    ) {
        let temp = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let journal = open(config(temp.path()), &clock);

        let entries: Vec<Entry> = batch
            .iter()
            .map(|(key, payload)| Entry::new(key.clone(), payload.clone()))
            .collect();
        prop_assert_eq!(journal.write_batch(&entries).unwrap(), entries.len());

        let read = journal.read(entries.len()).unwrap();
        prop_assert_eq!(read.len(), entries.len());
        for (i, (got, want)) in read.iter().zip(&entries).enumerate() {
            prop_assert_eq!(got.offset, i as u64);
            prop_assert_eq!(&got.key, &want.key);
            prop_assert_eq!(&got.payload, &want.payload);
        }
        prop_assert!(journal.segments().iter().all(|s| s.size <= 1000));
    }
}

#[test]
fn concurrent_writers_get_distinct_offsets() {
    const WRITERS: u64 = 4;
    const PER_WRITER: u64 = 50;

    let temp = tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    let journal = open(config(temp.path()), &clock);

    let mut assigned: Vec<u64> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..WRITERS)
            .map(|w| {
                let journal = &journal;
                s.spawn(move || {
                    (0..PER_WRITER)
                        .map(|i| {
                            let e = entry(w * PER_WRITER + i);
                            journal.write(&e.key, &e.payload).unwrap().unwrap()
                        })
                        .collect::<Vec<u64>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });
    assigned.sort_unstable();

    let total = WRITERS * PER_WRITER;
    assert_eq!(assigned, (0..total).collect::<Vec<_>>());
    assert_eq!(journal.log_end_offset(), total);
    assert_eq!(journal.size(), total * ENTRY_SIZE);

    let read = journal.read_at(0, 1000).unwrap();
    assert_eq!(offsets(&read), (0..total).collect::<Vec<_>>());

    std::thread::scope(|s| {
        for t in 0..8u64 {
            let journal = &journal;
            s.spawn(move || {
                for i in 0..25u64 {
                    journal.mark_journal_offset_committed((i * 8 + t) % 150);
                }
            });
        }
    });
    assert_eq!(journal.committed_offset(), Some(149));
}
