//! Core type definitions for the journal.

use std::fmt;

/// An entry handed to the journal for writing.
///
/// Keys and payloads are opaque bytes; inputs typically use the message id as
/// key and the raw message as payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Entry key.
    pub key: Vec<u8>,
    /// Entry payload.
    pub payload: Vec<u8>,
}

impl Entry {
    /// Creates a new entry.
    #[must_use]
    pub fn new(key: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            payload: payload.into(),
        }
    }
}

/// An entry returned by a journal read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadEntry {
    /// Journal offset of the entry.
    pub offset: u64,
    /// Entry key.
    pub key: Vec<u8>,
    /// Entry payload.
    pub payload: Vec<u8>,
}

impl ReadEntry {
    /// Returns the journal offset.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Point-in-time description of one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    /// Offset of the first entry; also the segment's identity and file name.
    pub base_offset: u64,
    /// Exclusive upper bound of the offsets stored in the segment.
    pub next_offset: u64,
    /// Size of the data file in bytes.
    pub size: u64,
    /// Creation time in milliseconds since the epoch.
    pub created_at: u64,
    /// Time of the last append in milliseconds since the epoch.
    pub last_modified_at: u64,
    /// Whether the segment is receiving writes.
    pub active: bool,
    /// Whether external tooling reopened the segment for inspection.
    pub reopened: bool,
}

impl SegmentInfo {
    /// Number of entries the segment holds.
    #[must_use]
    pub const fn entry_count(&self) -> u64 {
        self.next_offset.saturating_sub(self.base_offset)
    }

    /// Returns whether `offset` falls inside this segment.
    #[must_use]
    pub const fn contains(&self, offset: u64) -> bool {
        offset >= self.base_offset && offset < self.next_offset
    }
}

/// Lifecycle of a journal instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum JournalState {
    /// Constructed, segment directory not yet recovered.
    Created = 0,
    /// Accepting reads and writes.
    Running = 1,
    /// Shutdown requested; reads return nothing.
    ShuttingDown = 2,
    /// Flushed and closed.
    Stopped = 3,
}

impl JournalState {
    /// Decodes the state from its `repr(u8)` value.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::ShuttingDown,
            _ => Self::Stopped,
        }
    }

    /// Returns the `repr(u8)` value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for JournalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "CREATED",
            Self::Running => "RUNNING",
            Self::ShuttingDown => "SHUTTING_DOWN",
            Self::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}
