//! Streaming record scanner.
//!
//! Reads journal records one by one from a segment data file through a
//! bounded buffer. Recovery scans whole segments; reads scan from the
//! nearest index entry.
//!
//! The scanner never fails on damaged data. It stops and reports why in
//! [`ScanEnd`], leaving the decision (truncate, skip, refuse to open) to the
//! caller. Only I/O errors are returned as errors.

use crate::error::{CoreError, CoreResult};
use crate::segment::record::{JournalRecord, RECORD_HEADER_SIZE, RECORD_OVERHEAD};
use logspool_storage::StorageBackend;

/// Read buffer size for streaming iteration.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Why a scan stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEnd {
    /// The data ended exactly on a record boundary.
    Clean,
    /// The data ended inside a record (incomplete header or body).
    Truncated {
        /// Start of the incomplete record.
        position: u64,
    },
    /// A complete record failed validation.
    Corrupt {
        /// Start of the bad record.
        position: u64,
        /// What was wrong with it.
        reason: String,
    },
}

impl ScanEnd {
    /// Returns whether the scan consumed all data.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }
}

/// A record together with its position in the data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedRecord {
    /// Byte position of the record's first byte.
    pub position: u64,
    /// Framed length in bytes.
    pub len: u64,
    /// The decoded record.
    pub record: JournalRecord,
}

/// A streaming scanner over the records of one data file.
pub struct RecordScanner<'a> {
    backend: &'a dyn StorageBackend,
    /// Position of the next record to decode.
    position: u64,
    /// Bytes beyond this position are never read.
    limit: u64,
    buffer: Vec<u8>,
    buffer_pos: usize,
    buffer_len: usize,
    end: Option<ScanEnd>,
}

impl<'a> RecordScanner<'a> {
    /// Creates a scanner starting at `position` and reading up to the
    /// backend's current size.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be determined.
    pub fn new(backend: &'a dyn StorageBackend, position: u64) -> CoreResult<Self> {
        let limit = backend.size()?;
        Ok(Self::with_limit(backend, position, limit))
    }

    /// Creates a scanner that stops at `limit` even if the file is longer.
    #[must_use]
    pub fn with_limit(backend: &'a dyn StorageBackend, position: u64, limit: u64) -> Self {
        Self {
            backend,
            position,
            limit,
            buffer: vec![0u8; READ_BUFFER_SIZE],
            buffer_pos: 0,
            buffer_len: 0,
            end: if position > limit {
                Some(ScanEnd::Clean)
            } else {
                None
            },
        }
    }

    /// Position just past the last record returned.
    ///
    /// After the scan ends this is the length of the valid prefix.
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Why the scan stopped, once it has.
    #[must_use]
    pub const fn end(&self) -> Option<&ScanEnd> {
        self.end.as_ref()
    }

    /// Ensures at least `min_bytes` are buffered from the current position.
    ///
    /// Returns `false` if the data ends first, which includes a file that
    /// shrank underneath the scanner.
    fn ensure_buffered(&mut self, min_bytes: usize) -> CoreResult<bool> {
        let available = self.buffer_len - self.buffer_pos;
        if available >= min_bytes {
            return Ok(true);
        }

        let remaining = self.limit.saturating_sub(self.position);
        if remaining < min_bytes as u64 {
            return Ok(false);
        }

        if self.buffer_pos > 0 && available > 0 {
            self.buffer.copy_within(self.buffer_pos..self.buffer_len, 0);
        }
        self.buffer_len = available;
        self.buffer_pos = 0;

        if min_bytes > self.buffer.len() {
            self.buffer.resize(min_bytes.next_power_of_two(), 0);
        }

        let read_from = self.position + self.buffer_len as u64;
        let wanted = (self.buffer.len() - self.buffer_len)
            .min(usize::try_from(self.limit - read_from).unwrap_or(usize::MAX));
        if wanted > 0 {
            let data = self.backend.read_up_to(read_from, wanted)?;
            self.buffer[self.buffer_len..self.buffer_len + data.len()].copy_from_slice(&data);
            self.buffer_len += data.len();
        }

        Ok(self.buffer_len >= min_bytes)
    }

    fn finish(&mut self, end: ScanEnd) -> CoreResult<Option<ScannedRecord>> {
        self.end = Some(end);
        Ok(None)
    }

    /// Decodes the next record.
    ///
    /// Returns `Ok(None)` once the scan has ended; see [`end`](Self::end).
    ///
    /// # Errors
    ///
    /// Returns an error only for I/O failures.
    pub fn next_record(&mut self) -> CoreResult<Option<ScannedRecord>> {
        if self.end.is_some() {
            return Ok(None);
        }
        let start = self.position;

        if self.buffer_len == self.buffer_pos && !self.ensure_buffered(1)? {
            return self.finish(ScanEnd::Clean);
        }
        if !self.ensure_buffered(RECORD_HEADER_SIZE)? {
            return self.finish(ScanEnd::Truncated { position: start });
        }

        let header = &self.buffer[self.buffer_pos..self.buffer_pos + RECORD_HEADER_SIZE];
        let record_len = JournalRecord::peek_len(header).unwrap_or(0);
        if record_len < RECORD_OVERHEAD {
            return self.finish(ScanEnd::Corrupt {
                position: start,
                reason: format!("declared record length {record_len} is below the framing overhead"),
            });
        }

        if !self.ensure_buffered(record_len)? {
            return self.finish(ScanEnd::Truncated { position: start });
        }

        let bytes = &self.buffer[self.buffer_pos..self.buffer_pos + record_len];
        match JournalRecord::decode(bytes) {
            Ok(record) => {
                self.buffer_pos += record_len;
                self.position += record_len as u64;
                Ok(Some(ScannedRecord {
                    position: start,
                    len: record_len as u64,
                    record,
                }))
            }
            Err(CoreError::ChecksumMismatch { expected, actual }) => self.finish(ScanEnd::Corrupt {
                position: start,
                reason: format!("checksum mismatch: expected {expected:#010x}, got {actual:#010x}"),
            }),
            Err(CoreError::InvalidFormat { message }) => self.finish(ScanEnd::Corrupt {
                position: start,
                reason: message,
            }),
            Err(e) => Err(e),
        }
    }
}

impl Iterator for RecordScanner<'_> {
    type Item = CoreResult<ScannedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => {
                self.end = Some(ScanEnd::Clean);
                Some(Err(e))
            }
        }
    }
}
