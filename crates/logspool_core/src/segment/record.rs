//! Journal record framing.

use crate::error::{CoreError, CoreResult};

/// Format version byte stored in every record.
pub const RECORD_MAGIC: u8 = 1;

/// Header size: record_len (4) + magic (1) + offset (8) + timestamp (8) + key_len (4) = 25
pub const RECORD_HEADER_SIZE: usize = 25;

/// CRC size.
pub const RECORD_CRC_SIZE: usize = 4;

/// Bytes every record spends on framing, independent of key and payload.
pub const RECORD_OVERHEAD: usize = RECORD_HEADER_SIZE + RECORD_CRC_SIZE;

/// Computes the CRC-32 (IEEE) of `data`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// One framed entry as stored in a segment data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalRecord {
    /// Journal offset assigned at append time.
    pub offset: u64,
    /// Append time in milliseconds since the epoch.
    pub timestamp_ms: u64,
    /// Entry key.
    pub key: Vec<u8>,
    /// Entry payload.
    pub payload: Vec<u8>,
}

impl JournalRecord {
    /// Creates a new record.
    #[must_use]
    pub fn new(offset: u64, timestamp_ms: u64, key: Vec<u8>, payload: Vec<u8>) -> Self {
        Self {
            offset,
            timestamp_ms,
            key,
            payload,
        }
    }

    /// Framed size of a record with the given key and payload lengths.
    ///
    /// Returns `None` if the record could never be framed (length overflow).
    #[must_use]
    pub fn encoded_len_for(key_len: usize, payload_len: usize) -> Option<u64> {
        let total = RECORD_OVERHEAD
            .checked_add(key_len)?
            .checked_add(payload_len)?;
        let total = u64::try_from(total).ok()?;
        (total <= u64::from(u32::MAX)).then_some(total)
    }

    /// Returns the encoded size of this record.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        RECORD_OVERHEAD + self.key.len() + self.payload.len()
    }

    /// Encodes the record to bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFormat`] if the record does not fit the
    /// 32-bit length field.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let record_len = Self::encoded_len_for(self.key.len(), self.payload.len())
            .and_then(|len| u32::try_from(len).ok())
            .ok_or_else(|| CoreError::invalid_format("record too large to frame"))?;
        let key_len = u32::try_from(self.key.len())
            .map_err(|_| CoreError::invalid_format("record key too large"))?;

        let mut buf = Vec::with_capacity(record_len as usize);
        buf.extend_from_slice(&record_len.to_le_bytes());
        buf.push(RECORD_MAGIC);
        buf.extend_from_slice(&self.offset.to_le_bytes());
        buf.extend_from_slice(&self.timestamp_ms.to_le_bytes());
        buf.extend_from_slice(&key_len.to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.payload);

        // CRC32 (over everything before it)
        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());

        Ok(buf)
    }

    /// Reads the declared record length from the start of `data`.
    ///
    /// Returns `None` if fewer than four bytes are available.
    #[must_use]
    pub fn peek_len(data: &[u8]) -> Option<usize> {
        let bytes: [u8; 4] = data.get(..4)?.try_into().ok()?;
        Some(u32::from_le_bytes(bytes) as usize)
    }

    /// Decodes one record from the start of `data`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidFormat`] for short input, unknown magic or
    ///   inconsistent lengths
    /// - [`CoreError::ChecksumMismatch`] if the stored CRC does not match
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.len() < RECORD_OVERHEAD {
            return Err(CoreError::invalid_format("record too short"));
        }

        let record_len = Self::peek_len(data)
            .ok_or_else(|| CoreError::invalid_format("record too short"))?;
        if record_len < RECORD_OVERHEAD {
            return Err(CoreError::invalid_format(format!(
                "declared record length {record_len} is below the framing overhead"
            )));
        }
        if data.len() < record_len {
            return Err(CoreError::invalid_format("incomplete record"));
        }

        let crc_start = record_len - RECORD_CRC_SIZE;
        let stored_crc = read_u32(&data[crc_start..record_len]);
        let computed_crc = compute_crc32(&data[..crc_start]);
        if stored_crc != computed_crc {
            return Err(CoreError::ChecksumMismatch {
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        if data[4] != RECORD_MAGIC {
            return Err(CoreError::invalid_format(format!(
                "unknown record magic {}",
                data[4]
            )));
        }

        let offset = read_u64(&data[5..13]);
        let timestamp_ms = read_u64(&data[13..21]);
        let key_len = read_u32(&data[21..25]) as usize;

        let body_len = record_len - RECORD_OVERHEAD;
        if key_len > body_len {
            return Err(CoreError::invalid_format(format!(
                "key length {key_len} exceeds record body of {body_len} bytes"
            )));
        }

        let key_end = RECORD_HEADER_SIZE + key_len;
        let key = data[RECORD_HEADER_SIZE..key_end].to_vec();
        let payload = data[key_end..crc_start].to_vec();

        Ok(Self {
            offset,
            timestamp_ms,
            key,
            payload,
        })
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}
