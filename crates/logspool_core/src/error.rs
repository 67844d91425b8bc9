//! Error types for the journal.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for journal operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in journal operations.
///
/// Construction-time failures ([`JournalLocked`](Self::JournalLocked),
/// [`CorruptSegment`](Self::CorruptSegment), [`InvalidConfig`](Self::InvalidConfig))
/// abort [`Journal::open`](crate::Journal::open). Steady-state operations
/// express oversized entries, torn tails and empty retention passes through
/// their return values instead of errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] logspool_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Another process (or another journal in this process) holds the
    /// directory lock.
    #[error("failed to acquire lock on file {}: {source}", path.display())]
    JournalLocked {
        /// Path of the lock file.
        path: PathBuf,
        /// The underlying lock-acquisition failure.
        #[source]
        source: io::Error,
    },

    /// A segment failed structural validation at open.
    #[error("corrupt segment {base_offset:020}: {message}")]
    CorruptSegment {
        /// Base offset of the damaged segment.
        base_offset: u64,
        /// Description of the damage.
        message: String,
    },

    /// Checksum mismatch detected on a record.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Checksum stored in the record.
        expected: u32,
        /// Checksum computed over the record bytes.
        actual: u32,
    },

    /// Bytes that do not form a valid record or index entry.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Configuration rejected by validation.
    #[error("invalid journal configuration: {message}")]
    InvalidConfig {
        /// Which setting is wrong and why.
        message: String,
    },

    /// The journal has been stopped.
    #[error("journal is closed")]
    JournalClosed,
}

impl CoreError {
    /// Creates a corrupt segment error.
    pub fn corrupt_segment(base_offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptSegment {
            base_offset,
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns whether this error reports a held directory lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::JournalLocked { .. })
    }

    /// Returns whether this error reports structural segment damage.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::CorruptSegment { .. } | Self::ChecksumMismatch { .. } | Self::InvalidFormat { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_error_keeps_source() {
        let err = CoreError::JournalLocked {
            path: PathBuf::from("/var/journal/.lock"),
            source: io::Error::new(io::ErrorKind::WouldBlock, "resource busy"),
        };

        assert!(err.is_locked());
        assert!(!err.is_corruption());
        assert!(err.to_string().starts_with("failed to acquire lock on file"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn corrupt_segment_display_pads_offset() {
        let err = CoreError::corrupt_segment(42, "record 3 truncated");
        assert!(err.is_corruption());
        assert_eq!(
            err.to_string(),
            "corrupt segment 00000000000000000042: record 3 truncated"
        );
    }
}
