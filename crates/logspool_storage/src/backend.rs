//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level byte store holding one journal file.
///
/// Every segment of the journal owns two backends: one for its data file and
/// one for its sparse offset index. Backends never interpret the bytes.
///
/// # Invariants
///
/// - `append` returns the position where data was written
/// - `read_at` returns exactly the bytes previously written at that position
/// - `flush` hands buffered bytes to the operating system
/// - `sync` makes every appended byte durable
pub trait StorageBackend: Send + Sync {
    /// Reads exactly `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range extends
    /// beyond the known size, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Reads up to `max_len` bytes starting at `offset`.
    ///
    /// Unlike [`read_at`](Self::read_at) this returns fewer bytes when the
    /// underlying data ends early, which is how readers observe a file that
    /// was cut short by a crash or by external truncation. An offset at or
    /// beyond the end yields an empty buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn read_up_to(&self, offset: u64, max_len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the storage.
    ///
    /// Returns the position where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs or the backend is read-only.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes pending writes to the operating system.
    ///
    /// This does not imply durability across power loss; see
    /// [`sync`](Self::sync).
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size of the storage in bytes.
    ///
    /// This is the position where the next `append` will write.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Syncs all data to durable storage (`fsync`).
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Truncates the storage to `new_size` bytes.
    ///
    /// Used at startup to drop a torn trailing record.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` is greater than the current size or the
    /// truncation fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
