//! In-memory storage backend for tests.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// An in-memory storage backend.
///
/// Segments built on this backend behave like file-backed ones, which keeps
/// framing and index tests free of temporary directories. Clones share the
/// same buffer, so a test can keep a handle and damage the bytes underneath
/// a segment to simulate a torn write.
///
/// # Example
///
/// ```rust
/// use logspool_storage::{StorageBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::new();
/// let position = backend.append(b"record").unwrap();
/// assert_eq!(position, 0);
/// assert_eq!(backend.size().unwrap(), 6);
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
    syncs: Arc<AtomicU64>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend holding pre-existing bytes, as if recovered from disk.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
            syncs: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns a copy of all stored bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Removes the last `n` bytes, simulating a write cut short by a crash.
    pub fn chop_tail(&self, n: usize) {
        let mut data = self.data.write();
        let keep = data.len().saturating_sub(n);
        data.truncate(keep);
    }

    /// Flips every bit of the byte at `position`.
    pub fn corrupt_byte(&self, position: usize) {
        if let Some(byte) = self.data.write().get_mut(position) {
            *byte ^= 0xFF;
        }
    }

    /// Number of times [`sync`](StorageBackend::sync) has been called.
    #[must_use]
    pub fn sync_count(&self) -> u64 {
        self.syncs.load(Ordering::Relaxed)
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[offset as usize..end as usize].to_vec())
    }

    fn read_up_to(&self, offset: u64, max_len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        if offset >= size {
            return Ok(Vec::new());
        }

        let end = offset.saturating_add(max_len as u64).min(size);
        Ok(data[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, new_data: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(new_data);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.syncs.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;

        if new_size > size {
            return Err(StorageError::TruncatePastEnd {
                requested: new_size,
                size,
            });
        }

        data.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(backend.data().is_empty());
    }

    #[test]
    fn memory_append_returns_position() {
        let mut backend = InMemoryBackend::new();

        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.size().unwrap(), 11);
    }

    #[test]
    fn memory_read_at_extending_past_end_fails() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"hello").unwrap();

        let result = backend.read_at(3, 10);
        assert!(matches!(result, Err(StorageError::ReadPastEnd { .. })));
    }

    #[test]
    fn memory_read_up_to_clamps() {
        let backend = InMemoryBackend::with_data(b"hello world".to_vec());

        assert_eq!(backend.read_up_to(6, 100).unwrap(), b"world");
        assert_eq!(backend.read_up_to(0, 5).unwrap(), b"hello");
        assert!(backend.read_up_to(11, 4).unwrap().is_empty());
    }

    #[test]
    fn clones_share_bytes() {
        let mut backend = InMemoryBackend::new();
        let observer = backend.clone();

        backend.append(b"shared").unwrap();
        assert_eq!(observer.data(), b"shared");

        observer.chop_tail(2);
        assert_eq!(backend.size().unwrap(), 4);
    }

    #[test]
    fn corrupt_byte_flips_bits() {
        let backend = InMemoryBackend::with_data(vec![0x0F, 0x00]);
        backend.corrupt_byte(0);
        backend.corrupt_byte(99);
        assert_eq!(backend.data(), vec![0xF0, 0x00]);
    }

    #[test]
    fn sync_is_counted() {
        let mut backend = InMemoryBackend::new();
        backend.sync().unwrap();
        backend.sync().unwrap();
        assert_eq!(backend.sync_count(), 2);
    }

    #[test]
    fn memory_truncate_partial() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"hello world").unwrap();

        backend.truncate(5).unwrap();
        assert_eq!(backend.read_at(0, 5).unwrap(), b"hello");
        assert!(matches!(
            backend.truncate(100),
            Err(StorageError::TruncatePastEnd { .. })
        ));
    }
}
