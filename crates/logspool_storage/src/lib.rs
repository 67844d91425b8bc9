//! # logspool storage
//!
//! Byte-store backends underneath the logspool message journal.
//!
//! Backends are **opaque byte stores**: they append, read and sync bytes and
//! know nothing about journal records, segments or offset indexes. The
//! journal crate owns every on-disk format.
//!
//! ## Available Backends
//!
//! - [`FileBackend`] - segment data and index files on the local filesystem
//! - [`InMemoryBackend`] - for tests and scratch segments
//!
//! ## Example
//!
//! ```rust
//! use logspool_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let position = backend.append(b"hello journal").unwrap();
//! let data = backend.read_at(position, 13).unwrap();
//! assert_eq!(&data, b"hello journal");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
