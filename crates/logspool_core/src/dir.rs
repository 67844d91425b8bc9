//! Journal directory management.
//!
//! This module handles the file system layout of a journal:
//!
//! ```text
//! <journal_dir>/
//! ├─ .lock                      # Advisory lock for single-owner access
//! ├─ committed-read-offset      # Last committed offset (ASCII decimal)
//! └─ messagejournal-0/          # Segment log
//!    ├─ 00000000000000000000.log
//!    └─ 00000000000000000000.index
//! ```
//!
//! The lock file ensures only one journal instance owns the directory at a
//! time. It is held for the lifetime of [`JournalDir`].

use crate::error::{CoreError, CoreResult};
use crate::segment::{
    index_file_name, log_file_name, parse_log_file_name, DELETED_FILE_SUFFIX,
};
use fs2::FileExt;
use logspool_storage::FileBackend;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// File names within the journal directory.
const LOCK_FILE: &str = ".lock";
const COMMITTED_OFFSET_FILE: &str = "committed-read-offset";
const COMMITTED_OFFSET_TEMP: &str = "committed-read-offset.tmp";
/// Directory holding the segment files.
const SEGMENTS_DIR: &str = "messagejournal-0";

/// Returns the segment directory of the journal rooted at `root`.
#[must_use]
pub fn segments_path(root: &Path) -> PathBuf {
    root.join(SEGMENTS_DIR)
}

/// Lists the base offsets of all segment data files in `segments_dir`,
/// in ascending order.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn list_segment_offsets(segments_dir: &Path) -> CoreResult<Vec<u64>> {
    let mut offsets = Vec::new();
    for entry in fs::read_dir(segments_dir)? {
        let entry = entry?;
        if let Some(base) = entry.file_name().to_str().and_then(parse_log_file_name) {
            offsets.push(base);
        }
    }
    offsets.sort_unstable();
    Ok(offsets)
}

/// Reads the committed offset file of the journal rooted at `root`.
///
/// A missing file yields `None`. So does a file that does not hold a
/// decimal offset; that case is logged.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn read_committed_offset(root: &Path) -> CoreResult<Option<u64>> {
    let path = root.join(COMMITTED_OFFSET_FILE);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match text.trim().parse::<u64>() {
        Ok(offset) => Ok(Some(offset)),
        Err(_) => {
            tracing::warn!(
                path = %path.display(),
                "ignoring committed offset file with invalid contents"
            );
            Ok(None)
        }
    }
}

/// Owns a journal directory and its lock.
///
/// # Thread Safety
///
/// The `JournalDir` holds an exclusive lock on the directory. Only one
/// `JournalDir` can exist per directory at a time, including within one
/// process.
#[derive(Debug)]
pub struct JournalDir {
    /// Root directory path.
    path: PathBuf,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
}

impl JournalDir {
    /// Opens or creates a journal directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The path exists but is not a directory
    /// - Another owner holds the lock (returns `JournalLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path) -> CoreResult<Self> {
        if path.exists() && !path.is_dir() {
            return Err(CoreError::invalid_config(format!(
                "journal path is not a directory: {}",
                path.display()
            )));
        }
        fs::create_dir_all(path)?;

        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if let Err(source) = lock_file.try_lock_exclusive() {
            return Err(CoreError::JournalLocked {
                path: lock_path,
                source,
            });
        }

        fs::create_dir_all(segments_path(path))?;

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the lock file path.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.path.join(LOCK_FILE)
    }

    /// Returns the segment directory.
    #[must_use]
    pub fn segments_dir(&self) -> PathBuf {
        segments_path(&self.path)
    }

    /// Returns the data file path of a segment.
    #[must_use]
    pub fn log_path(&self, base_offset: u64) -> PathBuf {
        self.segments_dir().join(log_file_name(base_offset))
    }

    /// Returns the index file path of a segment.
    #[must_use]
    pub fn index_path(&self, base_offset: u64) -> PathBuf {
        self.segments_dir().join(index_file_name(base_offset))
    }

    /// Lists the base offsets of the segments on disk, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment directory cannot be read.
    pub fn segment_offsets(&self) -> CoreResult<Vec<u64>> {
        list_segment_offsets(&self.segments_dir())
    }

    /// Opens (creating if needed) the data and index files of a segment.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be opened.
    pub fn open_segment_files(&self, base_offset: u64) -> CoreResult<(FileBackend, FileBackend)> {
        let log = FileBackend::open(&self.log_path(base_offset))?;
        let index = FileBackend::open(&self.index_path(base_offset))?;
        Ok((log, index))
    }

    /// Last-modified time of a segment data file in milliseconds since the
    /// epoch, or `None` if the platform cannot report it.
    #[must_use]
    pub fn log_modified_ms(&self, base_offset: u64) -> Option<u64> {
        fs::metadata(self.log_path(base_offset))
            .and_then(|m| m.modified())
            .ok()
            .map(crate::clock::system_time_millis)
    }

    /// Renames both files of a segment to their `.deleted` names.
    ///
    /// If the second rename fails the first is undone, so a segment is
    /// either fully marked or untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if a rename fails.
    pub fn mark_segment_deleted(&self, base_offset: u64) -> CoreResult<Vec<PathBuf>> {
        let log = self.log_path(base_offset);
        let index = self.index_path(base_offset);
        let log_deleted = deleted_name(&log);
        let index_deleted = deleted_name(&index);

        fs::rename(&log, &log_deleted)?;
        if index.exists() {
            if let Err(e) = fs::rename(&index, &index_deleted) {
                if let Err(undo) = fs::rename(&log_deleted, &log) {
                    tracing::error!(
                        path = %log_deleted.display(),
                        error = %undo,
                        "failed to restore segment file after aborted delete"
                    );
                }
                return Err(e.into());
            }
            Ok(vec![log_deleted, index_deleted])
        } else {
            Ok(vec![log_deleted])
        }
    }

    /// Unlinks files previously marked by
    /// [`mark_segment_deleted`](Self::mark_segment_deleted).
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be removed or the directory cannot
    /// be synced.
    pub fn remove_marked(&self, paths: &[PathBuf]) -> CoreResult<()> {
        for path in paths {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.sync_segments_directory()
    }

    /// Removes `.deleted` files left behind by an interrupted removal.
    ///
    /// Returns the number of files removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment directory cannot be read or a file
    /// cannot be removed.
    pub fn clean_deleted_files(&self) -> CoreResult<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(self.segments_dir())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(DELETED_FILE_SUFFIX) {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, "cleaned up files from an interrupted segment removal");
            self.sync_segments_directory()?;
        }
        Ok(removed)
    }

    /// Loads the committed offset, if one was saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load_committed_offset(&self) -> CoreResult<Option<u64>> {
        read_committed_offset(&self.path)
    }

    /// Saves the committed offset atomically.
    ///
    /// Uses write-then-rename pattern for crash safety:
    /// 1. Write to temporary file
    /// 2. Sync temporary file to disk
    /// 3. Rename temporary file over the committed offset file
    /// 4. Fsync the directory to ensure the rename is durable
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails.
    pub fn save_committed_offset(&self, offset: u64) -> CoreResult<()> {
        let path = self.path.join(COMMITTED_OFFSET_FILE);
        let temp_path = self.path.join(COMMITTED_OFFSET_TEMP);

        let mut file = File::create(&temp_path)?;
        file.write_all(offset.to_string().as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &path)?;
        sync_directory(&self.path)
    }

    /// Syncs the segment directory so file creations and removals are
    /// durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be synced.
    pub fn sync_segments_directory(&self) -> CoreResult<()> {
        sync_directory(&self.segments_dir())
    }
}

fn deleted_name(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(DELETED_FILE_SUFFIX);
    PathBuf::from(name)
}

#[cfg(unix)]
fn sync_directory(path: &Path) -> CoreResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_path: &Path) -> CoreResult<()> {
    // NTFS journals metadata; directories cannot be fsynced on Windows.
    Ok(())
}
