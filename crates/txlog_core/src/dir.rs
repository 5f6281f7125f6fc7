//! Log directory management.
//!
//! This module handles the file system layout for a txlog directory:
//!
//! ```text
//! <dir>/
//! ├─ LOCK              # Advisory lock for single-process recovery
//! ├─ INDEX             # Ordered list of live log files
//! └─ log-000001.bin    # Numbered log files
//! ```
//!
//! The LOCK file ensures only one process recovers or writes the logs at a
//! time. The INDEX file persists the file ordering across restarts.

use crate::error::{CoreError, CoreResult};
use crate::event::{decode_log_header, LOG_HEADER_SIZE, LOG_IN_USE_FLAG};
use crate::index::LogIndex;
use fs2::FileExt;
use txlog_storage::{FileBackend, StorageBackend};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// File names within the log directory.
const LOCK_FILE: &str = "LOCK";
const INDEX_FILE: &str = "INDEX";
/// Temporary file for atomic index writes.
const INDEX_TEMP: &str = "INDEX.tmp";

/// Manages the log directory structure and file locking.
///
/// # Thread Safety
///
/// The `LogDir` holds an exclusive lock on the directory. Only one
/// `LogDir` instance can exist per directory at a time, which is what
/// lets recovery assume no concurrent writer.
#[derive(Debug)]
pub struct LogDir {
    /// Root directory path.
    path: PathBuf,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
}

impl LogDir {
    /// Opens or creates a log directory.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the log directory
    /// * `create_if_missing` - If true, creates the directory if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `LogDirLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_format(format!(
                    "log directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        // Acquire exclusive lock
        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::LogDirLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the log directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path to the INDEX file.
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.path.join(INDEX_FILE)
    }

    /// Returns the path to a named log file.
    #[must_use]
    pub fn log_file_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Returns the conventional name for a numbered log file.
    ///
    /// Sequence 1 produces `log-000001.bin`.
    #[must_use]
    pub fn log_file_name(sequence: u64) -> String {
        format!("log-{sequence:06}.bin")
    }

    /// Loads the index from disk.
    ///
    /// A missing index file is an empty index (new directory); a present
    /// but unreadable index is an error the recovery driver treats as
    /// fatal.
    pub fn load_index(&self) -> CoreResult<LogIndex> {
        let index_path = self.index_path();

        if !index_path.exists() {
            return Ok(LogIndex::new());
        }

        let mut file = File::open(&index_path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        if data.is_empty() {
            return Ok(LogIndex::new());
        }

        LogIndex::decode(&data)
    }

    /// Saves the index to disk atomically.
    ///
    /// Uses write-then-rename for crash safety:
    /// 1. Write to temporary file
    /// 2. Sync temporary file to disk
    /// 3. Rename temporary file to INDEX
    /// 4. Fsync the directory to make the rename durable
    pub fn save_index(&self, index: &LogIndex) -> CoreResult<()> {
        let index_path = self.index_path();
        let temp_path = self.path.join(INDEX_TEMP);

        let data = index.encode();
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &index_path)?;
        self.sync_directory()?;

        Ok(())
    }

    /// Deletes a log file and makes the deletion durable.
    ///
    /// Deleting a file that is already gone is not an error: recovery may
    /// be re-run after a crash that interrupted an earlier deletion pass.
    pub fn delete_log_file(&self, name: &str) -> CoreResult<()> {
        let path = self.log_file_path(name);
        if path.exists() {
            fs::remove_file(&path)?;
            self.sync_directory()?;
        }
        Ok(())
    }

    /// Truncates a log file to `valid_pos` bytes.
    ///
    /// `original_size` is the size recorded when the file was scanned; a
    /// mismatch means the file changed under recovery and the truncation
    /// is refused. When `clear_in_use` is set, the in-use header flag is
    /// also cleared - callers pass false when the file is the active
    /// write target.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, its size does not match
    /// `original_size`, `valid_pos` would cut into the header, or I/O
    /// fails.
    pub fn truncate_log_file(
        &self,
        name: &str,
        valid_pos: u64,
        original_size: u64,
        clear_in_use: bool,
    ) -> CoreResult<()> {
        let path = self.log_file_path(name);
        let mut backend = FileBackend::open_existing(&path)?;

        let size = backend.size()?;
        if size != original_size {
            return Err(CoreError::invalid_operation(format!(
                "{name} is {size} bytes, expected {original_size}; refusing to truncate"
            )));
        }
        if valid_pos < LOG_HEADER_SIZE as u64 || valid_pos > size {
            return Err(CoreError::invalid_operation(format!(
                "truncation target {valid_pos} outside {name} (size {size})"
            )));
        }

        backend.truncate(valid_pos)?;

        if clear_in_use {
            let header = backend.read_at(0, LOG_HEADER_SIZE)?;
            let flags = decode_log_header(&header)? & !LOG_IN_USE_FLAG;
            backend.write_at(6, &flags.to_be_bytes())?;
            backend.sync()?;
        }

        Ok(())
    }

    /// Syncs the log directory so metadata updates survive a crash.
    ///
    /// On Windows, directory fsync is not supported in the same way as
    /// Unix; NTFS journaling provides the equivalent metadata durability,
    /// so the explicit fsync is skipped there.
    #[cfg(unix)]
    fn sync_directory(&self) -> CoreResult<()> {
        let dir = File::open(&self.path)?;
        dir.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> CoreResult<()> {
        Ok(())
    }
}
