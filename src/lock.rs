//! Data directory locking and atomic file replacement.
//!
//! Every process touching `calls.json` or `catalog.json` (CLI commands and
//! the daemon alike) takes the same exclusive lock first, so a read followed
//! by a write is never interleaved with another writer.

use crate::error::{Result, SchedulerError};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Name of the lock file inside the data directory.
pub const LOCK_FILE: &str = "calls.lock";

/// Exclusive lock on a data directory, released on drop.
#[derive(Debug)]
pub struct DataLock {
    _lock_file: File,
    path: PathBuf,
}

impl DataLock {
    /// Block until the lock for `data_dir` is held.
    pub fn acquire(data_dir: &Path) -> Result<Self> {
        Self::acquire_at_path(&data_dir.join(LOCK_FILE))
    }

    pub fn acquire_at_path(lock_path: &Path) -> Result<Self> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(SchedulerError::StoreWrite)?;
        }

        // Never truncate: the file only exists to be locked
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path)
            .map_err(SchedulerError::StoreWrite)?;

        lock_file
            .lock_exclusive()
            .map_err(|_| SchedulerError::LockFailed)?;

        Ok(Self {
            _lock_file: lock_file,
            path: lock_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Replace `path` with `content` via a sibling temp file and rename.
pub fn atomic_write(path: &Path, content: &str) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        SchedulerError::StoreWrite(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Path has no parent directory",
        ))
    })?;
    std::fs::create_dir_all(dir).map_err(SchedulerError::StoreWrite)?;

    // Same directory so the rename stays on one filesystem
    let mut temp_file = NamedTempFile::new_in(dir).map_err(SchedulerError::StoreWrite)?;
    temp_file
        .write_all(content.as_bytes())
        .map_err(SchedulerError::StoreWrite)?;
    temp_file.flush().map_err(SchedulerError::StoreWrite)?;
    temp_file
        .persist(path)
        .map_err(|e| SchedulerError::StoreWrite(e.error))?;

    Ok(())
}

/// Read a file that may not exist yet. Missing means `None`.
pub fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SchedulerError::StoreRead(e)),
    }
}
