//! Host-wide run lock
//!
//! Advisory, exclusive, non-blocking `flock` on a well-known file. A second
//! client, including a second acquisition within the same process, fails
//! immediately instead of waiting. The lock is released when the guard drops.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Lock result type
pub type LockResult<T> = Result<T, LockError>;

/// Errors from lock operations
#[derive(Debug, Error)]
pub enum LockError {
    #[error("another run holds {}", .0.display())]
    Contention(PathBuf),

    #[error("lock file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Held run lock.
///
/// The lock file is left in place on release; only the `flock` is dropped.
#[derive(Debug)]
pub struct HostLock {
    path: PathBuf,
    file: File,
}

impl HostLock {
    /// Acquire the lock at `path` or fail at once.
    ///
    /// On success the lock file holds the current pid.
    pub fn acquire(path: &Path) -> LockResult<Self> {
        let io_err = |source: io::Error| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = Self::open(path).map_err(io_err)?;

        match Self::try_lock_exclusive(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                tracing::warn!(path = %path.display(), "lock contention");
                return Err(LockError::Contention(path.to_path_buf()));
            }
            Err(e) => return Err(io_err(e)),
        }

        let mut lock = Self {
            path: path.to_path_buf(),
            file,
        };
        lock.write_pid().map_err(io_err)?;

        tracing::debug!(path = %path.display(), "lock acquired");
        Ok(lock)
    }

    /// Get the lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // no truncate on open: the holder's pid must survive a failed attempt
    #[cfg(unix)]
    fn open(path: &Path) -> io::Result<File> {
        use std::os::unix::fs::OpenOptionsExt;

        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o644)
            .open(path)
    }

    #[cfg(not(unix))]
    fn open(path: &Path) -> io::Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
    }

    #[cfg(unix)]
    fn try_lock_exclusive(file: &File) -> io::Result<()> {
        use std::os::unix::io::AsRawFd;

        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };

        if result == 0 {
            Ok(())
        } else {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "lock held"))
            } else {
                Err(err)
            }
        }
    }

    #[cfg(not(unix))]
    fn try_lock_exclusive(_file: &File) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "advisory locking requires a unix host",
        ))
    }

    fn write_pid(&mut self) -> io::Result<()> {
        self.file.set_len(0)?;
        self.file.rewind()?;
        writeln!(self.file, "{}", std::process::id())?;
        self.file.flush()
    }
}

impl Drop for HostLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
        tracing::debug!(path = %self.path.display(), "lock released");
    }
}
