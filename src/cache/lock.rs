//! Single-writer lock on the cache root
//!
//! An advisory exclusive lock on `<cache>/.lens_cache.lock`, held for the
//! whole of an update. Acquisition polls until a timeout, logging once when
//! contention lasts longer than half a second. The lock is released when the
//! guard is dropped.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// Lock file name inside the cache root
pub const LOCK_FILENAME: &str = ".lens_cache.lock";

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const CONTENTION_WARNING: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("timed out after {waited:?} waiting for cache lock {}", path.display())]
    Timeout { path: PathBuf, waited: Duration },

    #[error("cache lock {} failed: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Held cache lock
#[derive(Debug)]
pub struct CacheLock {
    path: PathBuf,
    file: File,
}

impl CacheLock {
    /// Acquire the lock, creating the cache root if needed.
    pub fn acquire(cache_root: &Path, timeout: Duration) -> Result<Self, LockError> {
        let path = cache_root.join(LOCK_FILENAME);
        fs::create_dir_all(cache_root).map_err(|source| LockError::Io {
            path: path.clone(),
            source,
        })?;

        let start = Instant::now();
        let mut warned = false;
        loop {
            match try_lock(&path) {
                Ok(file) => {
                    if warned {
                        tracing::info!(
                            path = %path.display(),
                            waited_ms = start.elapsed().as_millis() as u64,
                            "cache lock acquired after contention"
                        );
                    }
                    return Ok(Self { path, file });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if !warned && start.elapsed() > CONTENTION_WARNING {
                        tracing::warn!(path = %path.display(), "cache is locked by another process, waiting");
                        warned = true;
                    }
                }
                Err(source) => return Err(LockError::Io { path, source }),
            }

            let waited = start.elapsed();
            if waited >= timeout {
                return Err(LockError::Timeout { path, waited });
            }
            thread::sleep(POLL_INTERVAL.min(timeout - waited));
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn try_lock(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    use std::os::unix::io::AsRawFd;

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .mode(0o644)
        .open(path)?;

    // SAFETY: the descriptor belongs to `file`, which outlives the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(file);
    }

    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Err(io::Error::new(io::ErrorKind::WouldBlock, "cache lock held"))
    } else {
        Err(err)
    }
}

#[cfg(not(unix))]
fn try_lock(path: &Path) -> io::Result<File> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => Ok(file),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(io::Error::new(io::ErrorKind::WouldBlock, "cache lock held"))
        }
        Err(e) => Err(e),
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            // SAFETY: the descriptor is still owned by `self.file`.
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = fs::remove_file(&self.path);
        }
    }
}
