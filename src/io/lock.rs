use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

/// Lock file in the vault root. Hidden, so the vault never lists it.
pub const LOCK_FILE_NAME: &str = ".taskvault.lock";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Exclusive advisory lock over a vault, held for one read-modify-write.
///
/// Two `tv` processes editing the same vault take turns. The lock file is
/// left in place on release: unlinking it would let a waiter lock an
/// orphaned inode while a newcomer locks a fresh file.
pub struct VaultLock {
    _file: File,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not open lock file {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("vault is locked by another process ({path}); gave up after {waited:?}")]
    Timeout { path: PathBuf, waited: Duration },
}

impl VaultLock {
    /// Take the lock if nobody holds it, without waiting
    pub fn try_acquire(root: &Path) -> Result<Option<Self>, LockError> {
        let file = open_lock_file(root)?;
        Ok(try_lock(&file).ok().map(|()| VaultLock { _file: file }))
    }

    /// Wait up to `timeout` for the lock, polling at a growing interval
    pub fn acquire(root: &Path, timeout: Duration) -> Result<Self, LockError> {
        let file = open_lock_file(root)?;
        let start = Instant::now();
        let mut interval = Duration::from_millis(1);

        while try_lock(&file).is_err() {
            let waited = start.elapsed();
            if waited >= timeout {
                debug!(root = %root.display(), ?waited, "VaultLock::acquire: timed out");
                return Err(LockError::Timeout {
                    path: root.join(LOCK_FILE_NAME),
                    waited,
                });
            }
            trace!(?interval, "VaultLock::acquire: held elsewhere, waiting");
            std::thread::sleep(interval);
            interval = (interval * 2).min(MAX_POLL_INTERVAL);
        }
        Ok(VaultLock { _file: file })
    }

    pub fn acquire_default(root: &Path) -> Result<Self, LockError> {
        Self::acquire(root, DEFAULT_TIMEOUT)
    }
}

fn open_lock_file(root: &Path) -> Result<File, LockError> {
    let path = root.join(LOCK_FILE_NAME);
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .map_err(|source| LockError::Open { path, source })
}

/// Non-blocking exclusive flock; released when the file is closed
#[cfg(unix)]
fn try_lock(file: &File) -> Result<(), std::io::Error> {
    use std::os::unix::io::AsRawFd;
    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> Result<(), std::io::Error> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_is_reusable_after_release() {
        let tmp = TempDir::new().unwrap();

        let lock = VaultLock::acquire_default(tmp.path()).unwrap();
        assert!(tmp.path().join(LOCK_FILE_NAME).exists());
        drop(lock);

        assert!(VaultLock::try_acquire(tmp.path()).unwrap().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn contention_times_out() {
        let tmp = TempDir::new().unwrap();
        let _held = VaultLock::acquire_default(tmp.path()).unwrap();

        assert!(VaultLock::try_acquire(tmp.path()).unwrap().is_none());
        let second = VaultLock::acquire(tmp.path(), Duration::from_millis(30));
        assert!(matches!(second, Err(LockError::Timeout { .. })));
    }

    #[test]
    fn missing_root_is_an_open_error() {
        let tmp = TempDir::new().unwrap();
        let result = VaultLock::try_acquire(&tmp.path().join("nope"));
        assert!(matches!(result, Err(LockError::Open { .. })));
    }
}
