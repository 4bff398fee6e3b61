//! Single-instance lock so two provisioning runs never race on one host.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another run already holds {path}")]
    Held { path: PathBuf },

    #[error("failed to lock {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Exclusive advisory `flock` on a well-known file, held for the lifetime of
/// the value. The kernel drops the lock if the process dies, so a killed run
/// never leaves the host locked.
pub struct InstanceLock {
    path: PathBuf,
    _lock: Flock<File>,
}

impl std::fmt::Debug for InstanceLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceLock").field("path", &self.path).finish()
    }
}

impl InstanceLock {
    /// Try to take the lock without blocking.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let io_err = |source: std::io::Error| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(path)
            .map_err(io_err)?;

        let mut lock = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => lock,
            Err((_, Errno::EWOULDBLOCK)) => {
                return Err(LockError::Held {
                    path: path.to_path_buf(),
                });
            }
            Err((_, errno)) => return Err(io_err(std::io::Error::from(errno))),
        };

        // Record the holder for operators; the lock itself is the flock.
        lock.set_len(0).map_err(io_err)?;
        writeln!(*lock, "{}", std::process::id()).map_err(io_err)?;

        Ok(Self {
            path: path.to_path_buf(),
            _lock: lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_acquire_is_rejected_while_held() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run").join("banguard.lock");

        let first = InstanceLock::acquire(&path).unwrap();
        assert_eq!(first.path(), path);

        match InstanceLock::acquire(&path) {
            Err(LockError::Held { path: held }) => assert_eq!(held, path),
            other => panic!("expected Held, got {:?}", other),
        }
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("banguard.lock");

        drop(InstanceLock::acquire(&path).unwrap());
        assert!(InstanceLock::acquire(&path).is_ok());
    }

    #[test]
    fn holder_pid_is_recorded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("banguard.lock");

        let _lock = InstanceLock::acquire(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());
    }
}
