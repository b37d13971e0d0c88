use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use seed_domain::error::{Error, Result};

const RETRY_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_DEADLINE: Duration = Duration::from_secs(2);

/// An exclusive advisory lock implemented as a sibling `<file>.lock` file,
/// created with `create_new` so only one holder can win the race. Held for
/// the duration of one append; dropped (and the lock file removed) when the
/// guard goes out of scope.
pub struct FileLock {
    lock_path: PathBuf,
}

impl FileLock {
    /// Blocks (synchronously — callers run this inside `spawn_blocking` or
    /// a `parking_lot::Mutex`-guarded section) until the lock is acquired or
    /// `deadline` elapses, in which case `LockTimeout` is returned.
    pub fn acquire(target: &Path) -> Result<Self> {
        Self::acquire_with_deadline(target, DEFAULT_DEADLINE)
    }

    pub fn acquire_with_deadline(target: &Path, deadline: Duration) -> Result<Self> {
        let lock_path = lock_path_for(target);
        let started = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
                Ok(_) => return Ok(Self { lock_path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if started.elapsed() >= deadline {
                        return Err(Error::LockTimeout(format!(
                            "timed out waiting for lock on {}",
                            target.display()
                        )));
                    }
                    std::thread::sleep(RETRY_INTERVAL);
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_path);
    }
}

fn lock_path_for(target: &Path) -> PathBuf {
    let mut s = target.as_os_str().to_os_string();
    s.push(".lock");
    PathBuf::from(s)
}
