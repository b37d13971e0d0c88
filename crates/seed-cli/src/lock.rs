//! Reads and writes `.seed.lock`, the on-disk record of a running master
//! process. Deliberately not an `fs2` advisory lock like the teacher's PID
//! file — a single JSON record is enough since `seed` only ever has one
//! master per workspace and liveness is checked by PID, not by holding a
//! lock open for the process lifetime.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockFile {
    pub pid: u32,
    pub port: u16,
    pub token: String,
    pub started_at: DateTime<Utc>,
}

impl LockFile {
    pub fn new() -> Self {
        Self {
            pid: std::process::id(),
            port: 0,
            token: random_token(),
            started_at: Utc::now(),
        }
    }

    pub fn write(&self, workspace_path: &Path) -> anyhow::Result<()> {
        let path = lock_path(workspace_path);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn read(workspace_path: &Path) -> anyhow::Result<Option<Self>> {
        let path = lock_path(workspace_path);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn remove(workspace_path: &Path) {
        let _ = std::fs::remove_file(lock_path(workspace_path));
    }

    /// Whether the recorded PID still belongs to a live process. On Linux
    /// this reads `/proc/<pid>`; elsewhere (no portable `kill(pid, 0)`
    /// without a syscall crate already in the dependency set) it falls
    /// back to "assume alive if the lock file is less than a minute old",
    /// matching the looser guarantee the design document accepts.
    pub fn is_alive(&self, workspace_path: &Path) -> bool {
        #[cfg(target_os = "linux")]
        {
            return Path::new(&format!("/proc/{}", self.pid)).exists();
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = workspace_path;
            Utc::now().signed_duration_since(self.started_at) < chrono::Duration::minutes(1)
        }
    }
}

fn lock_path(workspace_path: &Path) -> PathBuf {
    workspace_path.join(".seed.lock")
}

fn random_token() -> String {
    use rand::Rng;
    let bytes: [u8; 16] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
