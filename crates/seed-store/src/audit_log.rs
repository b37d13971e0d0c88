use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use seed_domain::audit::AuditEntry;
use seed_domain::error::Result;
use tokio::sync::broadcast;

use crate::file_lock::FileLock;

const FEED_CAPACITY: usize = 4096;

/// Append-only trace of every tool call request/completion, backed by
/// `state/audit.jsonl`. Structurally a simpler sibling of [`EventLog`]
/// (single monotonic stream, no per-stream `seq`), sharing the same
/// [`FileLock`] locking primitive rather than duplicating it.
///
/// [`EventLog`]: crate::event_log::EventLog
pub struct AuditLog {
    path: PathBuf,
    next_id: Mutex<u64>,
    feed: broadcast::Sender<AuditEntry>,
}

impl AuditLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Arc<Self>> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;
        let next_id = read_entries(&path)?.last().map(|e| e.id + 1).unwrap_or(0);
        let (feed, _rx) = broadcast::channel(FEED_CAPACITY);
        Ok(Arc::new(Self {
            path,
            next_id: Mutex::new(next_id),
            feed,
        }))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuditEntry> {
        self.feed.subscribe()
    }

    pub fn append(&self, build: impl FnOnce(u64) -> AuditEntry) -> Result<AuditEntry> {
        let _lock = FileLock::acquire(&self.path)?;
        let mut next_id = self.next_id.lock();
        let entry = build(*next_id);
        let mut f = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(f, "{}", serde_json::to_string(&entry)?)?;
        *next_id += 1;
        let _ = self.feed.send(entry.clone());
        Ok(entry)
    }

    pub fn read_all(&self, from_id_exclusive: u64) -> Result<Vec<AuditEntry>> {
        Ok(read_entries(&self.path)?
            .into_iter()
            .filter(|e| e.id > from_id_exclusive)
            .collect())
    }

    pub fn read_by_task(&self, task_id: &str) -> Result<Vec<AuditEntry>> {
        Ok(read_entries(&self.path)?
            .into_iter()
            .filter(|e| e.payload.task_id == task_id)
            .collect())
    }
}

fn read_entries(path: &std::path::Path) -> Result<Vec<AuditEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditEntry>(&line) {
            Ok(entry) => out.push(entry),
            Err(e) => {
                tracing::warn!(line = lineno + 1, error = %e, "skipping malformed audit line");
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use seed_domain::audit::{AuditEntryType, AuditPayload};
    use tempfile::tempdir;

    fn payload(task_id: &str, tool_call_id: &str) -> AuditPayload {
        AuditPayload {
            tool_call_id: tool_call_id.into(),
            tool_name: "readFile".into(),
            task_id: task_id.into(),
            author_actor_id: "agent-1".into(),
            input: Some(serde_json::json!({"path": "a.txt"})),
            output: None,
            is_error: None,
            duration_ms: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn ids_are_monotonic() {
        let dir = tempdir().unwrap();
        let log = AuditLog::open(dir.path().join("audit.jsonl")).unwrap();
        let e0 = log
            .append(|id| AuditEntry {
                id,
                entry_type: AuditEntryType::ToolCallRequested,
                payload: payload("T1", "c1"),
            })
            .unwrap();
        let e1 = log
            .append(|id| AuditEntry {
                id,
                entry_type: AuditEntryType::ToolCallCompleted,
                payload: payload("T1", "c1"),
            })
            .unwrap();
        assert_eq!(e0.id, 0);
        assert_eq!(e1.id, 1);
    }

    #[test]
    fn read_by_task_filters() {
        let dir = tempdir().unwrap();
        let log = AuditLog::open(dir.path().join("audit.jsonl")).unwrap();
        log.append(|id| AuditEntry {
            id,
            entry_type: AuditEntryType::ToolCallRequested,
            payload: payload("T1", "c1"),
        })
        .unwrap();
        log.append(|id| AuditEntry {
            id,
            entry_type: AuditEntryType::ToolCallRequested,
            payload: payload("T2", "c2"),
        })
        .unwrap();
        assert_eq!(log.read_by_task("T1").unwrap().len(), 1);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let log = AuditLog::open(&path).unwrap();
            log.append(|id| AuditEntry {
                id,
                entry_type: AuditEntryType::ToolCallRequested,
                payload: payload("T1", "c1"),
            })
            .unwrap();
        }
        let log2 = AuditLog::open(&path).unwrap();
        let e = log2
            .append(|id| AuditEntry {
                id,
                entry_type: AuditEntryType::ToolCallCompleted,
                payload: payload("T1", "c1"),
            })
            .unwrap();
        assert_eq!(e.id, 1);
    }
}
