//! Tracks background processes spawned by `runCommand`, keyed by
//! `taskId/pid` so a runtime tearing down a task can find and kill exactly
//! its own children.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Running,
    Finished,
    Killed,
    TimedOut,
    Failed,
}

pub struct ProcessSession {
    pub key: String,
    pub task_id: String,
    pub pid: Option<u32>,
    pub command: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: ProcessStatus,
    pub exit_code: Option<i32>,
    pub output: OutputBuffer,
    pub kill_tx: Option<mpsc::Sender<()>>,
}

/// A combined-output buffer that keeps only the most recent `max_bytes`,
/// trimming at a char boundary to avoid splitting multi-byte UTF-8.
pub struct OutputBuffer {
    pub combined: String,
    pub max_bytes: usize,
    pub truncated: bool,
}

impl OutputBuffer {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            combined: String::new(),
            max_bytes,
            truncated: false,
        }
    }

    pub fn push(&mut self, text: &str) {
        self.combined.push_str(text);
        if self.combined.len() > self.max_bytes {
            self.truncated = true;
            let keep = self.max_bytes * 3 / 4;
            let drain_count = self.combined.len() - keep;
            let mut boundary = drain_count;
            while boundary < self.combined.len() && !self.combined.is_char_boundary(boundary) {
                boundary += 1;
            }
            self.combined.drain(..boundary);
        }
    }

    pub fn len(&self) -> usize {
        self.combined.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combined.is_empty()
    }

    pub fn tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.combined.lines().collect();
        if all.len() <= lines {
            self.combined.clone()
        } else {
            all[all.len() - lines..].join("\n")
        }
    }

    /// Renders with the spec's truncation marker appended when the cap was hit.
    pub fn render(&self) -> String {
        if self.truncated {
            format!("{}\n(output truncated)", self.combined)
        } else {
            self.combined.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessInfo {
    pub key: String,
    pub task_id: String,
    pub pid: Option<u32>,
    pub command: String,
    pub status: ProcessStatus,
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// In-memory registry of background process sessions. Owns no child
/// processes directly — each spawn starts a background tokio task that
/// writes into the shared `ProcessSession`.
pub struct ProcessTracker {
    sessions: RwLock<HashMap<String, Arc<RwLock<ProcessSession>>>>,
}

impl ProcessTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn key_for(task_id: &str, pid: u32) -> String {
        format!("{task_id}/{pid}")
    }

    pub fn register(&self, session: ProcessSession) -> Arc<RwLock<ProcessSession>> {
        let key = session.key.clone();
        let arc = Arc::new(RwLock::new(session));
        self.sessions.write().insert(key, arc.clone());
        arc
    }

    pub fn get(&self, key: &str) -> Option<Arc<RwLock<ProcessSession>>> {
        self.sessions.read().get(key).cloned()
    }

    pub fn list_for_task(&self, task_id: &str) -> Vec<ProcessInfo> {
        self.sessions
            .read()
            .values()
            .filter(|s| s.read().task_id == task_id)
            .map(|s| {
                let s = s.read();
                ProcessInfo {
                    key: s.key.clone(),
                    task_id: s.task_id.clone(),
                    pid: s.pid,
                    command: s.command.clone(),
                    status: s.status,
                    exit_code: s.exit_code,
                    started_at: s.started_at,
                    finished_at: s.finished_at,
                }
            })
            .collect()
    }

    /// Kill every running process belonging to `task_id` — called on task
    /// cancellation and on runtime shutdown.
    pub fn kill_task(&self, task_id: &str) {
        let sessions = self.sessions.read();
        for s in sessions.values() {
            let s = s.read();
            if s.task_id == task_id && s.status == ProcessStatus::Running {
                if let Some(ref tx) = s.kill_tx {
                    let _ = tx.try_send(());
                }
            }
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        self.sessions.write().remove(key).is_some()
    }
}
