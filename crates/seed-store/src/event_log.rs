use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use seed_domain::error::Result;
use seed_domain::event::{DomainEvent, StoredEvent};
use tokio::sync::broadcast;

use crate::file_lock::FileLock;

const FEED_CAPACITY: usize = 4096;

struct State {
    max_id: u64,
    max_seq: HashMap<String, u64>,
}

/// Append-only, per-stream-ordered event log backed by `state/events.jsonl`.
///
/// Concurrent appenders within this process serialize on `inner`; a sibling
/// `.lock` file additionally guards against an external writer sharing the
/// same file, per [`FileLock`].
pub struct EventLog {
    path: PathBuf,
    inner: Mutex<State>,
    feed: broadcast::Sender<StoredEvent>,
}

impl EventLog {
    /// Idempotent: creates the parent directory and an empty file if
    /// absent, then reconciles the in-memory cursors from disk.
    pub fn open(path: impl Into<PathBuf>) -> Result<Arc<Self>> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;

        let (max_id, max_seq) = scan_cursors(&path)?;
        let (feed, _rx) = broadcast::channel(FEED_CAPACITY);
        Ok(Arc::new(Self {
            path,
            inner: Mutex::new(State { max_id, max_seq }),
            feed,
        }))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoredEvent> {
        self.feed.subscribe()
    }

    /// Atomically assigns `(id, seq, createdAt)` to each event and appends
    /// them in order. All events in the batch share `stream_id`. Any I/O
    /// failure aborts the whole batch — nothing is published on the feed.
    pub fn append(&self, stream_id: &str, events: Vec<DomainEvent>) -> Result<Vec<StoredEvent>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        let _lock = FileLock::acquire(&self.path)?;
        let mut state = self.inner.lock();

        // Reconcile with disk in case another process appended since we last
        // cached (the file lock ensures no concurrent writer right now).
        let (disk_max_id, disk_max_seq) = scan_cursors(&self.path)?;
        state.max_id = state.max_id.max(disk_max_id);
        for (k, v) in disk_max_seq {
            let entry = state.max_seq.entry(k).or_insert(0);
            *entry = (*entry).max(v);
        }

        let mut stored = Vec::with_capacity(events.len());
        let mut buf = String::new();
        for event in events {
            state.max_id += 1;
            let id = state.max_id;
            let seq_cursor = state.max_seq.entry(stream_id.to_string()).or_insert(0);
            *seq_cursor += 1;
            let seq = *seq_cursor;
            let entry = StoredEvent {
                id,
                stream_id: stream_id.to_string(),
                seq,
                created_at: Utc::now(),
                event,
            };
            buf.push_str(&serde_json::to_string(&entry)?);
            buf.push('\n');
            stored.push(entry);
        }

        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(buf.as_bytes())?;
        file.sync_data()?;

        for entry in &stored {
            let _ = self.feed.send(entry.clone());
        }
        Ok(stored)
    }

    pub fn read_all(&self, from_id_exclusive: u64) -> Result<Vec<StoredEvent>> {
        Ok(read_lines(&self.path)?
            .into_iter()
            .filter(|e| e.id > from_id_exclusive)
            .collect())
    }

    pub fn read_stream(&self, stream_id: &str, from_seq_inclusive: u64) -> Result<Vec<StoredEvent>> {
        Ok(read_lines(&self.path)?
            .into_iter()
            .filter(|e| e.stream_id == stream_id && e.seq >= from_seq_inclusive)
            .collect())
    }

    pub fn read_by_id(&self, id: u64) -> Result<Option<StoredEvent>> {
        Ok(read_lines(&self.path)?.into_iter().find(|e| e.id == id))
    }
}

fn scan_cursors(path: &Path) -> Result<(u64, HashMap<String, u64>)> {
    let mut max_id = 0u64;
    let mut max_seq: HashMap<String, u64> = HashMap::new();
    for entry in read_lines(path)? {
        max_id = max_id.max(entry.id);
        let slot = max_seq.entry(entry.stream_id).or_insert(0);
        *slot = (*slot).max(entry.seq);
    }
    Ok((max_id, max_seq))
}

fn read_lines(path: &Path) -> Result<Vec<StoredEvent>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<StoredEvent>(&line) {
            Ok(entry) => out.push(entry),
            Err(e) => {
                tracing::warn!(path = %path.display(), line = lineno + 1, error = %e, "skipping malformed event line");
            }
        }
    }
    Ok(out)
}
