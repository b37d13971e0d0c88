use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use chrono::Utc;
use parking_lot::Mutex;
use seed_domain::conversation::ConversationEntry;
use seed_domain::error::Result;
use seed_domain::tool::Message;

use crate::file_lock::FileLock;

struct State {
    next_id: u64,
    per_task_len: HashMap<String, u64>,
}

/// Per-task ordered message history backed by a single shared
/// `state/conversations.jsonl`, filtered by `taskId` on read.
pub struct ConversationLog {
    path: PathBuf,
    inner: Mutex<State>,
}

impl ConversationLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;

        let mut next_id = 0u64;
        let mut per_task_len: HashMap<String, u64> = HashMap::new();
        for entry in read_entries(&path)? {
            next_id = next_id.max(entry.id + 1);
            *per_task_len.entry(entry.task_id).or_insert(0) += 1;
        }
        Ok(Self {
            path,
            inner: Mutex::new(State { next_id, per_task_len }),
        })
    }

    pub fn append(&self, task_id: &str, message: Message) -> Result<ConversationEntry> {
        let _lock = FileLock::acquire(&self.path)?;
        let mut state = self.inner.lock();
        let index = *state.per_task_len.get(task_id).unwrap_or(&0);
        let entry = ConversationEntry {
            id: state.next_id,
            task_id: task_id.to_string(),
            index,
            message,
            created_at: Utc::now(),
        };
        let mut f = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(f, "{}", serde_json::to_string(&entry)?)?;

        state.next_id += 1;
        *state.per_task_len.entry(task_id.to_string()).or_insert(0) += 1;
        Ok(entry)
    }

    pub fn get_messages(&self, task_id: &str) -> Result<Vec<ConversationEntry>> {
        let mut entries: Vec<_> = read_entries(&self.path)?
            .into_iter()
            .filter(|e| e.task_id == task_id)
            .collect();
        entries.sort_by_key(|e| e.index);
        Ok(entries)
    }

    pub fn read_all(&self, from_id_exclusive: u64) -> Result<Vec<ConversationEntry>> {
        Ok(read_entries(&self.path)?
            .into_iter()
            .filter(|e| e.id > from_id_exclusive)
            .collect())
    }

    /// Drops every entry for `task_id` except the last `keep_last_n`,
    /// reindexing the kept ones from 0. Other tasks' entries are untouched.
    pub fn truncate(&self, task_id: &str, keep_last_n: usize) -> Result<()> {
        let _lock = FileLock::acquire(&self.path)?;
        let mut state = self.inner.lock();
        let all = read_entries(&self.path)?;
        let (mut mine, others): (Vec<_>, Vec<_>) = all.into_iter().partition(|e| e.task_id == task_id);
        mine.sort_by_key(|e| e.index);
        let drop_count = mine.len().saturating_sub(keep_last_n);
        let kept = mine.split_off(drop_count);

        let new_len = self.rewrite(&others, task_id, kept)?;
        state.per_task_len.insert(task_id.to_string(), new_len);
        Ok(())
    }

    pub fn clear(&self, task_id: &str) -> Result<()> {
        let _lock = FileLock::acquire(&self.path)?;
        let mut state = self.inner.lock();
        let all = read_entries(&self.path)?;
        let others: Vec<_> = all.into_iter().filter(|e| e.task_id != task_id).collect();
        self.rewrite(&others, task_id, Vec::new())?;
        state.per_task_len.insert(task_id.to_string(), 0);
        Ok(())
    }

    fn rewrite(&self, others: &[ConversationEntry], task_id: &str, mut kept: Vec<ConversationEntry>) -> Result<u64> {
        for (i, entry) in kept.iter_mut().enumerate() {
            entry.index = i as u64;
        }
        let mut merged: Vec<&ConversationEntry> = others.iter().collect();
        let kept_refs: Vec<&ConversationEntry> = kept.iter().collect();
        merged.extend(kept_refs);
        merged.sort_by_key(|e| e.id);

        let tmp = tmp_path(&self.path);
        {
            let mut f = OpenOptions::new().create(true).write(true).truncate(true).open(&tmp)?;
            for entry in &merged {
                writeln!(f, "{}", serde_json::to_string(entry)?)?;
            }
            f.sync_data()?;
        }
        fs::rename(&tmp, &self.path)?;
        let _ = task_id;
        Ok(kept.len() as u64)
    }
}

fn tmp_path(path: &std::path::Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".tmp");
    PathBuf::from(s)
}

fn read_entries(path: &std::path::Path) -> Result<Vec<ConversationEntry>> {
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
        match serde_json::from_str::<ConversationEntry>(&line) {
            Ok(entry) => out.push(entry),
            Err(e) => {
                tracing::warn!(line = lineno + 1, error = %e, "skipping malformed conversation line");
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_assigns_per_task_index_from_zero() {
        let dir = tempdir().unwrap();
        let log = ConversationLog::open(dir.path().join("conversations.jsonl")).unwrap();
        let e0 = log.append("T1", Message::user("hi")).unwrap();
        let e1 = log.append("T1", Message::assistant("hello")).unwrap();
        assert_eq!(e0.index, 0);
        assert_eq!(e1.index, 1);
        assert_ne!(e0.id, e1.id);
    }

    #[test]
    fn get_messages_filters_by_task_and_preserves_order() {
        let dir = tempdir().unwrap();
        let log = ConversationLog::open(dir.path().join("conversations.jsonl")).unwrap();
        log.append("T1", Message::user("a")).unwrap();
        log.append("T2", Message::user("x")).unwrap();
        log.append("T1", Message::user("b")).unwrap();

        let t1 = log.get_messages("T1").unwrap();
        assert_eq!(t1.len(), 2);
        assert_eq!(t1[0].message.content.as_deref(), Some("a"));
        assert_eq!(t1[1].message.content.as_deref(), Some("b"));
    }

    #[test]
    fn truncate_keeps_last_n_and_reindexes() {
        let dir = tempdir().unwrap();
        let log = ConversationLog::open(dir.path().join("conversations.jsonl")).unwrap();
        for i in 0..5 {
            log.append("T1", Message::user(format!("m{i}"))).unwrap();
        }
        log.truncate("T1", 2).unwrap();
        let remaining = log.get_messages("T1").unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].message.content.as_deref(), Some("m3"));
        assert_eq!(remaining[0].index, 0);
        assert_eq!(remaining[1].index, 1);
    }

    #[test]
    fn clear_removes_only_target_task() {
        let dir = tempdir().unwrap();
        let log = ConversationLog::open(dir.path().join("conversations.jsonl")).unwrap();
        log.append("T1", Message::user("a")).unwrap();
        log.append("T2", Message::user("x")).unwrap();
        log.clear("T1").unwrap();
        assert!(log.get_messages("T1").unwrap().is_empty());
        assert_eq!(log.get_messages("T2").unwrap().len(), 1);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conversations.jsonl");
        {
            let log = ConversationLog::open(&path).unwrap();
            log.append("T1", Message::user("a")).unwrap();
        }
        let log2 = ConversationLog::open(&path).unwrap();
        assert_eq!(log2.get_messages("T1").unwrap().len(), 1);
        let e = log2.append("T1", Message::user("b")).unwrap();
        assert_eq!(e.index, 1);
    }

    #[test]
    fn malformed_line_is_skipped_on_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conversations.jsonl");
        let log = ConversationLog::open(&path).unwrap();
        log.append("T1", Message::user("a")).unwrap();
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(f, "not json").unwrap();
        }
        assert_eq!(log.get_messages("T1").unwrap().len(), 1);
    }
}
