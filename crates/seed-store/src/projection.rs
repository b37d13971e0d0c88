use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;

use seed_domain::error::Result;
use seed_domain::event::{DomainEvent, ProjectionRow, StoredEvent};
use seed_domain::task::{Task, TaskStatus};

use crate::event_log::EventLog;
use crate::file_lock::FileLock;

/// A deterministic, pure fold from `StoredEvent`s into a read model.
pub trait Reducer {
    type State: Serialize + DeserializeOwned + Default + Clone;

    fn name() -> &'static str;
    fn apply(state: &mut Self::State, event: &StoredEvent);
}

/// Durable store for `state/projections.jsonl`. Every `save` appends a row;
/// `load` picks the newest row per name, and periodically compacts the file
/// down to exactly one row per name (temp-file-then-rename).
pub struct ProjectionStore {
    path: PathBuf,
}

impl ProjectionStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path })
    }

    pub fn load<S: DeserializeOwned>(&self, name: &str) -> Result<Option<ProjectionRow<S>>> {
        let rows = self.load_raw(name)?;
        match rows.into_iter().last() {
            Some(raw) => Ok(Some(ProjectionRow {
                name: raw.name,
                cursor_event_id: raw.cursor_event_id,
                state: serde_json::from_value(raw.state)?,
                updated_at: raw.updated_at,
            })),
            None => Ok(None),
        }
    }

    pub fn save<S: Serialize>(&self, name: &str, cursor_event_id: u64, state: &S) -> Result<()> {
        let _lock = FileLock::acquire(&self.path)?;
        let row = ProjectionRow {
            name: name.to_string(),
            cursor_event_id,
            state: serde_json::to_value(state)?,
            updated_at: Utc::now(),
        };
        let mut f = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(f, "{}", serde_json::to_string(&row)?)?;
        self.compact_locked(name)?;
        Ok(())
    }

    fn load_raw(&self, name: &str) -> Result<Vec<ProjectionRow<serde_json::Value>>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut out = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ProjectionRow<serde_json::Value>>(&line) {
                Ok(row) if row.name == name => out.push(row),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(line = lineno + 1, error = %e, "skipping malformed projection row");
                }
            }
        }
        Ok(out)
    }

    /// Rewrites the file keeping only the newest row per projection name.
    /// Called under the same lock as `save` so it never races a concurrent
    /// writer; uses temp-file-then-rename to stay crash-safe.
    fn compact_locked(&self, _just_saved: &str) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let file = fs::File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut newest: HashMap<String, ProjectionRow<serde_json::Value>> = HashMap::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(row) = serde_json::from_str::<ProjectionRow<serde_json::Value>>(&line) {
                newest.insert(row.name.clone(), row);
            }
        }
        let tmp = tmp_path(&self.path);
        {
            let mut f = OpenOptions::new().create(true).write(true).truncate(true).open(&tmp)?;
            for row in newest.values() {
                writeln!(f, "{}", serde_json::to_string(row)?)?;
            }
            f.sync_data()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".tmp");
    PathBuf::from(s)
}

/// Reads the current row (or the reducer's default), folds every event with
/// `id > cursor`, and writes the new cursor + state back. Re-entrant and
/// idempotent: calling this twice with no new events is a no-op write of
/// the same state.
pub fn run_projection<R: Reducer>(log: &EventLog, store: &ProjectionStore) -> Result<R::State> {
    let existing = store.load::<R::State>(R::name())?;
    let (mut state, cursor) = match existing {
        Some(row) => (row.state, row.cursor_event_id),
        None => (R::State::default(), 0),
    };
    let events = log.read_all(cursor)?;
    if events.is_empty() {
        return Ok(state);
    }
    let mut new_cursor = cursor;
    for event in &events {
        R::apply(&mut state, event);
        new_cursor = new_cursor.max(event.id);
    }
    store.save(R::name(), new_cursor, &state)?;
    Ok(state)
}

#[derive(Debug, Clone, Serialize, serde::Deserialize, Default)]
pub struct TasksProjection {
    pub tasks: HashMap<String, Task>,
    pub current_task_id: Option<String>,
}

pub struct TasksReducer;

impl Reducer for TasksReducer {
    type State = TasksProjection;

    fn name() -> &'static str {
        "tasks"
    }

    fn apply(state: &mut Self::State, stored: &StoredEvent) {
        let now = stored.created_at;
        match &stored.event {
            DomainEvent::TaskCreated {
                task_id,
                title,
                intent,
                priority,
                agent_id,
                parent_task_id,
                ..
            } => {
                state.tasks.insert(
                    task_id.clone(),
                    Task {
                        task_id: task_id.clone(),
                        title: title.clone(),
                        intent: intent.clone(),
                        priority: *priority,
                        status: TaskStatus::Open,
                        agent_id: agent_id.clone(),
                        parent_task_id: parent_task_id.clone(),
                        created_at: now,
                        updated_at: now,
                        pending_interaction_id: None,
                        summary: None,
                        failure_reason: None,
                        todos: Vec::new(),
                    },
                );
                state.current_task_id = Some(task_id.clone());
            }
            DomainEvent::TaskStarted { task_id, .. } => {
                set_status(state, task_id, now, TaskStatus::InProgress);
            }
            DomainEvent::TaskCompleted { task_id, summary, .. } => {
                if let Some(t) = state.tasks.get_mut(task_id) {
                    t.status = TaskStatus::Done;
                    t.summary = Some(summary.clone());
                    t.pending_interaction_id = None;
                    t.updated_at = now;
                }
            }
            DomainEvent::TaskFailed { task_id, reason, .. } => {
                if let Some(t) = state.tasks.get_mut(task_id) {
                    t.status = TaskStatus::Failed;
                    t.failure_reason = Some(reason.clone());
                    t.pending_interaction_id = None;
                    t.updated_at = now;
                }
            }
            DomainEvent::TaskCanceled { task_id, .. } => {
                set_status(state, task_id, now, TaskStatus::Canceled);
                if let Some(t) = state.tasks.get_mut(task_id) {
                    t.pending_interaction_id = None;
                }
            }
            DomainEvent::TaskPaused { task_id, .. } => {
                set_status(state, task_id, now, TaskStatus::Paused);
            }
            DomainEvent::TaskResumed { task_id, .. } => {
                set_status(state, task_id, now, TaskStatus::InProgress);
            }
            DomainEvent::TaskTodoUpdated { task_id, todos, .. } => {
                if let Some(t) = state.tasks.get_mut(task_id) {
                    t.todos = todos.clone();
                    t.updated_at = now;
                }
            }
            DomainEvent::UserInteractionRequested {
                task_id,
                interaction_id,
                ..
            } => {
                if let Some(t) = state.tasks.get_mut(task_id) {
                    t.pending_interaction_id = Some(interaction_id.clone());
                    t.status = TaskStatus::AwaitingUser;
                    t.updated_at = now;
                }
            }
            DomainEvent::UserInteractionResponded { task_id, .. } => {
                if let Some(t) = state.tasks.get_mut(task_id) {
                    t.pending_interaction_id = None;
                    if t.status == TaskStatus::AwaitingUser {
                        t.status = TaskStatus::InProgress;
                    }
                    t.updated_at = now;
                }
            }
            // TaskInstructionAdded, AgentPlanPosted, UserFeedbackPosted carry
            // no status change; unknown future variants also fall here.
            _ => {}
        }
    }
}

fn set_status(state: &mut TasksProjection, task_id: &str, now: chrono::DateTime<Utc>, status: TaskStatus) {
    if let Some(t) = state.tasks.get_mut(task_id) {
        t.status = status;
        t.updated_at = now;
    }
}
