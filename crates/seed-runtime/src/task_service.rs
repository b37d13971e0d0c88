//! Pure command-to-event translator plus read-model access. Every command
//! method makes exactly one `EventLog::append` call; reads never touch the
//! event log directly, only the tasks projection.

use std::sync::Arc;

use seed_domain::error::{Error, Result};
use seed_domain::event::{DomainEvent, StoredEvent};
use seed_domain::task::{Task, TaskPriority, TaskStatus, Todo};
use seed_store::{run_projection, EventLog, ProjectionStore, TasksReducer};

pub struct TaskService {
    log: Arc<EventLog>,
    projections: Arc<ProjectionStore>,
}

impl TaskService {
    pub fn new(log: Arc<EventLog>, projections: Arc<ProjectionStore>) -> Self {
        Self { log, projections }
    }

    pub fn create_task(
        &self,
        task_id: &str,
        title: &str,
        intent: Option<String>,
        priority: TaskPriority,
        agent_id: &str,
        parent_task_id: Option<String>,
        author_actor_id: &str,
    ) -> Result<Vec<StoredEvent>> {
        if title.trim().is_empty() {
            return Err(Error::Validation("title must not be empty".into()));
        }
        self.log.append(
            task_id,
            vec![DomainEvent::TaskCreated {
                task_id: task_id.to_string(),
                title: title.to_string(),
                intent,
                priority,
                agent_id: agent_id.to_string(),
                parent_task_id,
                author_actor_id: author_actor_id.to_string(),
            }],
        )
    }

    pub fn add_instruction(&self, task_id: &str, instruction: &str, author_actor_id: &str) -> Result<Vec<StoredEvent>> {
        self.require_non_terminal(task_id)?;
        self.log.append(
            task_id,
            vec![DomainEvent::TaskInstructionAdded {
                task_id: task_id.to_string(),
                instruction: instruction.to_string(),
                author_actor_id: author_actor_id.to_string(),
            }],
        )
    }

    pub fn pause_task(&self, task_id: &str, author_actor_id: &str) -> Result<Vec<StoredEvent>> {
        self.require_non_terminal(task_id)?;
        self.log.append(
            task_id,
            vec![DomainEvent::TaskPaused {
                task_id: task_id.to_string(),
                author_actor_id: author_actor_id.to_string(),
            }],
        )
    }

    pub fn resume_task(&self, task_id: &str, author_actor_id: &str) -> Result<Vec<StoredEvent>> {
        self.require_non_terminal(task_id)?;
        self.log.append(
            task_id,
            vec![DomainEvent::TaskResumed {
                task_id: task_id.to_string(),
                author_actor_id: author_actor_id.to_string(),
            }],
        )
    }

    pub fn cancel_task(&self, task_id: &str, author_actor_id: &str) -> Result<Vec<StoredEvent>> {
        self.require_non_terminal(task_id)?;
        self.log.append(
            task_id,
            vec![DomainEvent::TaskCanceled {
                task_id: task_id.to_string(),
                author_actor_id: author_actor_id.to_string(),
            }],
        )
    }

    pub fn set_todos(&self, task_id: &str, todos: Vec<Todo>, author_actor_id: &str) -> Result<Vec<StoredEvent>> {
        self.require_non_terminal(task_id)?;
        self.log.append(
            task_id,
            vec![DomainEvent::TaskTodoUpdated {
                task_id: task_id.to_string(),
                todos,
                author_actor_id: author_actor_id.to_string(),
            }],
        )
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        let projection = run_projection::<TasksReducer>(&self.log, &self.projections)?;
        let mut tasks: Vec<Task> = projection.tasks.into_values().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(tasks)
    }

    pub fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        let projection = run_projection::<TasksReducer>(&self.log, &self.projections)?;
        Ok(projection.tasks.get(task_id).cloned())
    }

    fn require_non_terminal(&self, task_id: &str) -> Result<()> {
        let task = self
            .get_task(task_id)?
            .ok_or_else(|| Error::NotFound(format!("unknown task {task_id}")))?;
        if task.status.is_terminal() {
            return Err(Error::Conflict(format!("task {task_id} is already {:?}", task.status)));
        }
        Ok(())
    }
}

/// Answers the workspace resolver's `TaskAncestry` questions from the tasks
/// projection, so `shared:/` root-finding and "has this root been forked"
/// checks stay in sync with the event log instead of needing their own
/// bookkeeping.
pub struct ProjectionTaskAncestry {
    service: Arc<TaskService>,
}

impl ProjectionTaskAncestry {
    pub fn new(service: Arc<TaskService>) -> Self {
        Self { service }
    }
}

impl seed_workspace::TaskAncestry for ProjectionTaskAncestry {
    fn root_of(&self, task_id: &str) -> Option<String> {
        let mut current = self.service.get_task(task_id).ok().flatten()?;
        while let Some(parent_id) = current.parent_task_id.clone() {
            current = self.service.get_task(&parent_id).ok().flatten()?;
        }
        Some(current.task_id)
    }

    fn has_descendant(&self, root_task_id: &str) -> bool {
        let Ok(tasks) = self.service.list_tasks() else {
            return false;
        };
        tasks.iter().any(|t| t.parent_task_id.as_deref() == Some(root_task_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn service(dir: &std::path::Path) -> TaskService {
        let log = EventLog::open(dir.join("events.jsonl")).unwrap();
        let projections = Arc::new(ProjectionStore::open(dir.join("projections.jsonl")).unwrap());
        TaskService::new(log, projections)
    }

    #[test]
    fn create_task_rejects_empty_title() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        let err = svc
            .create_task("T1", "  ", None, TaskPriority::Normal, "agent-1", None, "human-1")
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn create_then_list_reflects_new_task() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        svc.create_task("T1", "Hello", None, TaskPriority::Normal, "agent-1", None, "human-1")
            .unwrap();
        let tasks = svc.list_tasks().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Open);
    }

    #[test]
    fn cancel_terminal_task_is_conflict() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        svc.create_task("T1", "Hello", None, TaskPriority::Normal, "agent-1", None, "human-1")
            .unwrap();
        svc.cancel_task("T1", "human-1").unwrap();
        let err = svc.cancel_task("T1", "human-1").unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn add_instruction_to_unknown_task_is_not_found() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        let err = svc.add_instruction("ghost", "do more", "human-1").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
