use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::{TaskPriority, Todo};

/// The closed set of domain event payloads. Tagged so the on-disk shape is
/// `{"type": "...", "payload": {...}}`. Unknown fields inside a known
/// variant's payload are tolerated by serde's default struct deserialization
/// (extra JSON keys are simply ignored); unknown variants are rejected by
/// `serde_json::from_value` and must be handled by the caller (readers of
/// the raw log tolerate this per the log's own skip-and-warn policy).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum DomainEvent {
    TaskCreated {
        task_id: String,
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        intent: Option<String>,
        priority: TaskPriority,
        agent_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_task_id: Option<String>,
        author_actor_id: String,
    },
    TaskStarted {
        task_id: String,
        author_actor_id: String,
    },
    TaskCompleted {
        task_id: String,
        summary: String,
        author_actor_id: String,
    },
    TaskFailed {
        task_id: String,
        reason: String,
        author_actor_id: String,
    },
    TaskCanceled {
        task_id: String,
        author_actor_id: String,
    },
    TaskPaused {
        task_id: String,
        author_actor_id: String,
    },
    TaskResumed {
        task_id: String,
        author_actor_id: String,
    },
    TaskInstructionAdded {
        task_id: String,
        instruction: String,
        author_actor_id: String,
    },
    TaskTodoUpdated {
        task_id: String,
        todos: Vec<Todo>,
        author_actor_id: String,
    },
    AgentPlanPosted {
        task_id: String,
        plan: String,
        author_actor_id: String,
    },
    UserInteractionRequested {
        task_id: String,
        interaction_id: String,
        kind: crate::interaction::InteractionKind,
        purpose: String,
        display: crate::interaction::InteractionDisplay,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<Vec<crate::interaction::InteractionOption>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deadline: Option<DateTime<Utc>>,
        author_actor_id: String,
    },
    UserInteractionResponded {
        task_id: String,
        interaction_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selected_option_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input_value: Option<Value>,
        author_actor_id: String,
    },
    UserFeedbackPosted {
        task_id: String,
        feedback: String,
        author_actor_id: String,
    },
}

impl DomainEvent {
    /// The task this event concerns, if any. Used to derive `streamId`
    /// (the stream id is the task id for every event kind above).
    pub fn task_id(&self) -> &str {
        match self {
            DomainEvent::TaskCreated { task_id, .. }
            | DomainEvent::TaskStarted { task_id, .. }
            | DomainEvent::TaskCompleted { task_id, .. }
            | DomainEvent::TaskFailed { task_id, .. }
            | DomainEvent::TaskCanceled { task_id, .. }
            | DomainEvent::TaskPaused { task_id, .. }
            | DomainEvent::TaskResumed { task_id, .. }
            | DomainEvent::TaskInstructionAdded { task_id, .. }
            | DomainEvent::TaskTodoUpdated { task_id, .. }
            | DomainEvent::AgentPlanPosted { task_id, .. }
            | DomainEvent::UserInteractionRequested { task_id, .. }
            | DomainEvent::UserInteractionResponded { task_id, .. }
            | DomainEvent::UserFeedbackPosted { task_id, .. } => task_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::TaskCreated { .. } => "TaskCreated",
            DomainEvent::TaskStarted { .. } => "TaskStarted",
            DomainEvent::TaskCompleted { .. } => "TaskCompleted",
            DomainEvent::TaskFailed { .. } => "TaskFailed",
            DomainEvent::TaskCanceled { .. } => "TaskCanceled",
            DomainEvent::TaskPaused { .. } => "TaskPaused",
            DomainEvent::TaskResumed { .. } => "TaskResumed",
            DomainEvent::TaskInstructionAdded { .. } => "TaskInstructionAdded",
            DomainEvent::TaskTodoUpdated { .. } => "TaskTodoUpdated",
            DomainEvent::AgentPlanPosted { .. } => "AgentPlanPosted",
            DomainEvent::UserInteractionRequested { .. } => "UserInteractionRequested",
            DomainEvent::UserInteractionResponded { .. } => "UserInteractionResponded",
            DomainEvent::UserFeedbackPosted { .. } => "UserFeedbackPosted",
        }
    }
}

/// An event as it exists durably in the log: the payload plus the metadata
/// assigned atomically at append time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: u64,
    pub stream_id: String,
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: DomainEvent,
}

/// A durable projection row: a cursor into the log plus the folded state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionRow<S> {
    pub name: String,
    pub cursor_event_id: u64,
    pub state: S,
    pub updated_at: DateTime<Utc>,
}
