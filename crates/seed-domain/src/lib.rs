pub mod actor;
pub mod audit;
pub mod config;
pub mod conversation;
pub mod error;
pub mod event;
pub mod interaction;
pub mod scoped_path;
pub mod stream;
pub mod task;
pub mod tool;
pub mod trace;

pub use actor::{Actor, ActorKind};
pub use audit::{AuditEntry, AuditEntryType, AuditPayload};
pub use config::Config;
pub use conversation::ConversationEntry;
pub use error::{Error, Result};
pub use event::{DomainEvent, ProjectionRow, StoredEvent};
pub use interaction::{InteractionKind, PendingInteraction};
pub use scoped_path::{Scope, ScopedPath};
pub use task::{Task, TaskPriority, TaskStatus, Todo};
pub use tool::{Message, Role, RiskLevel, ToolCall, ToolDefinition, ToolResult};
