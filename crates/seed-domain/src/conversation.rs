use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tool::Message;

/// One entry in a task's conversation log. `id` is global and unique across
/// every task sharing the same `state/conversations.jsonl` file; `index` is
/// the per-task position, starting at 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub id: u64,
    pub task_id: String,
    pub index: u64,
    pub message: Message,
    pub created_at: DateTime<Utc>,
}
