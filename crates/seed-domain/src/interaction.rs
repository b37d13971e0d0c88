use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Confirm,
    Select,
    Input,
    Composite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    PlainText,
    Diff,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionDisplay {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub content_kind: ContentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionStyle {
    Default,
    Destructive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionOption {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<OptionStyle>,
    #[serde(default)]
    pub is_default: bool,
}

/// A request for a human decision that has not yet been resolved.
/// Derived (never stored directly) by scanning the task's event stream for
/// the latest `UserInteractionRequested` lacking a matching `Responded`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingInteraction {
    pub interaction_id: String,
    pub task_id: String,
    pub kind: InteractionKind,
    pub purpose: String,
    pub display: InteractionDisplay,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<InteractionOption>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

pub const PURPOSE_CONFIRM_RISKY_ACTION: &str = "confirm_risky_action";
pub const OPTION_APPROVE: &str = "approve";
pub const OPTION_REJECT: &str = "reject";
