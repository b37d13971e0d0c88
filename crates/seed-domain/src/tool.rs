use serde::{Deserialize, Serialize};

/// Provider-agnostic tool call, as requested by an assistant reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// Tool definition exposed to the LLM (JSON-schema parameters).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Risk classification driving whether a tool call must pause for user
/// confirmation before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Risky,
}

/// The outcome of executing one tool call. Never carries a Rust error —
/// failures are folded into `is_error` so the executor can always return one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub output: serde_json::Value,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(tool_call_id: impl Into<String>, output: serde_json::Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            output,
            is_error: false,
        }
    }

    pub fn error(tool_call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            output: serde_json::json!({ "error": message.into() }),
            is_error: true,
        }
    }
}

/// A single turn in a task's conversation with the LLM.
///
/// Mirrors the shape persisted by the conversation log: a message can carry
/// plain content, a reasoning trace, outgoing tool calls (assistant role),
/// or be the paired result of one (tool role).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::plain(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::plain(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, text)
    }

    fn plain(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(text.into()),
            reasoning: None,
            tool_calls: None,
            tool_call_id: None,
            tool_name: None,
        }
    }

    /// An assistant reply carrying tool calls instead of (or alongside) text.
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            reasoning: None,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
            tool_name: None,
        }
    }

    /// The paired `tool` message for a completed or rejected tool call.
    pub fn tool_result(tool_call_id: impl Into<String>, tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            reasoning: None,
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            tool_name: Some(tool_name.into()),
        }
    }

    pub fn has_unresolved_tool_calls(&self) -> bool {
        self.role == Role::Assistant && self.tool_calls.as_ref().is_some_and(|c| !c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_error_sets_is_error() {
        let r = ToolResult::error("c1", "boom");
        assert!(r.is_error);
        assert_eq!(r.output["error"], "boom");
    }

    #[test]
    fn plain_message_has_no_tool_calls() {
        let m = Message::user("hi");
        assert!(!m.has_unresolved_tool_calls());
    }

    #[test]
    fn assistant_tool_calls_message_round_trips() {
        let m = Message::assistant_tool_calls(
            Some("thinking".into()),
            vec![ToolCall {
                call_id: "c1".into(),
                tool_name: "readFile".into(),
                arguments: serde_json::json!({"path": "a.txt"}),
            }],
        );
        assert!(m.has_unresolved_tool_calls());
        let json = serde_json::to_string(&m).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tool_calls.unwrap().len(), 1);
    }
}
