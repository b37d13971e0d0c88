use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use seed_domain::audit::{AuditEntryType, AuditPayload};
use seed_domain::tool::{ToolCall, ToolResult};
use seed_store::AuditLog;

use crate::registry::{ToolContext, ToolRegistry};

/// Runs one tool call end-to-end: lookup, pre-flight check, execution,
/// audit trail — never letting a tool's error escape as anything other
/// than an error `ToolResult`.
pub struct Executor {
    registry: Arc<ToolRegistry>,
    audit: Arc<AuditLog>,
}

impl Executor {
    pub fn new(registry: Arc<ToolRegistry>, audit: Arc<AuditLog>) -> Self {
        Self { registry, audit }
    }

    pub async fn run(&self, call: ToolCall, ctx: &ToolContext) -> ToolResult {
        let Some(tool) = self.registry.get(&call.tool_name) else {
            return ToolResult::error(call.call_id.clone(), format!("unknown tool: {}", call.tool_name));
        };

        let _ = self.audit.append(|id| seed_domain::audit::AuditEntry {
            id,
            entry_type: AuditEntryType::ToolCallRequested,
            payload: AuditPayload {
                tool_call_id: call.call_id.clone(),
                tool_name: call.tool_name.clone(),
                task_id: ctx.task_id.clone(),
                author_actor_id: ctx.actor_id.clone(),
                input: Some(call.arguments.clone()),
                output: None,
                is_error: None,
                duration_ms: None,
                timestamp: Utc::now(),
            },
        });

        let started = Instant::now();

        let result = if let Err(e) = tool.can_execute(&call.arguments, ctx).await {
            ToolResult::error(call.call_id.clone(), e.to_string())
        } else {
            match tool.execute(call.arguments.clone(), ctx).await {
                Ok(output) => ToolResult::ok(call.call_id.clone(), output),
                Err(e) => ToolResult::error(call.call_id.clone(), e.to_string()),
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;

        let _ = self.audit.append(|id| seed_domain::audit::AuditEntry {
            id,
            entry_type: AuditEntryType::ToolCallCompleted,
            payload: AuditPayload {
                tool_call_id: call.call_id.clone(),
                tool_name: call.tool_name.clone(),
                task_id: ctx.task_id.clone(),
                author_actor_id: ctx.actor_id.clone(),
                input: None,
                output: Some(result.output.clone()),
                is_error: Some(result.is_error),
                duration_ms: Some(duration_ms),
                timestamp: Utc::now(),
            },
        });

        result
    }
}
