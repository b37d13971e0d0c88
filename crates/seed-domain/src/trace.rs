use serde::Serialize;

/// Structured trace events mirroring significant state transitions. These
/// are an ambient diagnostic channel on top of `tracing` — never a
/// substitute for the durable event log, audit log, or conversation log.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    EventAppended {
        stream_id: String,
        event_id: u64,
        seq: u64,
        event_type: String,
    },
    ProjectionRebuilt {
        name: String,
        cursor_event_id: u64,
        events_folded: usize,
    },
    ToolCallStarted {
        task_id: String,
        tool_name: String,
        call_id: String,
        risk_level: String,
    },
    ToolCallFinished {
        task_id: String,
        tool_name: String,
        call_id: String,
        is_error: bool,
        duration_ms: u64,
    },
    InteractionRequested {
        task_id: String,
        interaction_id: String,
        purpose: String,
    },
    InteractionResolved {
        task_id: String,
        interaction_id: String,
        selected_option_id: Option<String>,
    },
    RuntimeSpawned {
        task_id: String,
        agent_id: String,
    },
    RuntimeTornDown {
        task_id: String,
        final_status: String,
    },
    ConversationRepaired {
        task_id: String,
        tool_call_id: String,
        source: RepairSource,
    },
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairSource {
    AuditLog,
    Reissued,
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "seed_event");
    }
}
