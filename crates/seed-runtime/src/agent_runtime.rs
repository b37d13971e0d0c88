//! Drives one task's agent loop as an explicit state machine, one
//! `drive_once` call per LLM turn or tool dispatch rather than an async
//! generator, so a crash between calls leaves durable state a later
//! `drive_once` can resume from.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use seed_domain::audit::AuditEntryType;
use seed_domain::error::Result;
use seed_domain::event::DomainEvent;
use seed_domain::interaction::{
    ContentKind, InteractionDisplay, InteractionKind, InteractionOption, OptionStyle, OPTION_APPROVE, OPTION_REJECT,
    PURPOSE_CONFIRM_RISKY_ACTION,
};
use seed_domain::tool::{Message, RiskLevel, Role, ToolCall, ToolResult};
use seed_store::{AuditLog, ConversationLog, EventLog};
use tokio_util::sync::CancellationToken;

use crate::interaction_service::InteractionService;
use crate::llm::LlmProvider;
use crate::prompt::{build_system_prompt, build_user_seed};
use crate::ui_bus::{AgentOutputKind, UiBus, UiEvent};
use seed_tools::executor::Executor;
use seed_tools::registry::{ToolContext, ToolRegistry};

/// What happened on the last `drive_once` call, and whether the caller
/// should call it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    AwaitingUser,
    Completed,
    Failed,
    Canceled,
}

struct PendingConfirmation {
    interaction_id: String,
    call: ToolCall,
}

pub struct AgentRuntime {
    pub task_id: String,
    agent_id: String,
    title: String,
    intent: Option<String>,
    workspace_path: std::path::PathBuf,
    agents_md: std::path::PathBuf,
    log: Arc<EventLog>,
    conversations: Arc<ConversationLog>,
    audit: Arc<AuditLog>,
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    executor: Arc<Executor>,
    tool_ctx: ToolContext,
    interactions: Arc<InteractionService>,
    ui_bus: Option<Arc<UiBus>>,
    cancel: CancellationToken,
    max_iterations: u32,
    iteration: u32,
    pending_calls: VecDeque<ToolCall>,
    paused: Option<PendingConfirmation>,
    last_instruction_event_id: u64,
}

#[allow(clippy::too_many_arguments)]
impl AgentRuntime {
    pub fn new(
        task_id: String,
        agent_id: String,
        title: String,
        intent: Option<String>,
        workspace_path: std::path::PathBuf,
        agents_md: std::path::PathBuf,
        log: Arc<EventLog>,
        conversations: Arc<ConversationLog>,
        audit: Arc<AuditLog>,
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        executor: Arc<Executor>,
        tool_ctx: ToolContext,
        interactions: Arc<InteractionService>,
        ui_bus: Option<Arc<UiBus>>,
        cancel: CancellationToken,
        max_iterations: u32,
    ) -> Self {
        Self {
            task_id,
            agent_id,
            title,
            intent,
            workspace_path,
            agents_md,
            log,
            conversations,
            audit,
            provider,
            tools,
            executor,
            tool_ctx,
            interactions,
            ui_bus,
            cancel,
            max_iterations,
            iteration: 0,
            pending_calls: VecDeque::new(),
            paused: None,
            last_instruction_event_id: 0,
        }
    }

    /// Advances the task by exactly one step: a tool dispatch, a resumed
    /// confirmation, or one LLM call. Callers loop `while Continue == ...`.
    pub async fn drive_once(&mut self) -> Result<StepOutcome> {
        if self.cancel.is_cancelled() {
            self.log.append(
                &self.task_id,
                vec![DomainEvent::TaskCanceled {
                    task_id: self.task_id.clone(),
                    author_actor_id: self.agent_id.clone(),
                }],
            )?;
            return Ok(StepOutcome::Canceled);
        }

        if let Some(pending) = self.paused.take() {
            match self.interactions.get_response(&self.task_id, &pending.interaction_id)? {
                None => {
                    self.paused = Some(pending);
                    return Ok(StepOutcome::AwaitingUser);
                }
                Some(resp) => {
                    self.resolve_confirmation(pending, resp).await?;
                    return Ok(StepOutcome::Continue);
                }
            }
        }

        if let Some(call) = self.pending_calls.pop_front() {
            return self.dispatch_tool_call(call).await;
        }

        self.take_llm_turn().await
    }

    async fn dispatch_tool_call(&mut self, call: ToolCall) -> Result<StepOutcome> {
        let risk = self.tools.get(&call.tool_name).map(|t| t.risk_level()).unwrap_or(RiskLevel::Safe);

        if risk == RiskLevel::Safe {
            let result = self.executor.run(call.clone(), &self.tool_ctx).await;
            self.persist_tool_result(&call, &result)?;
            return Ok(StepOutcome::Continue);
        }

        let tool = self.tools.get(&call.tool_name);
        let preflight = match &tool {
            Some(t) => t.can_execute(&call.arguments, &self.tool_ctx).await,
            None => Ok(()),
        };
        if preflight.is_err() {
            let result = self.executor.run(call.clone(), &self.tool_ctx).await;
            self.persist_tool_result(&call, &result)?;
            return Ok(StepOutcome::Continue);
        }

        let display = InteractionDisplay {
            title: format!("Run {}?", call.tool_name),
            description: tool.as_ref().map(|t| t.description().to_string()),
            content_kind: ContentKind::Json,
            content: Some(call.arguments.to_string()),
        };
        let options = vec![
            InteractionOption {
                id: OPTION_APPROVE.into(),
                label: "Approve".into(),
                style: None,
                is_default: true,
            },
            InteractionOption {
                id: OPTION_REJECT.into(),
                label: "Reject".into(),
                style: Some(OptionStyle::Destructive),
                is_default: false,
            },
        ];
        let interaction_id = self.interactions.request(
            &self.task_id,
            InteractionKind::Confirm,
            PURPOSE_CONFIRM_RISKY_ACTION,
            display,
            Some(options),
            None,
            &self.agent_id,
        )?;

        self.publish(UiEvent::TaskUpdated {
            task_id: self.task_id.clone(),
            status: seed_domain::task::TaskStatus::AwaitingUser,
        });

        self.paused = Some(PendingConfirmation { interaction_id, call });
        Ok(StepOutcome::AwaitingUser)
    }

    async fn resolve_confirmation(&mut self, pending: PendingConfirmation, resp: crate::interaction_service::InteractionResponse) -> Result<()> {
        let approved = resp.selected_option_id.as_deref() == Some(OPTION_APPROVE);
        if approved {
            let result = self.executor.run(pending.call.clone(), &self.tool_ctx).await;
            self.persist_tool_result(&pending.call, &result)?;
        } else {
            let result = ToolResult::error(pending.call.call_id.clone(), "rejected by user");
            self.persist_tool_result(&pending.call, &result)?;
        }
        Ok(())
    }

    fn persist_tool_result(&self, call: &ToolCall, result: &ToolResult) -> Result<()> {
        self.conversations.append(
            &self.task_id,
            Message::tool_result(call.call_id.clone(), call.tool_name.clone(), result.output.to_string()),
        )?;
        self.publish(UiEvent::AgentOutput {
            task_id: self.task_id.clone(),
            kind: if result.is_error { AgentOutputKind::Error } else { AgentOutputKind::ToolResult },
            text: result.output.to_string(),
        });
        Ok(())
    }

    async fn take_llm_turn(&mut self) -> Result<StepOutcome> {
        self.iteration += 1;
        if self.iteration > self.max_iterations {
            self.log.append(
                &self.task_id,
                vec![DomainEvent::TaskFailed {
                    task_id: self.task_id.clone(),
                    reason: "max iterations reached".into(),
                    author_actor_id: self.agent_id.clone(),
                }],
            )?;
            return Ok(StepOutcome::Failed);
        }

        let mut entries = self.conversations.get_messages(&self.task_id)?;

        if entries.is_empty() {
            self.log.append(
                &self.task_id,
                vec![DomainEvent::TaskStarted {
                    task_id: self.task_id.clone(),
                    author_actor_id: self.agent_id.clone(),
                }],
            )?;
            let system = build_system_prompt(&self.workspace_path, &self.agents_md, Utc::now());
            let user = build_user_seed(&self.title, self.intent.as_deref());
            self.conversations.append(&self.task_id, Message::system(system))?;
            self.conversations.append(&self.task_id, Message::user(user))?;
            entries = self.conversations.get_messages(&self.task_id)?;
        } else {
            self.inject_new_instructions()?;

            let still_pending = repair_tail(&self.task_id, &self.conversations, &self.audit)?;
            if !still_pending.is_empty() {
                self.iteration -= 1;
                self.pending_calls.extend(still_pending);
                return Ok(StepOutcome::Continue);
            }
            entries = self.conversations.get_messages(&self.task_id)?;
        }

        let messages: Vec<Message> = entries.into_iter().map(|e| e.message).collect();
        let defs = self.tools.definitions();

        let reply = match self.provider.complete(&messages, &defs).await {
            Ok(reply) => reply,
            Err(e) => {
                self.log.append(
                    &self.task_id,
                    vec![DomainEvent::TaskFailed {
                        task_id: self.task_id.clone(),
                        reason: e.to_string(),
                        author_actor_id: self.agent_id.clone(),
                    }],
                )?;
                return Ok(StepOutcome::Failed);
            }
        };

        if let Some(text) = &reply.content {
            self.publish(UiEvent::AgentOutput {
                task_id: self.task_id.clone(),
                kind: AgentOutputKind::Text,
                text: text.clone(),
            });
        }

        let assistant = Message {
            role: Role::Assistant,
            content: reply.content.clone(),
            reasoning: reply.reasoning.clone(),
            tool_calls: if reply.tool_calls.is_empty() { None } else { Some(reply.tool_calls.clone()) },
            tool_call_id: None,
            tool_name: None,
        };
        self.conversations.append(&self.task_id, assistant)?;

        if reply.tool_calls.is_empty() {
            self.log.append(
                &self.task_id,
                vec![DomainEvent::TaskCompleted {
                    task_id: self.task_id.clone(),
                    summary: reply.content.unwrap_or_default(),
                    author_actor_id: self.agent_id.clone(),
                }],
            )?;
            return Ok(StepOutcome::Completed);
        }

        self.pending_calls = reply.tool_calls.into_iter().collect();
        Ok(StepOutcome::Continue)
    }

    fn inject_new_instructions(&mut self) -> Result<()> {
        let events = self.log.read_stream(&self.task_id, 1)?;
        for stored in events {
            if stored.id <= self.last_instruction_event_id {
                continue;
            }
            if let DomainEvent::TaskInstructionAdded { instruction, .. } = &stored.event {
                self.conversations.append(&self.task_id, Message::user(instruction.clone()))?;
            }
            self.last_instruction_event_id = self.last_instruction_event_id.max(stored.id);
        }
        Ok(())
    }

    fn publish(&self, event: UiEvent) {
        if let Some(bus) = &self.ui_bus {
            bus.publish(event);
        }
    }
}

/// Finds the last assistant message with unresolved tool calls and, for
/// each call lacking a paired `tool` message, looks for a completed audit
/// record to synthesize one from. Calls with no audit record are returned
/// to the caller to re-execute. Keeps the "every tool call has a paired
/// result" invariant intact across a crash between tool execution and
/// conversation persistence.
fn repair_tail(task_id: &str, conversations: &ConversationLog, audit: &AuditLog) -> Result<Vec<ToolCall>> {
    let entries = conversations.get_messages(task_id)?;
    let Some((idx, last)) = entries
        .iter()
        .enumerate()
        .rev()
        .find(|(_, e)| e.message.has_unresolved_tool_calls())
    else {
        return Ok(Vec::new());
    };

    let resolved: std::collections::HashSet<String> = entries[idx + 1..]
        .iter()
        .filter_map(|e| e.message.tool_call_id.clone())
        .collect();

    let calls = last.message.tool_calls.clone().unwrap_or_default();
    let audit_entries = audit.read_by_task(task_id)?;
    let mut still_pending = Vec::new();

    for call in calls {
        if resolved.contains(&call.call_id) {
            continue;
        }
        let completed = audit_entries.iter().rev().find(|a| {
            a.entry_type == AuditEntryType::ToolCallCompleted && a.payload.tool_call_id == call.call_id
        });
        match completed {
            Some(entry) => {
                let output = entry.payload.output.clone().unwrap_or(serde_json::Value::Null);
                conversations.append(
                    task_id,
                    Message::tool_result(call.call_id.clone(), call.tool_name.clone(), output.to_string()),
                )?;
            }
            None => still_pending.push(call),
        }
    }
    Ok(still_pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmReply, NullProvider};
    use seed_domain::task::TaskPriority;
    use seed_tools::process_tracker::ProcessTracker;
    use seed_workspace::{TaskAncestry, WorkspaceResolver};
    use tempfile::tempdir;

    struct NoTasks;
    impl TaskAncestry for NoTasks {
        fn root_of(&self, task_id: &str) -> Option<String> {
            Some(task_id.to_string())
        }
        fn has_descendant(&self, _root_task_id: &str) -> bool {
            false
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        log: Arc<EventLog>,
        conversations: Arc<ConversationLog>,
        audit: Arc<AuditLog>,
        tools: Arc<ToolRegistry>,
        executor: Arc<Executor>,
        interactions: Arc<InteractionService>,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let log = EventLog::open(dir.path().join("events.jsonl")).unwrap();
        let conversations = Arc::new(ConversationLog::open(dir.path().join("conversations.jsonl")).unwrap());
        let audit = AuditLog::open(dir.path().join("audit.jsonl")).unwrap();
        let tools = Arc::new(ToolRegistry::with_builtins());
        let executor = Arc::new(Executor::new(tools.clone(), audit.clone()));
        let interactions = Arc::new(InteractionService::new(log.clone()));
        Fixture { dir, log, conversations, audit, tools, executor, interactions }
    }

    fn tool_ctx(f: &Fixture) -> ToolContext {
        ToolContext {
            task_id: "T1".into(),
            actor_id: "agent-1".into(),
            base_dir: f.dir.path().to_path_buf(),
            resolver: Arc::new(WorkspaceResolver::new(f.dir.path().to_path_buf(), Arc::new(NoTasks))),
            cancel: CancellationToken::new(),
            processes: ProcessTracker::new(),
        }
    }

    fn runtime(f: &Fixture, provider: Arc<dyn LlmProvider>) -> AgentRuntime {
        f.log
            .append(
                "T1",
                vec![DomainEvent::TaskCreated {
                    task_id: "T1".into(),
                    title: "Say hi".into(),
                    intent: None,
                    priority: TaskPriority::Normal,
                    agent_id: "agent-1".into(),
                    parent_task_id: None,
                    author_actor_id: "human-1".into(),
                }],
            )
            .unwrap();
        AgentRuntime::new(
            "T1".into(),
            "agent-1".into(),
            "Say hi".into(),
            None,
            f.dir.path().to_path_buf(),
            std::path::PathBuf::from("AGENTS.md"),
            f.log.clone(),
            f.conversations.clone(),
            f.audit.clone(),
            provider,
            f.tools.clone(),
            f.executor.clone(),
            tool_ctx(f),
            f.interactions.clone(),
            None,
            CancellationToken::new(),
            50,
        )
    }

    #[tokio::test]
    async fn create_to_completion_with_no_tool_calls() {
        let f = fixture();
        let provider = Arc::new(NullProvider::single_text("done"));
        let mut rt = runtime(&f, provider);

        let mut outcome = rt.drive_once().await.unwrap();
        assert_eq!(outcome, StepOutcome::Continue);
        outcome = rt.drive_once().await.unwrap();
        assert_eq!(outcome, StepOutcome::Completed);

        let events = f.log.read_stream("T1", 1).unwrap();
        assert!(events.iter().any(|e| matches!(e.event, DomainEvent::TaskCompleted { .. })));
    }

    #[tokio::test]
    async fn risky_tool_call_pauses_then_runs_on_approval() {
        let f = fixture();
        let call = ToolCall {
            call_id: "c1".into(),
            tool_name: "runCommand".into(),
            arguments: serde_json::json!({"command": "echo hi"}),
        };
        let provider = Arc::new(NullProvider::new(vec![
            LlmReply { content: None, tool_calls: vec![call], ..Default::default() },
            LlmReply { content: Some("ok".into()), ..Default::default() },
        ]));
        let mut rt = runtime(&f, provider);

        assert_eq!(rt.drive_once().await.unwrap(), StepOutcome::Continue); // seed
        assert_eq!(rt.drive_once().await.unwrap(), StepOutcome::Continue); // llm turn -> queues tool call
        assert_eq!(rt.drive_once().await.unwrap(), StepOutcome::AwaitingUser); // risky dispatch

        let pending = f.interactions.get_pending("T1").unwrap().unwrap();
        f.interactions
            .respond("T1", &pending.interaction_id, Some(OPTION_APPROVE.into()), None, "human-1")
            .unwrap();

        assert_eq!(rt.drive_once().await.unwrap(), StepOutcome::Continue); // resolves confirmation
        assert_eq!(rt.drive_once().await.unwrap(), StepOutcome::Completed);
    }

    #[tokio::test]
    async fn risky_tool_call_rejected_is_not_executed() {
        let f = fixture();
        let call = ToolCall {
            call_id: "c1".into(),
            tool_name: "runCommand".into(),
            arguments: serde_json::json!({"command": "rm -rf /tmp/whatever"}),
        };
        let provider = Arc::new(NullProvider::new(vec![
            LlmReply { content: None, tool_calls: vec![call], ..Default::default() },
            LlmReply { content: Some("ok".into()), ..Default::default() },
        ]));
        let mut rt = runtime(&f, provider);

        rt.drive_once().await.unwrap();
        rt.drive_once().await.unwrap();
        assert_eq!(rt.drive_once().await.unwrap(), StepOutcome::AwaitingUser);

        let pending = f.interactions.get_pending("T1").unwrap().unwrap();
        f.interactions
            .respond("T1", &pending.interaction_id, Some(OPTION_REJECT.into()), None, "human-1")
            .unwrap();
        rt.drive_once().await.unwrap();

        let messages = f.conversations.get_messages("T1").unwrap();
        let tool_msg = messages.iter().find(|e| e.message.role == Role::Tool).unwrap();
        assert!(tool_msg.message.content.as_deref().unwrap().contains("rejected by user"));
    }

    #[tokio::test]
    async fn repair_tail_synthesizes_result_from_audit_after_crash() {
        let f = fixture();
        f.log
            .append(
                "T1",
                vec![DomainEvent::TaskCreated {
                    task_id: "T1".into(),
                    title: "Say hi".into(),
                    intent: None,
                    priority: TaskPriority::Normal,
                    agent_id: "agent-1".into(),
                    parent_task_id: None,
                    author_actor_id: "human-1".into(),
                }],
            )
            .unwrap();

        f.conversations.append("T1", Message::system("sys")).unwrap();
        f.conversations.append("T1", Message::user("hi")).unwrap();
        let call = ToolCall {
            call_id: "c1".into(),
            tool_name: "readFile".into(),
            arguments: serde_json::json!({"path": "a.txt"}),
        };
        f.conversations
            .append("T1", Message::assistant_tool_calls(None, vec![call.clone()]))
            .unwrap();

        f.audit
            .append(|id| seed_domain::audit::AuditEntry {
                id,
                entry_type: AuditEntryType::ToolCallCompleted,
                payload: seed_domain::audit::AuditPayload {
                    tool_call_id: "c1".into(),
                    tool_name: "readFile".into(),
                    task_id: "T1".into(),
                    author_actor_id: "agent-1".into(),
                    input: None,
                    output: Some(serde_json::json!({"content": "hello"})),
                    is_error: Some(false),
                    duration_ms: Some(5),
                    timestamp: Utc::now(),
                },
            })
            .unwrap();

        let still_pending = repair_tail("T1", &f.conversations, &f.audit).unwrap();
        assert!(still_pending.is_empty());

        let messages = f.conversations.get_messages("T1").unwrap();
        let tool_msg = messages.last().unwrap();
        assert_eq!(tool_msg.message.tool_call_id.as_deref(), Some("c1"));
        assert!(tool_msg.message.content.as_deref().unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn repair_tail_reports_still_pending_when_no_audit_record() {
        let f = fixture();
        f.conversations.append("T1", Message::system("sys")).unwrap();
        let call = ToolCall {
            call_id: "c2".into(),
            tool_name: "readFile".into(),
            arguments: serde_json::json!({"path": "a.txt"}),
        };
        f.conversations
            .append("T1", Message::assistant_tool_calls(None, vec![call.clone()]))
            .unwrap();

        let still_pending = repair_tail("T1", &f.conversations, &f.audit).unwrap();
        assert_eq!(still_pending.len(), 1);
        assert_eq!(still_pending[0].call_id, "c2");
    }

    #[tokio::test]
    async fn cancellation_is_terminal() {
        let f = fixture();
        let provider = Arc::new(NullProvider::single_text("done"));
        let mut rt = runtime(&f, provider);
        rt.cancel.cancel();
        assert_eq!(rt.drive_once().await.unwrap(), StepOutcome::Canceled);
    }
}
