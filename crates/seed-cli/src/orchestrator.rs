//! Wires every component together: event log, projections, conversation
//! and audit logs, the tool registry/executor, the interaction service,
//! the UI bus, and the runtime manager that drives tasks. Grounded on the
//! shape of an `AppState` aggregate — built once at startup and handed to
//! whatever needs it, minus the HTTP-specific fields this system has no
//! use for.

use std::sync::Arc;

use seed_domain::config::Config;
use seed_domain::error::Result;
use seed_store::{AuditLog, ConversationLog, EventLog, ProjectionStore};
use seed_runtime::runtime_manager::{RuntimeFactory, SpawnParams};
use seed_runtime::{AgentRuntime, InteractionService, NullProvider, ProjectionTaskAncestry, RuntimeManager, TaskService, UiBus};
use seed_tools::registry::ToolContext;
use seed_tools::{Executor, ProcessTracker, ToolRegistry};
use tokio_util::sync::CancellationToken;

pub struct Orchestrator {
    pub config: Config,
    pub log: Arc<EventLog>,
    pub projections: Arc<ProjectionStore>,
    pub conversations: Arc<ConversationLog>,
    pub audit: Arc<AuditLog>,
    pub tools: Arc<ToolRegistry>,
    pub executor: Arc<Executor>,
    pub interactions: Arc<InteractionService>,
    pub ui_bus: Arc<UiBus>,
    pub tasks: Arc<TaskService>,
    pub runtimes: Arc<RuntimeManager>,
}

impl Orchestrator {
    pub fn bootstrap(config: Config) -> Result<Arc<Self>> {
        let workspace_path = config.workspace.path.clone();
        std::fs::create_dir_all(&workspace_path)?;
        let state_dir = workspace_path.join("state");
        std::fs::create_dir_all(&state_dir)?;
        std::fs::create_dir_all(workspace_path.join("private"))?;
        std::fs::create_dir_all(workspace_path.join("shared"))?;
        std::fs::create_dir_all(workspace_path.join("public"))?;

        let log = EventLog::open(state_dir.join("events.jsonl"))?;
        let projections = Arc::new(ProjectionStore::open(state_dir.join("projections.jsonl"))?);
        let conversations = Arc::new(ConversationLog::open(state_dir.join("conversations.jsonl"))?);
        let audit = AuditLog::open(state_dir.join("audit.jsonl"))?;

        let tools = Arc::new(ToolRegistry::with_builtins());
        let executor = Arc::new(Executor::new(tools.clone(), audit.clone()));
        let interactions = Arc::new(InteractionService::new(log.clone()));
        let ui_bus = Arc::new(UiBus::new(config.runtime.ui_bus_capacity));
        let tasks = Arc::new(TaskService::new(log.clone(), projections.clone()));

        let ancestry = Arc::new(ProjectionTaskAncestry::new(tasks.clone()));
        let max_iterations = config.runtime.max_iterations;
        let agents_md = config.workspace.agents_md.clone();
        let workspace_path_for_factory = workspace_path.clone();

        let tools_for_factory = tools.clone();
        let executor_for_factory = executor.clone();
        let log_for_factory = log.clone();
        let conversations_for_factory = conversations.clone();
        let audit_for_factory = audit.clone();
        let interactions_for_factory = interactions.clone();
        let ui_bus_for_factory = ui_bus.clone();

        let factory: RuntimeFactory = Arc::new(move |params: SpawnParams, cancel: CancellationToken| {
            let tool_ctx = ToolContext {
                task_id: params.task_id.clone(),
                actor_id: params.agent_id.clone(),
                base_dir: workspace_path_for_factory.clone(),
                resolver: Arc::new(seed_workspace::WorkspaceResolver::new(workspace_path_for_factory.clone(), ancestry.clone())),
                cancel: cancel.clone(),
                processes: ProcessTracker::new(),
            };
            AgentRuntime::new(
                params.task_id,
                params.agent_id,
                params.title,
                params.intent,
                workspace_path_for_factory.clone(),
                agents_md.clone(),
                log_for_factory.clone(),
                conversations_for_factory.clone(),
                audit_for_factory.clone(),
                Arc::new(NullProvider::single_text(
                    "No LLM provider is configured for this workspace; wire a concrete provider to continue.",
                )),
                tools_for_factory.clone(),
                executor_for_factory.clone(),
                tool_ctx,
                interactions_for_factory.clone(),
                Some(ui_bus_for_factory.clone()),
                cancel,
                max_iterations,
            )
        });

        let runtimes = RuntimeManager::new(log.clone(), factory, config.runtime.max_concurrent_runtimes);
        runtimes.spawn_dispatcher();

        Ok(Arc::new(Self {
            config,
            log,
            projections,
            conversations,
            audit,
            tools,
            executor,
            interactions,
            ui_bus,
            tasks,
            runtimes,
        }))
    }
}
