//! The agent loop: the LLM adapter boundary, prompt construction, the
//! human-in-the-loop interaction service, the UI event bus, the per-task
//! state machine that drives one turn at a time, the dispatcher that fans
//! runtimes out across a bounded pool, and the task command surface.

pub mod agent_runtime;
pub mod interaction_service;
pub mod llm;
pub mod prompt;
pub mod runtime_manager;
pub mod task_service;
pub mod ui_bus;

pub use agent_runtime::{AgentRuntime, StepOutcome};
pub use interaction_service::{InteractionResponse, InteractionService};
pub use llm::{LlmProvider, LlmReply, NullProvider};
pub use runtime_manager::{RuntimeFactory, RuntimeManager, SpawnParams};
pub use task_service::{ProjectionTaskAncestry, TaskService};
pub use ui_bus::{AgentOutputKind, UiBus, UiEvent};
