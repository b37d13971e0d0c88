use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use seed_domain::error::Result;
use seed_domain::tool::RiskLevel;
use seed_workspace::WorkspaceResolver;
use tokio_util::sync::CancellationToken;

use crate::process_tracker::ProcessTracker;

/// Everything a tool needs to act on behalf of one running task, without
/// reaching into the event log or runtime machinery directly.
pub struct ToolContext {
    pub task_id: String,
    pub actor_id: String,
    pub base_dir: PathBuf,
    pub resolver: Arc<WorkspaceResolver>,
    pub cancel: CancellationToken,
    pub processes: Arc<ProcessTracker>,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> serde_json::Value;
    fn risk_level(&self) -> RiskLevel;

    /// Pre-flight check run before `execute`. Default: always allowed.
    async fn can_execute(&self, _args: &serde_json::Value, _ctx: &ToolContext) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<serde_json::Value>;
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn definitions(&self) -> Vec<seed_domain::tool::ToolDefinition> {
        let mut defs: Vec<_> = self
            .tools
            .values()
            .map(|t| seed_domain::tool::ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Populates the registry with the six mandatory built-ins.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register(Arc::new(crate::tools::read_file::ReadFileTool));
        reg.register(Arc::new(crate::tools::edit_file::EditFileTool));
        reg.register(Arc::new(crate::tools::list_files::ListFilesTool));
        reg.register(Arc::new(crate::tools::glob_tool::GlobTool));
        reg.register(Arc::new(crate::tools::grep_tool::GrepTool));
        reg.register(Arc::new(crate::tools::run_command::RunCommandTool::new()));
        reg
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
