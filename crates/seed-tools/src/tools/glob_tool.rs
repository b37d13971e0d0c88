use async_trait::async_trait;
use seed_domain::error::{Error, Result};
use seed_domain::tool::RiskLevel;
use seed_domain::scoped_path::Scope;
use serde::Deserialize;

use crate::registry::{Tool, ToolContext};

#[derive(Debug, Deserialize)]
struct Args {
    pattern: String,
    #[serde(default)]
    ignore: Vec<String>,
}

pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "globTool"
    }

    fn description(&self) -> &str {
        "Find files within the task's scope matching a glob pattern."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string"},
                "ignore": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["pattern"]
        })
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Safe
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<serde_json::Value> {
        let args: Args = serde_json::from_value(args).map_err(Error::Json)?;

        // Resolve against `.` to establish the scope root for this pattern's
        // default scope, then glob-walk rooted at that directory.
        let root = ctx.resolver.resolve(&ctx.task_id, ".")?;
        let ignore_globs: Vec<glob::Pattern> = args
            .ignore
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();

        let full_pattern = root.absolute_path.join(&args.pattern);
        let full_pattern_str = full_pattern.to_string_lossy().to_string();

        let mut matches = Vec::new();
        for entry in glob::glob(&full_pattern_str).map_err(|e| Error::Validation(e.to_string()))? {
            let path = entry.map_err(|e| Error::Other(e.to_string()))?;
            let rel = path.strip_prefix(&root.absolute_path).unwrap_or(&path);
            let rel_str = rel.to_string_lossy().to_string();
            if ignore_globs.iter().any(|g| g.matches(&rel_str)) {
                continue;
            }
            let logical = ctx
                .resolver
                .map_store_path_to_logical(Scope::Private, &root.scope_root_store_path, &root.store_path.join(rel))
                .unwrap_or(rel_str.clone());
            matches.push(logical);
        }
        matches.sort();

        Ok(serde_json::json!({
            "pattern": args.pattern,
            "matches": matches,
            "count": matches.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process_tracker::ProcessTracker;
    use seed_workspace::WorkspaceResolver;
    use std::sync::Arc;
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;

    struct NoTasks;
    impl seed_workspace::TaskAncestry for NoTasks {
        fn root_of(&self, task_id: &str) -> Option<String> {
            Some(task_id.to_string())
        }
        fn has_descendant(&self, _root_task_id: &str) -> bool {
            false
        }
    }

    fn ctx(dir: &std::path::Path) -> ToolContext {
        std::fs::create_dir_all(dir.join("private/T1")).unwrap();
        ToolContext {
            task_id: "T1".into(),
            actor_id: "agent-1".into(),
            base_dir: dir.to_path_buf(),
            resolver: Arc::new(WorkspaceResolver::new(dir.to_path_buf(), Arc::new(NoTasks))),
            cancel: CancellationToken::new(),
            processes: ProcessTracker::new(),
        }
    }

    #[tokio::test]
    async fn finds_matching_files() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("private/T1")).unwrap();
        std::fs::write(dir.path().join("private/T1/a.rs"), "").unwrap();
        std::fs::write(dir.path().join("private/T1/b.txt"), "").unwrap();

        let result = GlobTool.execute(serde_json::json!({"pattern": "*.rs"}), &ctx(dir.path())).await.unwrap();
        assert_eq!(result["count"], 1);
    }
}
