use async_trait::async_trait;
use seed_domain::error::Result;
use seed_domain::tool::RiskLevel;
use serde::Deserialize;
use tokio::fs;

use crate::registry::{Tool, ToolContext};

#[derive(Debug, Deserialize)]
struct Args {
    path: String,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
}

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "readFile"
    }

    fn description(&self) -> &str {
        "Read a file, optionally restricted to a line range."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "offset": {"type": "integer"},
                "limit": {"type": "integer"}
            },
            "required": ["path"]
        })
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Safe
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<serde_json::Value> {
        let args: Args = serde_json::from_value(args).map_err(seed_domain::error::Error::Json)?;
        let resolved = ctx.resolver.resolve(&ctx.task_id, &args.path)?;

        let content = fs::read_to_string(&resolved.absolute_path).await?;
        let lines: Vec<&str> = content.lines().collect();
        let line_count = lines.len();

        let offset = args.offset.unwrap_or(0);
        let limit = args.limit.unwrap_or(line_count.saturating_sub(offset));
        let selected: Vec<&str> = lines.into_iter().skip(offset).take(limit).collect();

        let numbered: String = selected
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:>6}\t{}", offset + i + 1, line))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(serde_json::json!({
            "path": resolved.logical_path,
            "lineCount": line_count,
            "content": numbered,
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
    async fn reads_with_line_numbers() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("private/T1")).unwrap();
        std::fs::write(dir.path().join("private/T1/a.txt"), "alpha\nbeta\ngamma\n").unwrap();
        let result = ReadFileTool
            .execute(serde_json::json!({"path": "a.txt"}), &ctx(dir.path()))
            .await
            .unwrap();
        assert_eq!(result["lineCount"], 3);
        assert!(result["content"].as_str().unwrap().starts_with("     1\talpha"));
    }

    #[tokio::test]
    async fn respects_offset_and_limit() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("private/T1")).unwrap();
        std::fs::write(dir.path().join("private/T1/a.txt"), "one\ntwo\nthree\nfour\n").unwrap();
        let result = ReadFileTool
            .execute(serde_json::json!({"path": "a.txt", "offset": 1, "limit": 2}), &ctx(dir.path()))
            .await
            .unwrap();
        let content = result["content"].as_str().unwrap();
        assert!(content.contains("two"));
        assert!(content.contains("three"));
        assert!(!content.contains("four"));
    }
}
