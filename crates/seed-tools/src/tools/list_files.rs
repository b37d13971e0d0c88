use async_trait::async_trait;
use chrono::{DateTime, Utc};
use seed_domain::error::{Error, Result};
use seed_domain::tool::RiskLevel;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::registry::{Tool, ToolContext};

#[derive(Debug, Deserialize)]
struct Args {
    #[serde(default = "default_dot")]
    path: String,
    #[serde(default)]
    ignore: Vec<String>,
}

fn default_dot() -> String {
    ".".into()
}

#[derive(Debug, Serialize)]
struct Entry {
    name: String,
    #[serde(rename = "isDir")]
    is_dir: bool,
    size: u64,
    modified: String,
}

pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "listFiles"
    }

    fn description(&self) -> &str {
        "List the entries of a directory."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "ignore": {"type": "array", "items": {"type": "string"}}
            }
        })
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Safe
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<serde_json::Value> {
        let args: Args = serde_json::from_value(args).map_err(Error::Json)?;
        let resolved = ctx.resolver.resolve(&ctx.task_id, &args.path)?;

        let ignore_globs: Vec<glob::Pattern> = args
            .ignore
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();

        let mut read_dir = fs::read_dir(&resolved.absolute_path).await?;
        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if ignore_globs.iter().any(|g| g.matches(&name)) {
                continue;
            }
            let metadata = entry.metadata().await?;
            let modified = metadata
                .modified()
                .ok()
                .map(|t| DateTime::<Utc>::from(t).to_rfc3339())
                .unwrap_or_default();
            entries.push(Entry {
                name,
                is_dir: metadata.is_dir(),
                size: metadata.len(),
                modified,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(serde_json::json!({
            "path": resolved.logical_path,
            "entries": entries,
            "count": entries.len(),
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
    async fn lists_entries_sorted_and_filters_ignored() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("private/T1")).unwrap();
        std::fs::write(dir.path().join("private/T1/b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("private/T1/a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("private/T1/a.log"), "log").unwrap();

        let result = ListFilesTool
            .execute(serde_json::json!({"path": ".", "ignore": ["*.log"]}), &ctx(dir.path()))
            .await
            .unwrap();

        let names: Vec<&str> = result["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }
}
