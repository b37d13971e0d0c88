use async_trait::async_trait;
use regex::Regex;
use seed_domain::error::{Error, Result};
use seed_domain::tool::RiskLevel;
use serde::Deserialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::registry::{Tool, ToolContext};

const DELIMITERS: &[char] = &['(', ')', '{', '}', '[', ']', ';', ':', ',', '.'];

#[derive(Debug, Deserialize)]
struct Args {
    path: String,
    #[serde(rename = "oldString")]
    old_string: String,
    #[serde(rename = "newString")]
    new_string: String,
    #[serde(default)]
    regex: bool,
}

pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "editFile"
    }

    fn description(&self) -> &str {
        "Replace one occurrence of oldString with newString in a file, or create a new file."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "oldString": {"type": "string"},
                "newString": {"type": "string"},
                "regex": {"type": "boolean"}
            },
            "required": ["path", "oldString", "newString"]
        })
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Risky
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<serde_json::Value> {
        let args: Args = serde_json::from_value(args).map_err(Error::Json)?;
        let resolved = ctx.resolver.resolve(&ctx.task_id, &args.path)?;

        if args.old_string.is_empty() {
            if resolved.absolute_path.exists() {
                return Err(Error::Conflict(format!("{} already exists", resolved.logical_path)));
            }
            ctx.resolver.ensure_root(&resolved)?;
            if let Some(parent) = resolved.absolute_path.parent() {
                fs::create_dir_all(parent).await?;
            }
            write_atomic(&resolved.absolute_path, &args.new_string).await?;
            return Ok(serde_json::json!({
                "path": resolved.logical_path,
                "created": true,
            }));
        }

        let content = fs::read_to_string(&resolved.absolute_path).await?;
        let new_content = apply_edit(&content, &args.old_string, &args.new_string, args.regex)?;
        write_atomic(&resolved.absolute_path, &new_content).await?;

        Ok(serde_json::json!({
            "path": resolved.logical_path,
            "created": false,
        }))
    }
}

/// Tries, in order: an exact unique match, a whitespace/delimiter-flexible
/// match, then (if `regex` was requested) a literal regex match.
fn apply_edit(content: &str, old: &str, new: &str, regex: bool) -> Result<String> {
    if regex {
        let re = Regex::new(old).map_err(|e| Error::Validation(format!("invalid regex: {e}")))?;
        return replace_unique(content, &re, new);
    }

    let exact_count = content.matches(old).count();
    if exact_count == 1 {
        return Ok(content.replacen(old, new, 1));
    }
    if exact_count > 1 {
        return Err(Error::Conflict(format!("oldString matched {exact_count} times, expected exactly 1")));
    }

    let flexible = flexible_pattern(old);
    let re = Regex::new(&flexible).map_err(|e| Error::Validation(format!("internal flexible-match regex error: {e}")))?;
    replace_unique(content, &re, new)
}

fn replace_unique(content: &str, re: &Regex, new: &str) -> Result<String> {
    let count = re.find_iter(content).count();
    if count == 0 {
        return Err(Error::NotFound("oldString not found in file".into()));
    }
    if count > 1 {
        return Err(Error::Conflict(format!("oldString matched {count} times, expected exactly 1")));
    }
    Ok(re.replace(content, regex::NoExpand(new)).into_owned())
}

/// Builds a whitespace-insensitive regex from a literal string: each
/// character is escaped individually, delimiter characters get `\s*`
/// wrapped around their escaped form, and runs of (now-literal) whitespace
/// collapse to `\s+`.
fn flexible_pattern(old: &str) -> String {
    let mut with_delims = String::with_capacity(old.len() * 2);
    for c in old.chars() {
        if DELIMITERS.contains(&c) {
            with_delims.push_str(r"\s*");
            with_delims.push_str(&regex::escape(&c.to_string()));
            with_delims.push_str(r"\s*");
        } else {
            with_delims.push_str(&regex::escape(&c.to_string()));
        }
    }

    let ws_run = Regex::new(r"[ \t\n\r]+").unwrap();
    ws_run.replace_all(&with_delims, r"\s+").into_owned()
}

async fn write_atomic(path: &std::path::Path, content: &str) -> Result<()> {
    let tmp_name = format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        uuid::Uuid::new_v4().as_simple()
    );
    let tmp_path = path.with_file_name(tmp_name);
    let mut file = fs::File::create(&tmp_path).await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await?;
    file.sync_data().await?;
    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(Error::Io(e));
    }
    Ok(())
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

    #[test]
    fn flexible_pattern_tolerates_whitespace_run_changes() {
        let pattern = flexible_pattern("fn foo() {");
        let re = Regex::new(&pattern).unwrap();
        assert!(re.is_match("fn foo()   {"));
        assert!(re.is_match("fn  foo() {"));
    }

    #[tokio::test]
    async fn empty_old_string_creates_file() {
        let dir = tempdir().unwrap();
        let result = EditFileTool
            .execute(
                serde_json::json!({"path": "new.txt", "oldString": "", "newString": "hello"}),
                &ctx(dir.path()),
            )
            .await
            .unwrap();
        assert_eq!(result["created"], true);
        assert_eq!(std::fs::read_to_string(dir.path().join("private/T1/new.txt")).unwrap(), "hello");
    }

    #[tokio::test]
    async fn empty_old_string_errors_if_file_exists() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("private/T1")).unwrap();
        std::fs::write(dir.path().join("private/T1/exists.txt"), "x").unwrap();
        let err = EditFileTool
            .execute(
                serde_json::json!({"path": "exists.txt", "oldString": "", "newString": "y"}),
                &ctx(dir.path()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn exact_match_replaces_unique_occurrence() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("private/T1")).unwrap();
        std::fs::write(dir.path().join("private/T1/a.txt"), "one two three").unwrap();
        EditFileTool
            .execute(
                serde_json::json!({"path": "a.txt", "oldString": "two", "newString": "TWO"}),
                &ctx(dir.path()),
            )
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("private/T1/a.txt")).unwrap(), "one TWO three");
    }

    #[tokio::test]
    async fn ambiguous_exact_match_is_conflict() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("private/T1")).unwrap();
        std::fs::write(dir.path().join("private/T1/a.txt"), "foo foo").unwrap();
        let err = EditFileTool
            .execute(
                serde_json::json!({"path": "a.txt", "oldString": "foo", "newString": "bar"}),
                &ctx(dir.path()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn flexible_match_tolerates_whitespace_difference() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("private/T1")).unwrap();
        std::fs::write(dir.path().join("private/T1/a.txt"), "fn foo()   {\n    body()\n}").unwrap();
        EditFileTool
            .execute(
                serde_json::json!({"path": "a.txt", "oldString": "fn foo() {", "newString": "fn bar() {"}),
                &ctx(dir.path()),
            )
            .await
            .unwrap();
        let content = std::fs::read_to_string(dir.path().join("private/T1/a.txt")).unwrap();
        assert!(content.starts_with("fn bar()"));
    }

    #[tokio::test]
    async fn regex_mode_uses_literal_regex() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("private/T1")).unwrap();
        std::fs::write(dir.path().join("private/T1/a.txt"), "value=123").unwrap();
        EditFileTool
            .execute(
                serde_json::json!({"path": "a.txt", "oldString": r"value=\d+", "newString": "value=456", "regex": true}),
                &ctx(dir.path()),
            )
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("private/T1/a.txt")).unwrap(), "value=456");
    }
}
