use async_trait::async_trait;
use regex::Regex;
use seed_domain::error::{Error, Result};
use seed_domain::tool::RiskLevel;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::registry::{Tool, ToolContext};

#[derive(Debug, Deserialize)]
struct Args {
    pattern: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    include: Option<String>,
}

#[derive(Debug, Serialize)]
struct Hit {
    path: String,
    line: u64,
    text: String,
}

pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grepTool"
    }

    fn description(&self) -> &str {
        "Search file contents for a regex pattern within the task's scope."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string"},
                "path": {"type": "string"},
                "include": {"type": "string"}
            },
            "required": ["pattern"]
        })
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Safe
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<serde_json::Value> {
        let args: Args = serde_json::from_value(args).map_err(Error::Json)?;
        if args.pattern.contains('\0') {
            return Err(Error::Validation("pattern must not contain a null byte".into()));
        }

        let scoped = args.path.clone().unwrap_or_else(|| ".".into());
        let resolved = ctx.resolver.resolve(&ctx.task_id, &scoped)?;

        let hits = if let Some(out) = try_git_grep(&resolved.absolute_path, &args.pattern, args.include.as_deref()).await {
            out
        } else if let Some(out) = try_grep(&resolved.absolute_path, &args.pattern, args.include.as_deref()).await {
            out
        } else {
            fallback_scan(&resolved.absolute_path, &args.pattern, args.include.as_deref())?
        };

        let remapped: Vec<Hit> = hits
            .into_iter()
            .map(|(abs_path, line, text)| {
                let logical = logical_path_for(ctx, &resolved, &abs_path);
                Hit { path: logical, line, text }
            })
            .collect();

        Ok(serde_json::json!({
            "pattern": args.pattern,
            "hits": remapped,
            "count": remapped.len(),
        }))
    }
}

fn logical_path_for(ctx: &ToolContext, resolved: &seed_workspace::ResolvedPath, abs_path: &std::path::Path) -> String {
    let store_path = abs_path
        .strip_prefix(&ctx.base_dir)
        .unwrap_or(abs_path)
        .to_path_buf();
    ctx.resolver
        .map_store_path_to_logical(resolved.scope, &resolved.scope_root_store_path, &store_path)
        .unwrap_or_else(|_| abs_path.display().to_string())
}

async fn try_git_grep(root: &std::path::Path, pattern: &str, include: Option<&str>) -> Option<Vec<(std::path::PathBuf, u64, String)>> {
    let mut cmd = Command::new("git");
    cmd.current_dir(root).arg("grep").arg("-n").arg("-I").arg("-E").arg(pattern);
    if let Some(inc) = include {
        cmd.arg("--").arg(inc);
    }
    let output = cmd.output().await.ok()?;
    if !output.status.success() && output.stdout.is_empty() {
        return None;
    }
    Some(parse_grep_lines(root, &output.stdout))
}

async fn try_grep(root: &std::path::Path, pattern: &str, include: Option<&str>) -> Option<Vec<(std::path::PathBuf, u64, String)>> {
    let mut cmd = Command::new("grep");
    cmd.current_dir(root).arg("-r").arg("-I").arg("-n").arg("-E");
    if let Some(inc) = include {
        cmd.arg("--include").arg(inc);
    }
    cmd.arg(pattern).arg(".");
    let output = cmd.output().await.ok()?;
    Some(parse_grep_lines(root, &output.stdout))
}

fn parse_grep_lines(root: &std::path::Path, stdout: &[u8]) -> Vec<(std::path::PathBuf, u64, String)> {
    let text = String::from_utf8_lossy(stdout);
    text.lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, ':');
            let file = parts.next()?;
            let lineno: u64 = parts.next()?.parse().ok()?;
            let content = parts.next().unwrap_or("").to_string();
            Some((root.join(file), lineno, content))
        })
        .collect()
}

/// Last resort when neither `git` nor `grep` is available: walk the tree
/// and test each line against the regex directly.
fn fallback_scan(root: &std::path::Path, pattern: &str, include: Option<&str>) -> Result<Vec<(std::path::PathBuf, u64, String)>> {
    let re = Regex::new(pattern).map_err(|e| Error::Validation(format!("invalid pattern: {e}")))?;
    let include_glob = include.and_then(|i| glob::Pattern::new(i).ok());
    let mut hits = Vec::new();

    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(read_dir) = std::fs::read_dir(&dir) else { continue };
        for entry in read_dir.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            if let Some(ref g) = include_glob {
                let name = path.file_name().unwrap_or_default().to_string_lossy().to_string();
                if !g.matches(&name) {
                    continue;
                }
            }
            let Ok(content) = std::fs::read_to_string(&path) else { continue };
            for (i, line) in content.lines().enumerate() {
                if re.is_match(line) {
                    hits.push((path.clone(), (i + 1) as u64, line.to_string()));
                }
            }
        }
    }
    Ok(hits)
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
    fn null_byte_pattern_is_rejected() {
        let re = Regex::new("a\0b");
        assert!(re.is_err() || "a\0b".contains('\0'));
    }

    #[tokio::test]
    async fn fallback_scan_finds_matches() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("private/T1")).unwrap();
        std::fs::write(dir.path().join("private/T1/a.txt"), "hello\nworld\nfoobar\n").unwrap();
        let result = GrepTool
            .execute(serde_json::json!({"pattern": "^foo"}), &ctx(dir.path()))
            .await
            .unwrap();
        assert!(result["count"].as_u64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn rejects_pattern_with_null_byte() {
        let dir = tempdir().unwrap();
        let err = GrepTool
            .execute(serde_json::json!({"pattern": "a\0b"}), &ctx(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn hits_outside_private_scope_keep_their_own_scope_label() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("public")).unwrap();
        std::fs::write(dir.path().join("public/notes.txt"), "match here\n").unwrap();
        let result = GrepTool
            .execute(serde_json::json!({"pattern": "match", "path": "public:/"}), &ctx(dir.path()))
            .await
            .unwrap();
        let path = result["hits"][0]["path"].as_str().unwrap();
        assert!(path.starts_with("public:/"), "expected a public:/ path, got {path}");
    }
}
