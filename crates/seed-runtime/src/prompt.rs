//! Builds the system and seed user messages for a task's first LLM turn.

use std::path::Path;

/// Renders the system prompt: a fixed template plus ambient project
/// context (working directory, platform, date) and, when present, the
/// contents of the workspace's `AGENTS.md` memory file.
pub fn build_system_prompt(workspace_path: &Path, agents_md: &Path, now: chrono::DateTime<chrono::Utc>) -> String {
    let mut out = String::from(
        "You are an autonomous coding agent. You can read and edit files, search the \
         workspace, and run commands through the tools provided. Work the task to \
         completion, or explain why you cannot.\n\n",
    );
    out.push_str(&format!("Working directory: {}\n", workspace_path.display()));
    out.push_str(&format!("Platform: {}\n", std::env::consts::OS));
    out.push_str(&format!("Date: {}\n", now.format("%Y-%m-%d")));

    if let Ok(memory) = std::fs::read_to_string(workspace_path.join(agents_md)) {
        if !memory.trim().is_empty() {
            out.push_str("\n# Project memory (AGENTS.md)\n");
            out.push_str(&memory);
        }
    }
    out
}

/// Renders the initial user message from a task's title/intent, plus any
/// referenced file ranges with line numbers already rendered into the text
/// by the caller (the tasks service, not this module, owns file lookups).
pub fn build_user_seed(title: &str, intent: Option<&str>) -> String {
    match intent {
        Some(intent) if !intent.trim().is_empty() => format!("{title}\n\n{intent}"),
        _ => title.to_string(),
    }
}
