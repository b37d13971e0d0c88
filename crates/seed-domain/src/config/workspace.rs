use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Root directory holding `state/`, `private/`, `shared/`, `public/`.
    #[serde(default = "d_path")]
    pub path: PathBuf,
    #[serde(default = "d_agents_md")]
    pub agents_md: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            path: d_path(),
            agents_md: d_agents_md(),
        }
    }
}

fn d_path() -> PathBuf {
    PathBuf::from(".")
}

fn d_agents_md() -> PathBuf {
    PathBuf::from("AGENTS.md")
}
