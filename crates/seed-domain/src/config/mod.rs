mod interaction;
mod observability;
mod runtime;
mod tools;
mod workspace;

pub use interaction::*;
pub use observability::*;
pub use runtime::*;
pub use tools::*;
pub use workspace::*;

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub interaction: InteractionConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.runtime.max_iterations == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "runtime.max_iterations".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.runtime.max_concurrent_runtimes == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "runtime.max_concurrent_runtimes".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.tools.command_timeout_secs == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "tools.command_timeout_secs".into(),
                message: "0 means commands never time out".into(),
            });
        }
        if !self.workspace.path.exists() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "workspace.path".into(),
                message: format!("{} does not exist yet; will be created", self.workspace.path.display()),
            });
        }

        issues
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}
