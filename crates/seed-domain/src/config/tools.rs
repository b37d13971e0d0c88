use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Default `runCommand` timeout when the caller doesn't specify one.
    #[serde(default = "d_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Byte cap applied independently to stdout and stderr before a
    /// trailing "(output truncated)" marker is appended.
    #[serde(default = "d_output_byte_cap")]
    pub output_byte_cap: usize,
    /// How long a foreground `runCommand` waits before auto-backgrounding.
    #[serde(default = "d_yield_ms")]
    pub yield_ms: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: d_command_timeout_secs(),
            output_byte_cap: d_output_byte_cap(),
            yield_ms: d_yield_ms(),
        }
    }
}

fn d_command_timeout_secs() -> u64 {
    30
}
fn d_output_byte_cap() -> usize {
    64 * 1024
}
fn d_yield_ms() -> u64 {
    3000
}
