use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Hard ceiling on LLM-call iterations per task before `TaskFailed`.
    #[serde(default = "d_max_iterations")]
    pub max_iterations: u32,
    /// Upper bound on concurrently running per-task runtimes.
    #[serde(default = "d_max_concurrent_runtimes")]
    pub max_concurrent_runtimes: usize,
    /// Per-task broadcast capacity for the UI bus (drop-oldest beyond this).
    #[serde(default = "d_ui_bus_capacity")]
    pub ui_bus_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_iterations: d_max_iterations(),
            max_concurrent_runtimes: d_max_concurrent_runtimes(),
            ui_bus_capacity: d_ui_bus_capacity(),
        }
    }
}

fn d_max_iterations() -> u32 {
    50
}
fn d_max_concurrent_runtimes() -> usize {
    4
}
fn d_ui_bus_capacity() -> usize {
    5000
}
