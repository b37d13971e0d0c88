use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// `tracing-subscriber` env-filter directive, e.g. "info" or "seed=debug".
    #[serde(default = "d_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: d_log_level(),
            json_logs: false,
        }
    }
}

fn d_log_level() -> String {
    "info".into()
}
