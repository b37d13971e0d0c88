use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionConfig {
    /// Default deadline for a pending interaction in seconds, if the
    /// requester does not supply one. `0` means no deadline.
    #[serde(default = "d_default_deadline_secs")]
    pub default_deadline_secs: u64,
    #[serde(default = "d_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            default_deadline_secs: d_default_deadline_secs(),
            poll_interval_ms: d_poll_interval_ms(),
        }
    }
}

fn d_default_deadline_secs() -> u64 {
    0
}
fn d_poll_interval_ms() -> u64 {
    250
}
