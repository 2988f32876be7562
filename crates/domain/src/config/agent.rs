use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Name the agent reports in responses and logs.
    #[serde(default = "d_name")]
    pub name: String,
    /// How many prior turns are loaded to seed each run.
    #[serde(default = "d_history_limit")]
    pub history_limit: usize,
    /// Minutes between synthetic heartbeat commands. `0` disables them.
    #[serde(default = "d_heartbeat_interval_minutes")]
    pub heartbeat_interval_minutes: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: d_name(),
            history_limit: d_history_limit(),
            heartbeat_interval_minutes: d_heartbeat_interval_minutes(),
        }
    }
}

fn d_name() -> String {
    "agent_service".into()
}

fn d_history_limit() -> usize {
    10
}

fn d_heartbeat_interval_minutes() -> f64 {
    5.0
}
