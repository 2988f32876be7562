use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event bus
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Sizing and channel names for the in-process event bus.
///
/// Handlers are mostly I/O bound (tool calls, model requests), so the
/// worker pool defaults to a few hundred loops. `queue_capacity` bounds the
/// number of work items waiting for a worker; anything past it is dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default = "d_workers")]
    pub workers: usize,
    #[serde(default = "d_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "d_commands_channel")]
    pub commands_channel: String,
    #[serde(default = "d_responses_channel")]
    pub responses_channel: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            workers: d_workers(),
            queue_capacity: d_queue_capacity(),
            commands_channel: d_commands_channel(),
            responses_channel: d_responses_channel(),
        }
    }
}

fn d_workers() -> usize {
    256
}

fn d_queue_capacity() -> usize {
    1024
}

fn d_commands_channel() -> String {
    "commands".into()
}

fn d_responses_channel() -> String {
    "responses".into()
}
