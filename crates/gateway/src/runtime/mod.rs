//! Agent runtime contracts: what a turn looks like going into a runner,
//! what comes back out, and how the output becomes one response.

pub mod echo;
pub mod heartbeat;
pub mod history;

use async_trait::async_trait;
use serde_json::Value;

use sb_domain::error::Result;
use sb_domain::message::{Turn, NEEDS_INPUT_MARKER};
use sb_domain::tool::ToolDeclaration;

pub use echo::EchoRunner;
pub use history::{HistoryStore, InMemoryHistoryStore};

/// Tool name a runner emits to ask the human a question.
pub const REQUEST_USER_INPUT: &str = "request_user_input";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Runner contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything a runner needs to produce one reply.
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub user_id: String,
    /// Conversation key; the command's `source_id`.
    pub session_id: String,
    /// The new user message.
    pub content: String,
    /// Prior turns, oldest first.
    pub history: Vec<Turn>,
}

/// One piece of runner output.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerEvent {
    /// Free text from the assistant.
    Text(String),
    /// A structured tool invocation.
    ToolCall { name: String, args: Value },
}

/// The reasoning loop. Implementations decide how tools are used; the
/// service only aggregates what they emit.
#[async_trait]
pub trait Runner: Send + Sync + 'static {
    async fn run(&self, input: TurnInput, tools: &[ToolDeclaration]) -> Result<Vec<RunnerEvent>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Aggregation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Collapse runner output into `(content, needs_input)`.
///
/// Text parts are concatenated. Each distinct `request_user_input`
/// question is appended on its own line and marks the reply as waiting on
/// the human, as does the `[NEEDS_INPUT]` marker anywhere in the text.
pub fn aggregate(events: &[RunnerEvent]) -> (String, bool) {
    let mut content = String::new();
    let mut needs_input = false;
    let mut asked: Vec<&str> = Vec::new();

    for event in events {
        match event {
            RunnerEvent::Text(text) => content.push_str(text),
            RunnerEvent::ToolCall { name, args } if name == REQUEST_USER_INPUT => {
                needs_input = true;
                if let Some(question) = args.get("question").and_then(Value::as_str) {
                    if !asked.contains(&question) {
                        asked.push(question);
                        content.push('\n');
                        content.push_str(question);
                    }
                }
            }
            RunnerEvent::ToolCall { .. } => {}
        }
    }

    let content = content.trim().to_string();
    if content.contains(NEEDS_INPUT_MARKER) {
        needs_input = true;
    }
    (content, needs_input)
}
