//! Model-free runner used when no reasoning backend is wired in.

use async_trait::async_trait;

use sb_domain::error::Result;
use sb_domain::tool::ToolDeclaration;

use super::{Runner, RunnerEvent, TurnInput};

/// Replies with the command text and the tools it could have used.
#[derive(Debug, Clone, Default)]
pub struct EchoRunner;

#[async_trait]
impl Runner for EchoRunner {
    async fn run(&self, input: TurnInput, tools: &[ToolDeclaration]) -> Result<Vec<RunnerEvent>> {
        let mut text = format!("Echo: {}", input.content);
        if tools.is_empty() {
            text.push_str("\nNo tools available.");
        } else {
            let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
            text.push_str(&format!("\nAvailable tools: {}", names.join(", ")));
        }
        Ok(vec![RunnerEvent::Text(text)])
    }
}
