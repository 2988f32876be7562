use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One invocable capability offered by a tool server.
///
/// `name` is already prefixed with the owning server (`{server}_{tool}`),
/// so declarations from different servers never collide once aggregated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub server: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub input_schema: Value,
}

impl ToolDeclaration {
    /// Build a declaration for `tool` on `server`, applying the server prefix.
    pub fn new(server: &str, tool: &str, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            server: server.to_owned(),
            name: prefixed_name(server, tool),
            description: description.into(),
            input_schema,
        }
    }

    /// The tool name as the owning server knows it.
    pub fn remote_name(&self) -> &str {
        self.name
            .strip_prefix(self.server.as_str())
            .and_then(|rest| rest.strip_prefix('_'))
            .unwrap_or(&self.name)
    }
}

/// `{server}_{tool}`.
pub fn prefixed_name(server: &str, tool: &str) -> String {
    format!("{server}_{tool}")
}
