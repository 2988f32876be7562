use crate::transport::TransportError;

/// Errors specific to MCP operations.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("MCP transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("MCP server not found: {0}")]
    ServerNotFound(String),

    #[error("MCP server is down: {0}")]
    ServerDown(String),

    #[error("unknown MCP tool: {0}")]
    UnknownTool(String),

    #[error("MCP tool {tool} failed: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("fetching tools from {server} timed out after {secs}s")]
    FetchTimeout { server: String, secs: u64 },

    #[error("MCP manager is not running")]
    NotRunning,

    #[error("MCP operation cancelled by shutdown")]
    Cancelled,
}

impl From<McpError> for sb_domain::error::Error {
    fn from(e: McpError) -> Self {
        match e {
            McpError::FetchTimeout { .. } => sb_domain::error::Error::Timeout(e.to_string()),
            other => sb_domain::error::Error::Other(other.to_string()),
        }
    }
}
