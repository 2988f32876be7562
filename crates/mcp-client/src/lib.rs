//! `sb-mcp-client`: MCP (Model Context Protocol) client for Switchboard.
//!
//! This crate provides:
//! - JSON-RPC 2.0 protocol types for communicating with MCP servers.
//! - A stdio transport that spawns child processes and an SSE transport that
//!   talks to remote servers over a persistent event stream.
//! - An `McpManager` that supervises connections to multiple MCP servers,
//!   caches their tool declarations and dispatches tool calls.
//!
//! # Usage
//!
//! ```rust,ignore
//! use sb_mcp_client::McpManager;
//!
//! let manager = McpManager::new(&config.mcp);
//! manager.start();
//!
//! // Aggregated, prefixed declarations from every reachable server.
//! for tool in manager.get_tools().await {
//!     println!("{}", tool.name);
//! }
//!
//! let text = manager.call_tool("filesystem_read_file", json!({"path": "/tmp/test.txt"})).await?;
//! manager.stop().await;
//! ```

pub mod descriptor;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod session;
pub mod sse;
pub mod transport;

// Re-exports for convenience.
pub use descriptor::{ConnectionDescriptor, Transport};
pub use error::McpError;
pub use manager::{McpManager, ServerState};
pub use protocol::McpToolDef;
pub use session::{Connector, McpSession, TransportConnector};
pub use transport::{McpTransport, TransportError};
