//! `sb-gateway`: the Switchboard service: agent glue over the event bus
//! and the MCP manager, an HTTP surface, and the `switchboard` CLI.

pub mod api;
pub mod cli;
pub mod runtime;
pub mod service;
pub mod state;

pub use service::AgentService;
pub use state::AppState;
