//! MCP (Model Context Protocol) configuration types for the domain layer.
//!
//! These are lightweight config structs used to deserialize the `[mcp]`
//! section of the service config. Turning an entry into a usable
//! connection descriptor happens in `sb-mcp-client`; [`McpServerConfig::check`]
//! is the shared rule set both sides agree on.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Transport name for a spawned child process speaking JSON-RPC over stdio.
pub const TRANSPORT_STDIO: &str = "stdio";
/// Transport name for a persistent HTTP event stream.
pub const TRANSPORT_SSE: &str = "sse";

/// Top-level MCP configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    /// Delay between reconnect attempts after a failed fetch.
    #[serde(default = "d_backoff_secs")]
    pub backoff_secs: u64,

    /// Interval between liveness checks on a connected server.
    #[serde(default = "d_health_check_secs")]
    pub health_check_secs: u64,

    /// Upper bound on one connect + `tools/list` attempt.
    #[serde(default = "d_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Upper bound on a single JSON-RPC round trip.
    #[serde(default = "d_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// List of MCP server definitions, in declaration order.
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            backoff_secs: d_backoff_secs(),
            health_check_secs: d_health_check_secs(),
            fetch_timeout_secs: d_fetch_timeout_secs(),
            request_timeout_secs: d_request_timeout_secs(),
            servers: Vec::new(),
        }
    }
}

/// Configuration for a single MCP server connection.
///
/// `transport` stays a plain string so an unknown kind only disables the
/// one entry instead of failing the whole config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Unique name; also the prefix of every tool this server exposes
    /// (`{name}_{tool}`).
    pub name: String,

    /// Transport type (`"stdio"` or `"sse"`).
    #[serde(default = "d_transport", alias = "type")]
    pub transport: String,

    /// The command to spawn (e.g. `"npx"`). Required for stdio.
    #[serde(default)]
    pub command: String,

    /// Arguments to pass to the command.
    #[serde(default)]
    pub args: Vec<String>,

    /// Stream URL. Required for sse.
    #[serde(default)]
    pub url: Option<String>,

    /// Optional environment variables to set on the spawned process.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl McpServerConfig {
    /// Check that the fields required by this entry's transport are present.
    ///
    /// Returns a human-readable reason on failure.
    pub fn check(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("server name must not be empty".into());
        }
        match self.transport.as_str() {
            TRANSPORT_STDIO => {
                if self.command.trim().is_empty() {
                    return Err(format!(
                        "server {} is type 'stdio' but missing command",
                        self.name
                    ));
                }
            }
            TRANSPORT_SSE => {
                let missing = self.url.as_deref().map_or(true, |u| u.trim().is_empty());
                if missing {
                    return Err(format!(
                        "server {} is type 'sse' but missing url",
                        self.name
                    ));
                }
            }
            other => {
                return Err(format!(
                    "unknown MCP server type '{other}' for {}",
                    self.name
                ));
            }
        }
        Ok(())
    }
}

fn d_transport() -> String {
    TRANSPORT_STDIO.into()
}

fn d_backoff_secs() -> u64 {
    5
}

fn d_health_check_secs() -> u64 {
    30
}

fn d_fetch_timeout_secs() -> u64 {
    30
}

fn d_request_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_defaults() {
        let cfg: McpConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.servers.is_empty());
        assert_eq!(cfg.backoff_secs, 5);
        assert_eq!(cfg.health_check_secs, 30);
        assert_eq!(cfg.fetch_timeout_secs, 30);
    }

    #[test]
    fn deserialize_server_config() {
        let raw = r#"{
            "name": "filesystem",
            "command": "npx",
            "args": ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"],
            "transport": "stdio"
        }"#;
        let cfg: McpServerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.name, "filesystem");
        assert_eq!(cfg.command, "npx");
        assert_eq!(cfg.args.len(), 3);
        assert_eq!(cfg.transport, TRANSPORT_STDIO);
        assert!(cfg.check().is_ok());
    }

    #[test]
    fn transport_defaults_to_stdio() {
        let raw = r#"{ "name": "test", "command": "echo" }"#;
        let cfg: McpServerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.transport, TRANSPORT_STDIO);
    }

    #[test]
    fn type_alias_is_accepted() {
        let raw = r#"{ "name": "remote", "type": "sse", "url": "http://localhost:8080/sse" }"#;
        let cfg: McpServerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.transport, TRANSPORT_SSE);
        assert!(cfg.check().is_ok());
    }

    #[test]
    fn unknown_transport_still_parses() {
        let raw = r#"{ "name": "odd", "transport": "carrier-pigeon" }"#;
        let cfg: McpServerConfig = serde_json::from_str(raw).unwrap();
        let reason = cfg.check().unwrap_err();
        assert!(reason.contains("unknown MCP server type"));
    }

    #[test]
    fn check_reports_missing_fields() {
        let stdio: McpServerConfig =
            serde_json::from_str(r#"{ "name": "n1", "transport": "stdio" }"#).unwrap();
        assert!(stdio.check().unwrap_err().contains("missing command"));

        let sse: McpServerConfig =
            serde_json::from_str(r#"{ "name": "n2", "transport": "sse", "url": " " }"#).unwrap();
        assert!(sse.check().unwrap_err().contains("missing url"));

        let unnamed: McpServerConfig =
            serde_json::from_str(r#"{ "name": "", "command": "echo" }"#).unwrap();
        assert!(unnamed.check().is_err());
    }

    #[test]
    fn deserialize_with_env() {
        let raw = r#"{
            "name": "test",
            "command": "node",
            "args": ["server.js"],
            "env": { "NODE_ENV": "production" }
        }"#;
        let cfg: McpServerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.env.get("NODE_ENV").unwrap(), "production");
    }
}
