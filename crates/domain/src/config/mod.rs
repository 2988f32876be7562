mod agent;
mod bus;
mod mcp;
mod observability;
mod server;

pub use agent::*;
pub use bus::*;
pub use mcp::*;
pub use observability::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Invalid MCP server entries are reported as warnings: the manager
    /// skips them at startup rather than refusing to run.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.bus.workers == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "bus.workers".into(),
                message: "at least one worker is required".into(),
            });
        }

        if self.bus.queue_capacity == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "bus.queue_capacity".into(),
                message: "queue capacity must be greater than 0".into(),
            });
        }

        if self.bus.commands_channel == self.bus.responses_channel {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "bus.responses_channel".into(),
                message: "commands and responses must use different channels".into(),
            });
        }

        if self.mcp.fetch_timeout_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "mcp.fetch_timeout_secs".into(),
                message: "fetch timeout must be greater than 0".into(),
            });
        }

        if self.mcp.servers.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "mcp.servers".into(),
                message: "no MCP servers configured".into(),
            });
        }

        let mut seen = HashSet::new();
        for (i, server) in self.mcp.servers.iter().enumerate() {
            if let Err(reason) = server.check() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("mcp.servers[{i}]"),
                    message: format!("{reason}; server will be skipped"),
                });
            } else if !seen.insert(server.name.as_str()) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("mcp.servers[{i}].name"),
                    message: format!(
                        "duplicate server name \"{}\"; server will be skipped",
                        server.name
                    ),
                });
            }
        }

        errors
    }
}
