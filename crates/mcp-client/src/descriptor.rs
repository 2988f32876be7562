//! Connection descriptors: validated, transport-specific views of
//! `[[mcp.servers]]` entries.

use std::collections::{HashMap, HashSet};

use sb_domain::config::{McpServerConfig, TRANSPORT_SSE, TRANSPORT_STDIO};

/// How to reach one tool server.
#[derive(Debug, Clone, PartialEq)]
pub enum Transport {
    /// Spawn `command args…` and speak JSON-RPC over its stdin/stdout.
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    /// Open a persistent event stream at `url`.
    Sse { url: reqwest::Url },
}

impl Transport {
    pub fn kind(&self) -> &'static str {
        match self {
            Transport::Stdio { .. } => TRANSPORT_STDIO,
            Transport::Sse { .. } => TRANSPORT_SSE,
        }
    }
}

/// A validated server entry. Only descriptors ever become managed servers.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionDescriptor {
    pub name: String,
    pub transport: Transport,
}

impl ConnectionDescriptor {
    /// Validate one config entry.
    pub fn from_config(config: &McpServerConfig) -> Result<Self, String> {
        config.check()?;

        let transport = match config.transport.as_str() {
            TRANSPORT_SSE => {
                let raw = config.url.as_deref().unwrap_or_default().trim();
                let url = reqwest::Url::parse(raw)
                    .map_err(|e| format!("server {} has invalid url '{raw}': {e}", config.name))?;
                Transport::Sse { url }
            }
            _ => Transport::Stdio {
                command: config.command.clone(),
                args: config.args.clone(),
                env: config.env.clone(),
            },
        };

        Ok(Self {
            name: config.name.clone(),
            transport,
        })
    }

    /// Validate every entry, keeping declaration order.
    ///
    /// Invalid entries and later duplicates of an accepted name are skipped
    /// with a warning; they never reach the manager.
    pub fn from_configs(configs: &[McpServerConfig]) -> Vec<Self> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(configs.len());

        for config in configs {
            match Self::from_config(config) {
                Ok(descriptor) => {
                    if !seen.insert(descriptor.name.clone()) {
                        tracing::warn!(
                            server = %descriptor.name,
                            "duplicate MCP server name, skipping"
                        );
                        continue;
                    }
                    out.push(descriptor);
                }
                Err(reason) => {
                    tracing::warn!(server = %config.name, reason = %reason, "invalid MCP server config, skipping");
                }
            }
        }
        out
    }
}
